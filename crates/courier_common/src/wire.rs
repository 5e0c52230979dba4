//! Wire protocol for the courier peer link.
//!
//! Owns the only definition of the frame layout. Commands travel host to
//! peer as a two-hex-digit uppercase opcode prefix followed by a printable
//! ASCII payload, one frame per transport write. Responses travel peer to
//! host as a 9-byte binary header (opcode, status, progress) followed by a
//! free-text detail, one frame per transport read.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Largest frame read from the link in one receive.
pub const MAX_FRAME_LEN: usize = 1024;

/// Fixed header length of a response frame.
pub const RESPONSE_HEADER_LEN: usize = 9;

/// Fixed handshake payload the peer expects with HELLO.
pub const HELLO_TOKEN: &str = "PC_READY";

/// Command set understood by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Opcode {
    Hello = 0x01,
    DetectDisks = 0x02,
    Partition = 0x03,
    Format = 0x04,
    Mount = 0x05,
    Download = 0x06,
    Install = 0x07,
    Configure = 0x08,
    Finish = 0x09,
    Status = 0x0A,
    Error = 0xFF,
}

impl Opcode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Opcode> {
        match value {
            0x01 => Some(Opcode::Hello),
            0x02 => Some(Opcode::DetectDisks),
            0x03 => Some(Opcode::Partition),
            0x04 => Some(Opcode::Format),
            0x05 => Some(Opcode::Mount),
            0x06 => Some(Opcode::Download),
            0x07 => Some(Opcode::Install),
            0x08 => Some(Opcode::Configure),
            0x09 => Some(Opcode::Finish),
            0x0A => Some(Opcode::Status),
            0xFF => Some(Opcode::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Opcode::Hello => "hello",
            Opcode::DetectDisks => "detect_disks",
            Opcode::Partition => "partition",
            Opcode::Format => "format",
            Opcode::Mount => "mount",
            Opcode::Download => "download",
            Opcode::Install => "install",
            Opcode::Configure => "configure",
            Opcode::Finish => "finish",
            Opcode::Status => "status",
            Opcode::Error => "error",
        }
    }
}

/// Outcome reported by a response frame.
///
/// The peer may emit vendor-specific codes beyond 0 and 1; all of them are
/// error outcomes and the raw code is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Success,
    Progress,
    Error(u32),
}

impl Status {
    pub fn from_u32(raw: u32) -> Status {
        match raw {
            0 => Status::Success,
            1 => Status::Progress,
            code => Status::Error(code),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Status::Success => 0,
            Status::Progress => 1,
            Status::Error(code) => *code,
        }
    }

    /// SUCCESS and ERROR end an exchange; PROGRESS does not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Progress)
    }
}

/// A request sent to the peer. Constructed per exchange, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub opcode: Opcode,
    pub payload: String,
}

impl Command {
    pub fn new(opcode: Opcode, payload: impl Into<String>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Serialize into one wire frame: `<2-hex-digit opcode><payload>`.
    ///
    /// No length prefix and no terminator; the frame boundary is the
    /// transport write boundary. Payloads are printable text by protocol
    /// contract.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = format!("{:02X}", self.opcode.as_u8()).into_bytes();
        frame.extend_from_slice(self.payload.as_bytes());
        frame
    }

    /// Parse a command frame as the peer would see it.
    pub fn decode(bytes: &[u8]) -> Result<Command, DecodeError> {
        if bytes.len() < 2 {
            return Err(DecodeError::Truncated { len: bytes.len() });
        }
        let prefix = String::from_utf8_lossy(&bytes[..2]).into_owned();
        let value = u8::from_str_radix(&prefix, 16)
            .map_err(|_| DecodeError::BadPrefix { prefix: prefix.clone() })?;
        let opcode = Opcode::from_u8(value).ok_or(DecodeError::UnknownOpcode { value })?;
        let payload = String::from_utf8_lossy(&bytes[2..]).into_owned();
        Ok(Command::new(opcode, payload))
    }
}

/// A frame received from the peer in answer to the in-flight command.
///
/// The link never reorders or multiplexes, so a response is only meaningful
/// in the context of the command it answers. The opcode byte is kept raw:
/// the peer echoes the command opcode, but nothing is rejected on mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub opcode: u8,
    pub status: Status,
    /// Percentage 0-100, meaningful only when `status` is PROGRESS.
    pub progress: u32,
    /// Free text: structured results on SUCCESS, a reason on ERROR.
    pub detail: String,
}

impl Response {
    /// Parse a response frame.
    ///
    /// Layout: byte 0 opcode, bytes 1-4 status (LE u32), bytes 5-8 progress
    /// (LE u32), remainder detail. The detail is decoded permissively:
    /// non-ASCII bytes are dropped rather than failing the frame.
    pub fn decode(bytes: &[u8]) -> Result<Response, DecodeError> {
        if bytes.len() < RESPONSE_HEADER_LEN {
            return Err(DecodeError::Truncated { len: bytes.len() });
        }
        let status = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let progress = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
        let detail = bytes[RESPONSE_HEADER_LEN..]
            .iter()
            .filter(|b| b.is_ascii())
            .map(|&b| b as char)
            .collect();
        Ok(Response {
            opcode: bytes[0],
            status: Status::from_u32(status),
            progress,
            detail,
        })
    }

    /// Serialize into one wire frame, the inverse of [`Response::decode`].
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(RESPONSE_HEADER_LEN + self.detail.len());
        frame.push(self.opcode);
        frame.extend_from_slice(&self.status.as_u32().to_le_bytes());
        frame.extend_from_slice(&self.progress.to_le_bytes());
        frame.extend_from_slice(self.detail.as_bytes());
        frame
    }
}

/// Split a semicolon-delimited identifier list from a response detail.
///
/// Empty and whitespace-only entries are discarded, so an empty detail
/// yields an empty list rather than one empty identifier.
pub fn parse_disk_list(detail: &str) -> Vec<String> {
    detail
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_mapping_round_trips() {
        let all = [
            Opcode::Hello,
            Opcode::DetectDisks,
            Opcode::Partition,
            Opcode::Format,
            Opcode::Mount,
            Opcode::Download,
            Opcode::Install,
            Opcode::Configure,
            Opcode::Finish,
            Opcode::Status,
            Opcode::Error,
        ];
        assert_eq!(all.len(), 11);
        for opcode in all {
            assert_eq!(Opcode::from_u8(opcode.as_u8()), Some(opcode));
        }
        assert_eq!(Opcode::Hello.as_u8(), 0x01);
        assert_eq!(Opcode::Status.as_u8(), 0x0A);
        assert_eq!(Opcode::Error.as_u8(), 0xFF);
        assert_eq!(Opcode::from_u8(0x42), None);
    }

    #[test]
    fn command_encodes_with_uppercase_hex_prefix() {
        let cmd = Command::new(Opcode::Hello, HELLO_TOKEN);
        assert_eq!(cmd.encode(), b"01PC_READY".to_vec());

        let cmd = Command::new(Opcode::Status, "");
        assert_eq!(cmd.encode(), b"0A".to_vec());

        let cmd = Command::new(Opcode::Error, "boom");
        assert_eq!(cmd.encode(), b"FFboom".to_vec());
    }

    #[test]
    fn command_decode_round_trips() {
        let cmd = Command::new(Opcode::Partition, "/dev/sda:512M:2G:4G:remain");
        assert_eq!(Command::decode(&cmd.encode()).unwrap(), cmd);
    }

    #[test]
    fn command_decode_rejects_garbage() {
        assert_eq!(
            Command::decode(b"0"),
            Err(DecodeError::Truncated { len: 1 })
        );
        assert!(matches!(
            Command::decode(b"zz"),
            Err(DecodeError::BadPrefix { .. })
        ));
        assert_eq!(
            Command::decode(b"42"),
            Err(DecodeError::UnknownOpcode { value: 0x42 })
        );
    }

    #[test]
    fn response_decode_rejects_short_frames() {
        for len in 0..RESPONSE_HEADER_LEN {
            let bytes = vec![0u8; len];
            assert_eq!(
                Response::decode(&bytes),
                Err(DecodeError::Truncated { len }),
                "length {len} must not decode"
            );
        }
    }

    #[test]
    fn response_decode_reads_header_fields() {
        let mut frame = vec![0x03];
        frame.extend_from_slice(&1u32.to_le_bytes());
        frame.extend_from_slice(&40u32.to_le_bytes());
        frame.extend_from_slice(b"writing table");

        let response = Response::decode(&frame).unwrap();
        assert_eq!(response.opcode, 0x03);
        assert_eq!(response.status, Status::Progress);
        assert_eq!(response.progress, 40);
        assert_eq!(response.detail, "writing table");
    }

    #[test]
    fn response_decode_with_empty_detail() {
        let mut frame = vec![0x01];
        frame.extend_from_slice(&0u32.to_le_bytes());
        frame.extend_from_slice(&0u32.to_le_bytes());

        let response = Response::decode(&frame).unwrap();
        assert_eq!(response.status, Status::Success);
        assert_eq!(response.detail, "");
    }

    #[test]
    fn response_detail_drops_non_ascii_bytes() {
        let mut frame = vec![0x02];
        frame.extend_from_slice(&0u32.to_le_bytes());
        frame.extend_from_slice(&0u32.to_le_bytes());
        frame.extend_from_slice(b"/dev/sda");
        frame.push(0xC3);
        frame.push(0xA9);
        frame.extend_from_slice(b";/dev/sdb");

        let response = Response::decode(&frame).unwrap();
        assert_eq!(response.detail, "/dev/sda;/dev/sdb");
    }

    #[test]
    fn vendor_status_codes_are_errors() {
        assert_eq!(Status::from_u32(0), Status::Success);
        assert_eq!(Status::from_u32(1), Status::Progress);
        assert_eq!(Status::from_u32(2), Status::Error(2));
        assert_eq!(Status::from_u32(0xDEAD), Status::Error(0xDEAD));
        assert!(Status::Success.is_terminal());
        assert!(Status::Error(7).is_terminal());
        assert!(!Status::Progress.is_terminal());
    }

    #[test]
    fn response_encode_decode_round_trips() {
        let response = Response {
            opcode: Opcode::Format.as_u8(),
            status: Status::Error(2),
            progress: 0,
            detail: "disk busy".to_string(),
        };
        assert_eq!(Response::decode(&response.encode()).unwrap(), response);
    }

    #[test]
    fn disk_list_parsing_discards_empty_entries() {
        assert_eq!(
            parse_disk_list("/dev/sda;/dev/sdb"),
            vec!["/dev/sda".to_string(), "/dev/sdb".to_string()]
        );
        assert_eq!(parse_disk_list(""), Vec::<String>::new());
        assert_eq!(parse_disk_list(" ; ;"), Vec::<String>::new());
        assert_eq!(parse_disk_list("/dev/sda;"), vec!["/dev/sda".to_string()]);
    }
}
