//! Command link - framed command/response exchange with the peer device.
//!
//! The physical transport (USB claim, endpoint addressing) belongs to the
//! bridge that exposes the peer as a connected socket; this module takes the
//! opened byte stream and speaks the frame protocol over it. One command is
//! in flight at a time, enforced by `&mut self` on [`CommandLink::execute`].

use std::time::Duration;

use anyhow::Result;
use courier_common::wire::{Command, Response, Status, MAX_FRAME_LEN};
use courier_common::LinkError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout};
use tracing::debug;

/// Default socket path where the link bridge exposes the peer.
pub const DEFAULT_LINK_PATH: &str = "/run/courier/peer.sock";

/// Default patience for each response frame.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolve the link socket path.
///
/// Priority:
/// 1. Explicit --link flag (passed as argument)
/// 2. $COURIER_LINK environment variable
/// 3. The plan's `[link] socket` entry
/// 4. /run/courier/peer.sock (default)
pub fn discover_link_path(explicit: Option<&str>, plan_socket: Option<&str>) -> String {
    if let Some(path) = explicit {
        return path.to_string();
    }

    if let Ok(path) = std::env::var("COURIER_LINK") {
        return path;
    }

    if let Some(path) = plan_socket {
        return path.to_string();
    }

    DEFAULT_LINK_PATH.to_string()
}

/// Connect to the peer link with retry logic and errno-specific hints.
pub async fn connect(path: &str) -> Result<UnixStream> {
    let max_retries = 10;
    let mut retry_delay = Duration::from_millis(50);
    let mut last_error: Option<std::io::Error> = None;

    for attempt in 0..max_retries {
        match timeout(Duration::from_millis(500), UnixStream::connect(path)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) if attempt == max_retries - 1 => {
                return Err(link_error_with_hint(path, e));
            }
            Ok(Err(e)) => {
                last_error = Some(e);
                sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(Duration::from_millis(500));
            }
            Err(_) => {
                sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(Duration::from_millis(500));
            }
        }
    }

    if let Some(e) = last_error {
        return Err(link_error_with_hint(path, e));
    }

    anyhow::bail!("failed to connect to peer link at {path}. Is the bridge running?")
}

/// Generate an errno-specific connection hint.
fn link_error_with_hint(path: &str, error: std::io::Error) -> anyhow::Error {
    use std::io::ErrorKind;

    let hint = match error.kind() {
        ErrorKind::NotFound => {
            format!(
                "Peer link not found at {path}.\n\
                 Plug in the peer device and start the link bridge, or point\n\
                 --link (or COURIER_LINK) at the right socket."
            )
        }
        ErrorKind::PermissionDenied => {
            format!(
                "Permission denied opening peer link at {path}.\n\
                 Check the socket's ownership: ls -la {path}"
            )
        }
        ErrorKind::ConnectionRefused | ErrorKind::TimedOut => {
            format!(
                "Link bridge not responding on {path}.\n\
                 The socket exists but nothing is accepting connections;\n\
                 restart the bridge and reconnect the peer."
            )
        }
        _ => {
            format!("Failed to connect to peer link at {path}: {error}")
        }
    };

    anyhow::Error::new(error).context(hint)
}

/// One exchange channel over the opened byte stream.
///
/// Owns the stream exclusively for its lifetime; `execute` takes `&mut self`
/// so a second concurrent exchange is a compile error, not a runtime race.
pub struct CommandLink<S> {
    stream: S,
    read_timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> CommandLink<S> {
    pub fn new(stream: S) -> Self {
        Self::with_read_timeout(stream, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_read_timeout(stream: S, read_timeout: Duration) -> Self {
        Self {
            stream,
            read_timeout,
        }
    }

    /// Send one command and read response frames until a terminal status.
    ///
    /// Every PROGRESS response is handed to `on_progress` in receive order,
    /// then the link pauses `poll` before the next read so a slow peer is
    /// not busy-polled; the pause is stage policy, not a wire requirement.
    ///
    /// A SUCCESS or ERROR response ends the loop and is returned as a value
    /// either way - a peer-reported error is an outcome for the caller to
    /// inspect, not a link failure. Only transport and decode problems
    /// surface as `Err`: a failed write as [`LinkError::SendFailed`], and a
    /// failed, timed-out, or undecodable read as [`LinkError::NoResponse`].
    pub async fn execute<F>(
        &mut self,
        command: &Command,
        poll: Duration,
        mut on_progress: F,
    ) -> Result<Response, LinkError>
    where
        F: FnMut(&Response),
    {
        let frame = command.encode();
        debug!(opcode = command.opcode.as_str(), len = frame.len(), "sending command");
        self.stream
            .write_all(&frame)
            .await
            .map_err(LinkError::SendFailed)?;
        self.stream.flush().await.map_err(LinkError::SendFailed)?;

        loop {
            let response = self.read_response().await?;
            match response.status {
                Status::Success | Status::Error(_) => return Ok(response),
                Status::Progress => {
                    on_progress(&response);
                    sleep(poll).await;
                }
            }
        }
    }

    async fn read_response(&mut self) -> Result<Response, LinkError> {
        let mut buf = vec![0u8; MAX_FRAME_LEN];
        let read = timeout(self.read_timeout, self.stream.read(&mut buf)).await;
        let n = match read {
            Ok(Ok(0)) => return Err(LinkError::NoResponse("peer closed the link".to_string())),
            Ok(Ok(n)) => n,
            Ok(Err(err)) => return Err(LinkError::NoResponse(format!("read failed: {err}"))),
            Err(_) => {
                return Err(LinkError::NoResponse(format!(
                    "no frame within {:?}",
                    self.read_timeout
                )))
            }
        };
        Response::decode(&buf[..n]).map_err(|err| LinkError::NoResponse(err.to_string()))
    }
}
