//! Scripted in-memory peer for exercising the link without a device.
//!
//! Delivers exactly one scripted frame per read call, matching the link's
//! message-boundary contract (one frame per transport read). A peer can
//! carry a fixed frame script, or a responder that maps each written
//! command to the frames it should answer with.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use courier_common::wire::{Opcode, Response, Status};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

pub struct ScriptedPeer {
    frames: VecDeque<Vec<u8>>,
    responder: Option<Responder>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: bool,
}

impl ScriptedPeer {
    /// Peer that answers reads from a fixed frame script.
    pub fn with_frames(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames: frames.into(),
            responder: None,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: false,
        }
    }

    /// Peer that computes its reply frames from each command it receives.
    pub fn with_responder(
        responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    ) -> Self {
        Self {
            frames: VecDeque::new(),
            responder: Some(Box::new(responder)),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: false,
        }
    }

    /// Peer that accepts writes but never answers.
    pub fn silent() -> Self {
        Self::with_frames(Vec::new())
    }

    /// Peer whose read side is already at end of stream.
    pub fn closed() -> Self {
        let mut peer = Self::with_frames(Vec::new());
        peer.closed = true;
        peer
    }

    /// Handle onto the raw command frames written by the driver.
    pub fn sent(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.sent)
    }
}

impl AsyncRead for ScriptedPeer {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(frame) = this.frames.pop_front() {
            buf.put_slice(&frame);
            Poll::Ready(Ok(()))
        } else if this.closed {
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }
}

impl AsyncWrite for ScriptedPeer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.sent.lock().unwrap().push(buf.to_vec());
        if let Some(responder) = this.responder.as_mut() {
            let replies = responder(buf);
            this.frames.extend(replies);
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

pub fn success_frame(opcode: Opcode, detail: &str) -> Vec<u8> {
    Response {
        opcode: opcode.as_u8(),
        status: Status::Success,
        progress: 0,
        detail: detail.to_string(),
    }
    .encode()
}

pub fn progress_frame(opcode: Opcode, percent: u32, detail: &str) -> Vec<u8> {
    Response {
        opcode: opcode.as_u8(),
        status: Status::Progress,
        progress: percent,
        detail: detail.to_string(),
    }
    .encode()
}

pub fn error_frame(opcode: Opcode, detail: &str) -> Vec<u8> {
    Response {
        opcode: opcode.as_u8(),
        status: Status::Error(2),
        progress: 0,
        detail: detail.to_string(),
    }
    .encode()
}
