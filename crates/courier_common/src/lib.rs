//! Courier Common - wire protocol and installation plan shared between the
//! driver and the peer tooling.

pub mod error;
pub mod plan;
pub mod wire;

pub use error::{DecodeError, LinkError};
pub use plan::InstallPlan;
pub use wire::{Command, Opcode, Response, Status};
