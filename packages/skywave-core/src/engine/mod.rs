//! Audio engine control channel.
//!
//! The engine exposes a line-oriented command protocol on a local Unix
//! stream socket: one request line in, one or more response lines out,
//! terminated by a literal `END` line. This module owns the transport
//! ([`client`]) and the response parsing ([`protocol`]).

mod client;
pub mod protocol;

pub use client::{EngineClient, EngineError, EngineResult};

/// The engine queues the control plane pushes into.
///
/// Priority order at the engine is override > breaks > music > safety;
/// the control plane only ever writes the first three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineQueue {
    Override,
    Breaks,
    Music,
}

impl EngineQueue {
    /// The queue's name on the engine socket.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Breaks => "breaks",
            Self::Music => "music",
        }
    }
}
