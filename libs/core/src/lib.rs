//! Callframe Core - Shared data model for call message channels
//!
//! Defines the wire envelope exchanged between the host module and the
//! embedded call machine, the identifiers that address it (session ids,
//! callback stamps), and the stamp sources used to correlate replies.

pub mod envelope;
pub mod error;
pub mod stamp;

// Re-exports for convenience
pub use envelope::{Direction, Envelope, Message, SessionId, Stamp, MESSAGE_MARKER};
pub use error::{Error, Result};
pub use stamp::{CounterStamps, StampSource, UuidStamps};
