//! Callframe Fabric - Message channels between a module and its call machine
//!
//! Provides one channel contract ([`MessageChannel`]) over two transports:
//! origin-checked window messaging ([`WebMessageChannel`]) and a same-process
//! bus ([`LocalMessageChannel`]). Messages are addressed by session id, and a
//! send may register a one-shot callback completed by the peer's reply.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use callframe_core::{Envelope, SessionId};
//! use callframe_fabric::{LocalBus, LocalMessageChannel, MessageChannel};
//! use serde_json::json;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = LocalBus::new();
//! let module = LocalMessageChannel::new(bus.clone());
//! let machine = LocalMessageChannel::new(bus);
//! let session = SessionId::from("call-1");
//!
//! let handle = machine.listen_to_module(
//!     &session,
//!     Arc::new(|msg: &Envelope| println!("machine got {:?}", msg.action())),
//! );
//!
//! let ping = json!({ "action": "ping" }).as_object().cloned().unwrap_or_default();
//! module.send_to_embedded(
//!     ping,
//!     Some(Box::new(|reply: &Envelope| println!("reply {:?}", reply.get("result")))),
//!     Some(&session),
//!     None,
//! )?;
//!
//! machine.remove_listener(handle);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod error;
pub mod registry;
pub mod request;
pub mod transport;

// Re-exports for convenience
pub use channel::{
    Listener, LocalMessageChannel, MessageChannel, ScriptChannel, WebMessageChannel,
};
pub use error::{Error, Result};
pub use registry::{Callback, ListenerHandle};
pub use transport::{Frame, LocalBus, LocalWindow, TargetOrigin, Window};
