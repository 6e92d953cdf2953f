use std::sync::Arc;

use callframe_core::{Envelope, Message, SessionId, Stamp};

use crate::error::Result;
use crate::registry::{Callback, ListenerHandle};
use crate::transport::{Frame, LocalBus, Window};

pub mod local;
pub mod web;

pub use self::local::{LocalMessageChannel, LocalMessageChannelBuilder};
pub use self::web::{WebMessageChannel, WebMessageChannelBuilder};

/// Handler for accepted inbound messages
pub type Listener = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Two-way message channel between the module and the embedded call machine
///
/// The module side listens to the embedded side and sends to it; the
/// embedded side does the reverse. Every listen call returns a fresh
/// [`ListenerHandle`], so the same closure can be registered any number of
/// times without one registration replacing another.
pub trait MessageChannel: Send + Sync {
    /// Listen for messages from the embedded call machine addressed to `session`.
    /// For use by the module.
    fn listen_to_embedded(&self, session: &SessionId, listener: Listener) -> ListenerHandle;

    /// Listen for messages from the module addressed to `session`.
    /// For use by the embedded call machine.
    fn listen_to_module(&self, session: &SessionId, listener: Listener) -> ListenerHandle;

    /// Send a message to the embedded call machine. For use by the module.
    ///
    /// When `callback` is given it is registered under a fresh stamp, which
    /// is carried in the message and returned. The callback fires once, for
    /// the first reply echoing that stamp. `frame` addresses a specific
    /// embedded frame on transports that have them.
    fn send_to_embedded(
        &self,
        message: Message,
        callback: Option<Callback>,
        session: Option<&SessionId>,
        frame: Option<&Frame>,
    ) -> Result<Option<Stamp>>;

    /// Send a message to the module. For use by the embedded call machine.
    fn send_to_module(&self, message: Message, session: &SessionId) -> Result<()>;

    /// Detach a listener. Unknown or already removed handles are ignored.
    fn remove_listener(&self, handle: ListenerHandle);

    /// Forget a pending callback without running it
    fn cancel_callback(&self, stamp: &Stamp) -> bool;

    /// Number of callbacks still waiting for a reply
    fn pending_callbacks(&self) -> usize;

    /// Number of attached listeners
    fn listener_count(&self) -> usize;
}

/// Message channel over whichever transport the process runs on
pub enum ScriptChannel {
    /// Browser-style window messaging across an origin boundary
    Web(WebMessageChannel),
    /// Same-process bus with no origin boundary
    Local(LocalMessageChannel),
}

impl ScriptChannel {
    pub fn web(window: Arc<dyn Window>) -> Self {
        ScriptChannel::Web(WebMessageChannel::new(window))
    }

    pub fn local(bus: LocalBus) -> Self {
        ScriptChannel::Local(LocalMessageChannel::new(bus))
    }

    /// The window channel, for the relay operations only it supports
    pub fn as_web(&self) -> Option<&WebMessageChannel> {
        match self {
            ScriptChannel::Web(channel) => Some(channel),
            ScriptChannel::Local(_) => None,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $channel:ident => $call:expr) => {
        match $self {
            ScriptChannel::Web($channel) => $call,
            ScriptChannel::Local($channel) => $call,
        }
    };
}

impl MessageChannel for ScriptChannel {
    fn listen_to_embedded(&self, session: &SessionId, listener: Listener) -> ListenerHandle {
        dispatch!(self, c => c.listen_to_embedded(session, listener))
    }

    fn listen_to_module(&self, session: &SessionId, listener: Listener) -> ListenerHandle {
        dispatch!(self, c => c.listen_to_module(session, listener))
    }

    fn send_to_embedded(
        &self,
        message: Message,
        callback: Option<Callback>,
        session: Option<&SessionId>,
        frame: Option<&Frame>,
    ) -> Result<Option<Stamp>> {
        dispatch!(self, c => c.send_to_embedded(message, callback, session, frame))
    }

    fn send_to_module(&self, message: Message, session: &SessionId) -> Result<()> {
        dispatch!(self, c => c.send_to_module(message, session))
    }

    fn remove_listener(&self, handle: ListenerHandle) {
        dispatch!(self, c => c.remove_listener(handle))
    }

    fn cancel_callback(&self, stamp: &Stamp) -> bool {
        dispatch!(self, c => c.cancel_callback(stamp))
    }

    fn pending_callbacks(&self) -> usize {
        dispatch!(self, c => c.pending_callbacks())
    }

    fn listener_count(&self) -> usize {
        dispatch!(self, c => c.listener_count())
    }
}

/// Session to address a send to, rejecting missing or empty ids
pub(crate) fn require_session(session: Option<&SessionId>) -> Result<&SessionId> {
    session
        .filter(|id| !id.is_empty())
        .ok_or(crate::error::Error::MissingSessionId)
}
