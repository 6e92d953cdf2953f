use std::sync::Arc;

use callframe_core::{Envelope, Message, SessionId, Stamp, StampSource, UuidStamps};

use crate::channel::{require_session, Listener, MessageChannel};
use crate::error::{Error, Result};
use crate::registry::{Callback, CallbackRegistry, ListenerHandle, ListenerRegistry};
use crate::transport::{Frame, LocalBus, Route, SubscriptionId};

/// Message channel over a same-process [`LocalBus`]
///
/// Both sides run in one trusted process, so there is no marker, direction
/// tag or origin check: direction comes from which emitter a message is put
/// on, and only the session id is filtered.
pub struct LocalMessageChannel {
    bus: LocalBus,
    stamps: Arc<dyn StampSource>,
    callbacks: CallbackRegistry,
    listeners: ListenerRegistry<(Route, SubscriptionId)>,
}

impl LocalMessageChannel {
    /// Create a channel on `bus` with random stamps
    pub fn new(bus: LocalBus) -> Self {
        Self::with_stamps(bus, Arc::new(UuidStamps))
    }

    pub fn with_stamps(bus: LocalBus, stamps: Arc<dyn StampSource>) -> Self {
        Self {
            bus,
            stamps,
            callbacks: CallbackRegistry::new(),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Create a builder for configuring the channel
    pub fn builder() -> LocalMessageChannelBuilder {
        LocalMessageChannelBuilder::new()
    }

    pub fn bus(&self) -> &LocalBus {
        &self.bus
    }

    fn listen(&self, route: Route, session: &SessionId, listener: Listener) -> ListenerHandle {
        let session = session.clone();
        let callbacks = self.callbacks.clone();
        let id = self
            .bus
            .emitter(route)
            .subscribe(Arc::new(move |envelope: &Envelope| {
                if envelope.session_id.as_ref() != Some(&session) {
                    return;
                }
                tracing::trace!(session = %session, ?route, action = envelope.action(), "received local message");
                if let Some(stamp) = &envelope.callback_stamp {
                    callbacks.complete(stamp, envelope);
                }
                listener(envelope);
            }));
        self.listeners.insert((route, id))
    }

    fn send(
        &self,
        route: Route,
        message: Message,
        session: &SessionId,
        callback: Option<Callback>,
    ) -> Result<Option<Stamp>> {
        let mut envelope = Envelope::from_message(message);
        envelope.set_session(session.clone());

        let stamp = callback.map(|callback| {
            let stamp = self.stamps.next_stamp();
            self.callbacks.insert(stamp.clone(), callback);
            stamp
        });
        if let Some(stamp) = &stamp {
            envelope.set_callback_stamp(stamp.clone());
        }

        tracing::trace!(session = %session, ?route, action = envelope.action(), "sending local message");
        self.bus.emitter(route).emit(&envelope);
        Ok(stamp)
    }
}

impl MessageChannel for LocalMessageChannel {
    fn listen_to_embedded(&self, session: &SessionId, listener: Listener) -> ListenerHandle {
        self.listen(Route::ToModule, session, listener)
    }

    fn listen_to_module(&self, session: &SessionId, listener: Listener) -> ListenerHandle {
        self.listen(Route::ToEmbedded, session, listener)
    }

    /// Frames mean nothing in-process; `frame` is ignored.
    fn send_to_embedded(
        &self,
        message: Message,
        callback: Option<Callback>,
        session: Option<&SessionId>,
        _frame: Option<&Frame>,
    ) -> Result<Option<Stamp>> {
        let session = require_session(session)?;
        self.send(Route::ToEmbedded, message, session, callback)
    }

    fn send_to_module(&self, message: Message, session: &SessionId) -> Result<()> {
        self.send(Route::ToModule, message, session, None).map(|_| ())
    }

    fn remove_listener(&self, handle: ListenerHandle) {
        if let Some((route, id)) = self.listeners.remove(handle) {
            self.bus.emitter(route).unsubscribe(id);
        }
    }

    fn cancel_callback(&self, stamp: &Stamp) -> bool {
        self.callbacks.cancel(stamp)
    }

    fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Builder for configuring a [`LocalMessageChannel`]
#[derive(Default)]
pub struct LocalMessageChannelBuilder {
    bus: Option<LocalBus>,
    stamps: Option<Arc<dyn StampSource>>,
}

impl LocalMessageChannelBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bus shared with the other side
    pub fn bus(mut self, bus: LocalBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Set the source of callback stamps
    pub fn stamps(mut self, stamps: Arc<dyn StampSource>) -> Self {
        self.stamps = Some(stamps);
        self
    }

    /// Build the channel with the configured settings
    pub fn build(self) -> Result<LocalMessageChannel> {
        let bus = self
            .bus
            .ok_or_else(|| Error::Custom("Bus not set".to_string()))?;
        let stamps = self.stamps.unwrap_or_else(|| Arc::new(UuidStamps));
        Ok(LocalMessageChannel::with_stamps(bus, stamps))
    }
}
