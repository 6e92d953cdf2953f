use std::sync::Arc;

use callframe_core::{Direction, Envelope, Message, SessionId, Stamp, StampSource, UuidStamps};

use crate::channel::{require_session, Listener, MessageChannel};
use crate::error::{Error, Result};
use crate::registry::{Callback, CallbackRegistry, ListenerHandle, ListenerRegistry};
use crate::transport::{Frame, Handler, MessageEvent, SubscriptionId, TargetOrigin, Window};

/// Message channel over origin-checked window messaging
///
/// Every channel on a window sees every message posted to it, including
/// unrelated traffic, so inbound messages are filtered on the protocol
/// marker, the session id and the direction tag before anything else runs.
pub struct WebMessageChannel {
    window: Arc<dyn Window>,
    stamps: Arc<dyn StampSource>,
    callbacks: CallbackRegistry,
    listeners: ListenerRegistry<SubscriptionId>,
}

impl WebMessageChannel {
    /// Create a channel on `window` with random stamps
    pub fn new(window: Arc<dyn Window>) -> Self {
        Self::with_stamps(window, Arc::new(UuidStamps))
    }

    pub fn with_stamps(window: Arc<dyn Window>, stamps: Arc<dyn StampSource>) -> Self {
        Self {
            window,
            stamps,
            callbacks: CallbackRegistry::new(),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Create a builder for configuring the channel
    pub fn builder() -> WebMessageChannelBuilder {
        WebMessageChannelBuilder::new()
    }

    /// The window this channel listens on
    pub fn window(&self) -> &Arc<dyn Window> {
        &self.window
    }

    /// Forward an already packaged message to the embedded call machine
    ///
    /// Only the session id is rewritten; marker, direction, stamp and payload
    /// travel as they are. Targeting follows [`MessageChannel::send_to_embedded`],
    /// including the silent drop for frames that have not loaded yet.
    pub fn forward_packaged_to_embedded(
        &self,
        envelope: &Envelope,
        frame: Option<&Frame>,
        session: SessionId,
    ) -> Result<()> {
        let mut forwarded = envelope.clone();
        forwarded.set_session(session);

        match self.embedded_target(frame)? {
            Some((window, target_origin)) => {
                tracing::trace!(
                    session = ?forwarded.session_id,
                    action = forwarded.action(),
                    "forwarding packaged message to embedded"
                );
                self.post(&window, &forwarded, &target_origin)
            }
            None => {
                tracing::debug!(
                    action = forwarded.action(),
                    "no target origin yet, not forwarding packaged message"
                );
                Ok(())
            }
        }
    }

    /// Listen for embedded messages with all protocol fields left in place
    ///
    /// Used by relays that pass the message on rather than handle it.
    pub fn listen_to_packaged_from_embedded(
        &self,
        session: &SessionId,
        listener: Listener,
    ) -> ListenerHandle {
        let session = session.clone();
        self.subscribe(Arc::new(move |event: &MessageEvent| {
            let Ok(envelope) = Envelope::from_value(&event.data) else {
                return;
            };
            if !accepts_from_embedded(&envelope, &session) {
                return;
            }
            listener(&envelope);
        }))
    }

    pub fn remove_packaged_listener(&self, handle: ListenerHandle) {
        self.unsubscribe(handle);
    }

    fn subscribe(&self, handler: Handler<MessageEvent>) -> ListenerHandle {
        let id = self.window.add_message_listener(handler);
        self.listeners.insert(id)
    }

    fn unsubscribe(&self, handle: ListenerHandle) {
        if let Some(id) = self.listeners.remove(handle) {
            self.window.remove_message_listener(id);
        }
    }

    /// Window and origin to post to when addressing the call machine
    ///
    /// `None` when the destination frame has no page yet.
    fn embedded_target(
        &self,
        frame: Option<&Frame>,
    ) -> Result<Option<(Arc<dyn Window>, TargetOrigin)>> {
        match frame {
            Some(frame) => Ok(frame
                .target_origin()?
                .map(|origin| (Arc::clone(frame.content_window()), origin))),
            None => Ok(Some((Arc::clone(&self.window), self.own_target_origin()))),
        }
    }

    fn own_target_origin(&self) -> TargetOrigin {
        TargetOrigin::for_url(self.window.location())
    }

    fn post(
        &self,
        window: &Arc<dyn Window>,
        envelope: &Envelope,
        target_origin: &TargetOrigin,
    ) -> Result<()> {
        let data = envelope.to_value()?;
        window.post_message(MessageEvent::new(data, self.window.origin()), target_origin);
        Ok(())
    }
}

impl MessageChannel for WebMessageChannel {
    fn listen_to_embedded(&self, session: &SessionId, listener: Listener) -> ListenerHandle {
        let session = session.clone();
        let callbacks = self.callbacks.clone();
        self.subscribe(Arc::new(move |event: &MessageEvent| {
            let Ok(mut envelope) = Envelope::from_value(&event.data) else {
                return;
            };
            if !accepts_from_embedded(&envelope, &session) {
                return;
            }
            tracing::trace!(session = %session, action = envelope.action(), "received embedded message");

            envelope.from = None;
            envelope.payload.remove("from");
            if let Some(stamp) = envelope.callback_stamp.clone() {
                callbacks.complete(&stamp, &envelope);
            }
            listener(&envelope.stripped());
        }))
    }

    fn listen_to_module(&self, session: &SessionId, listener: Listener) -> ListenerHandle {
        let session = session.clone();
        self.subscribe(Arc::new(move |event: &MessageEvent| {
            let Ok(envelope) = Envelope::from_value(&event.data) else {
                return;
            };
            if !accepts_from_module(&envelope, &session) {
                return;
            }
            tracing::trace!(session = %session, action = envelope.action(), "received module message");
            listener(&envelope);
        }))
    }

    fn send_to_embedded(
        &self,
        message: Message,
        callback: Option<Callback>,
        session: Option<&SessionId>,
        frame: Option<&Frame>,
    ) -> Result<Option<Stamp>> {
        let session = require_session(session)?;
        let target = self.embedded_target(frame)?;

        let mut envelope = Envelope::from_message(message);
        envelope.set_marker();
        envelope.set_from(Direction::Module);
        envelope.set_session(session.clone());

        let stamp = callback.map(|callback| {
            let stamp = self.stamps.next_stamp();
            self.callbacks.insert(stamp.clone(), callback);
            stamp
        });
        if let Some(stamp) = &stamp {
            envelope.set_callback_stamp(stamp.clone());
        }

        match target {
            Some((window, target_origin)) => {
                tracing::trace!(
                    session = %session,
                    action = envelope.action(),
                    target_origin = %target_origin,
                    "sending message to embedded"
                );
                self.post(&window, &envelope, &target_origin)?;
            }
            None => {
                tracing::debug!(
                    session = %session,
                    action = envelope.action(),
                    "no target origin yet, not sending message to embedded"
                );
            }
        }
        Ok(stamp)
    }

    fn send_to_module(&self, message: Message, session: &SessionId) -> Result<()> {
        let mut envelope = Envelope::from_message(message);
        envelope.set_marker();
        envelope.set_from(Direction::Embedded);
        envelope.set_session(session.clone());

        tracing::trace!(session = %session, action = envelope.action(), "sending message to module");
        // Only the module in this same window hears this; a relay in the
        // frame is responsible for passing it further up.
        self.post(&self.window, &envelope, &self.own_target_origin())
    }

    fn remove_listener(&self, handle: ListenerHandle) {
        self.unsubscribe(handle);
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

/// Filter for messages heard by the module
///
/// Senders predating session ids leave them out, so a missing id matches.
fn accepts_from_embedded(envelope: &Envelope, session: &SessionId) -> bool {
    let session_matches = match envelope.session() {
        Some(id) => id == session,
        None => !envelope.has_unreadable_session(),
    };
    envelope.is_channel_message() && session_matches && envelope.from != Some(Direction::Module)
}

/// Filter for messages heard by the call machine
///
/// Stricter than the embedded side: the direction must be absent or exactly
/// `module`, an action is required, and anything carrying the old
/// `callFrameId` is dropped even when the session matches, since outer
/// frames that still send it disagree about what the id means.
fn accepts_from_module(envelope: &Envelope, session: &SessionId) -> bool {
    let session_matches = match (envelope.session(), session.is_empty()) {
        (_, true) => true,
        (Some(id), false) => id == session,
        (None, false) => !envelope.has_unreadable_session(),
    };
    envelope.is_channel_message()
        && envelope.has_action()
        && matches!(envelope.from, None | Some(Direction::Module))
        && session_matches
        && !envelope.has_legacy_frame_id()
}

/// Builder for configuring a [`WebMessageChannel`]
#[derive(Default)]
pub struct WebMessageChannelBuilder {
    window: Option<Arc<dyn Window>>,
    stamps: Option<Arc<dyn StampSource>>,
}

impl WebMessageChannelBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the window to listen and post on
    pub fn window(mut self, window: Arc<dyn Window>) -> Self {
        self.window = Some(window);
        self
    }

    /// Set the source of callback stamps
    pub fn stamps(mut self, stamps: Arc<dyn StampSource>) -> Self {
        self.stamps = Some(stamps);
        self
    }

    /// Build the channel with the configured settings
    pub fn build(self) -> Result<WebMessageChannel> {
        let window = self
            .window
            .ok_or_else(|| Error::Custom("Window not set".to_string()))?;
        let stamps = self.stamps.unwrap_or_else(|| Arc::new(UuidStamps));
        Ok(WebMessageChannel::with_stamps(window, stamps))
    }
}
