use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::{Emitter, Handler, MessageEvent, SubscriptionId, TargetOrigin, Window};

/// In-process window: a location plus a listener list
///
/// Posts whose target origin does not admit this window's origin are
/// discarded, like a browser does.
pub struct LocalWindow {
    location: Url,
    listeners: Emitter<MessageEvent>,
}

impl LocalWindow {
    pub fn new(location: Url) -> Self {
        Self {
            location,
            listeners: Emitter::new(),
        }
    }

    /// Create a window from a location string
    pub fn parse(location: &str) -> Result<Self> {
        Ok(Self::new(parse_url(location)?))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.subscriber_count()
    }
}

impl Window for LocalWindow {
    fn location(&self) -> &Url {
        &self.location
    }

    fn post_message(&self, event: MessageEvent, target_origin: &TargetOrigin) {
        let origin = self.origin();
        if !target_origin.matches(&origin) {
            tracing::debug!(
                target_origin = %target_origin,
                window_origin = %origin,
                "target origin does not match window, message not delivered"
            );
            return;
        }
        self.listeners.emit(&event);
    }

    fn add_message_listener(&self, handler: Handler<MessageEvent>) -> SubscriptionId {
        self.listeners.subscribe(handler)
    }

    fn remove_message_listener(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }
}

impl fmt::Debug for LocalWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWindow")
            .field("location", &self.location.as_str())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// An embedded frame: the window inside it and the URL it was pointed at
///
/// `src` stays empty until the frame has been given a page to load; sends
/// addressed to such a frame are dropped.
#[derive(Clone)]
pub struct Frame {
    src: Option<String>,
    content_window: Arc<dyn Window>,
}

impl Frame {
    pub fn new(src: impl Into<String>, content_window: Arc<dyn Window>) -> Self {
        Self {
            src: Some(src.into()),
            content_window,
        }
    }

    /// A frame whose page has not been set yet
    pub fn unloaded(content_window: Arc<dyn Window>) -> Self {
        Self {
            src: None,
            content_window,
        }
    }

    pub fn src(&self) -> Option<&str> {
        self.src.as_deref().filter(|src| !src.is_empty())
    }

    pub fn set_src(&mut self, src: impl Into<String>) {
        self.src = Some(src.into());
    }

    pub fn content_window(&self) -> &Arc<dyn Window> {
        &self.content_window
    }

    /// Target origin for posts into this frame, if its page is known
    pub fn target_origin(&self) -> Result<Option<TargetOrigin>> {
        self.src()
            .map(|src| parse_url(src).map(|url| TargetOrigin::for_url(&url)))
            .transpose()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("src", &self.src)
            .field("content_origin", &self.content_window.origin())
            .finish()
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|source| Error::InvalidUrl {
        url: url.to_string(),
        source,
    })
}
