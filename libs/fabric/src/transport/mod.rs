use std::fmt;

use serde_json::Value;
use url::Url;

pub mod bus;
pub mod emitter;
pub mod window;

pub use self::bus::{LocalBus, Route};
pub use self::emitter::{Emitter, Handler};
pub use self::window::{Frame, LocalWindow};

/// Handle for one subscription on a broadcast primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// A message as seen by a window listener
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Posted data
    pub data: Value,
    /// Origin of the window that posted it
    pub origin: String,
}

impl MessageEvent {
    pub fn new(data: Value, origin: impl Into<String>) -> Self {
        Self {
            data,
            origin: origin.into(),
        }
    }
}

/// Restriction on which window origin may receive a posted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    /// `*`: deliver regardless of origin
    Any,
    Exact(String),
}

impl TargetOrigin {
    /// Target origin for a page at `url`
    ///
    /// Pages loaded from `file:` URLs have an opaque origin that cannot be
    /// targeted, so they get the wildcard.
    pub fn for_url(url: &Url) -> Self {
        if url.scheme() == "file" {
            TargetOrigin::Any
        } else {
            TargetOrigin::Exact(url.origin().ascii_serialization())
        }
    }

    pub fn matches(&self, origin: &str) -> bool {
        match self {
            TargetOrigin::Any => true,
            TargetOrigin::Exact(expected) => expected == origin,
        }
    }
}

impl fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOrigin::Any => f.write_str("*"),
            TargetOrigin::Exact(origin) => f.write_str(origin),
        }
    }
}

/// Origin-checked broadcast primitive, modelled on browser window messaging
///
/// Every listener on a window sees every message delivered to it; a post is
/// only delivered when the target origin admits the window's own origin.
pub trait Window: Send + Sync {
    /// Current location of the page in this window
    fn location(&self) -> &Url;

    /// Serialized origin of this window
    fn origin(&self) -> String {
        self.location().origin().ascii_serialization()
    }

    /// Post a message to this window
    fn post_message(&self, event: MessageEvent, target_origin: &TargetOrigin);

    /// Listen for every message delivered to this window
    fn add_message_listener(&self, handler: Handler<MessageEvent>) -> SubscriptionId;

    /// Stop listening. Unknown ids are ignored.
    fn remove_message_listener(&self, id: SubscriptionId) -> bool;
}
