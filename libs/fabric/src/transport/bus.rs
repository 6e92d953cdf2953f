use callframe_core::Envelope;

use crate::transport::Emitter;

/// Which way a message travels on a [`LocalBus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// From the module to the embedded call machine
    ToEmbedded,
    /// From the embedded call machine to the module
    ToModule,
}

/// Pair of in-process emitters shared by both sides of a same-process call
///
/// Create one per process and hand clones to every channel that should be
/// able to talk to each other. Clones share the same subscribers.
#[derive(Debug, Clone, Default)]
pub struct LocalBus {
    to_embedded: Emitter<Envelope>,
    to_module: Emitter<Envelope>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitter(&self, route: Route) -> &Emitter<Envelope> {
        match route {
            Route::ToEmbedded => &self.to_embedded,
            Route::ToModule => &self.to_module,
        }
    }
}
