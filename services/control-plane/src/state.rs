//! Application state shared across request handlers.

use std::sync::Arc;

use keyprop_broadcast::CancellationToken;

use crate::service::KeyPropagationService;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    service: KeyPropagationService,
    transport_kind: &'static str,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        service: KeyPropagationService,
        transport_kind: &'static str,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                service,
                transport_kind,
                shutdown,
            }),
        }
    }

    pub fn service(&self) -> &KeyPropagationService {
        &self.inner.service
    }

    pub fn transport_kind(&self) -> &'static str {
        self.inner.transport_kind
    }

    /// True once shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Cancellation for one request's broadcast. Fires on shutdown.
    pub fn request_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }
}
