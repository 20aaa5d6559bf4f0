//! Brokering of third-party connection requests into the running worker.
//!
//! Any part of the host application (typically another window) can ask for
//! its own channel into the one running worker by putting a request on the
//! [`RequestBus`]. The broker answers each request with a freshly opened
//! endpoint, tagged with the request's correlation token — unless the
//! requesting origin disappeared in the meantime, in which case the endpoint
//! is silently released. That discard is routine, never an error.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Error;
use crate::mux::Endpoint;

/// The peer a brokered endpoint is delivered to.
///
/// Origins can vanish at any moment (a window closing is the common case),
/// so liveness is checked both before the endpoint is created and again at
/// delivery time.
pub trait RequestOrigin: Send + Sync {
    /// Whether the origin can still receive a delivery.
    fn is_alive(&self) -> bool;

    /// Hands the endpoint and the original correlation token to the origin.
    fn deliver(&self, token: &str, endpoint: Endpoint);

    /// Tells the origin its request failed. Only called for real failures
    /// (e.g. the worker died); never for a vanished origin.
    fn fail(&self, token: &str, error: Error);
}

/// An inbound ask for a new endpoint. Ephemeral; exists only while the
/// broker processes it.
pub struct ConnectionRequest {
    /// Opaque correlation token the origin uses to match the delivery to
    /// its request.
    pub token: String,
    pub origin: Arc<dyn RequestOrigin>,
}

/// Explicit, injectable bus carrying connection requests to the supervisor.
///
/// Constructed by the host and handed to the supervisor; requesters keep
/// cloneable [`RequestSender`]s. The supervisor takes the consuming end once
/// at start time, which makes listener registration idempotent.
pub struct RequestBus {
    tx: mpsc::UnboundedSender<ConnectionRequest>,
    rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<ConnectionRequest>>>,
}

impl Default for RequestBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: parking_lot::Mutex::new(Some(rx)),
        }
    }

    /// A cloneable handle for putting requests on the bus.
    pub fn sender(&self) -> RequestSender {
        RequestSender {
            tx: self.tx.clone(),
        }
    }

    /// Takes the consuming end. Returns `None` after the first call, so a
    /// second registration cannot duplicate deliveries.
    pub(crate) fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<ConnectionRequest>> {
        self.rx.lock().take()
    }
}

/// Requester-side handle to the bus.
#[derive(Clone)]
pub struct RequestSender {
    tx: mpsc::UnboundedSender<ConnectionRequest>,
}

impl RequestSender {
    /// Asks the supervisor for a new endpoint on behalf of `origin`.
    /// Returns `false` when no supervisor is listening.
    pub fn request(&self, token: impl Into<String>, origin: Arc<dyn RequestOrigin>) -> bool {
        self.tx
            .send(ConnectionRequest {
                token: token.into(),
                origin,
            })
            .is_ok()
    }
}

/// Serves one connection request against the supervisor's `connect`.
///
/// `connect` is whatever the supervisor currently considers its live worker;
/// the broker itself holds no worker state.
pub(crate) fn serve_request<C>(request: ConnectionRequest, connect: C)
where
    C: FnOnce() -> crate::error::Result<Endpoint>,
{
    let ConnectionRequest { token, origin } = request;

    if !origin.is_alive() {
        debug!(target = "termhost", token, "origin gone before service, request discarded");
        return;
    }

    match connect() {
        Ok(endpoint) => {
            // The origin may have vanished while the endpoint was being
            // created; re-check at delivery time and release the endpoint
            // rather than deliver into the void.
            if !origin.is_alive() {
                debug!(
                    target = "termhost",
                    token,
                    channel = endpoint.id(),
                    "origin gone before delivery, endpoint released"
                );
                endpoint.close();
                return;
            }
            debug!(target = "termhost", token, channel = endpoint.id(), "endpoint delivered");
            origin.deliver(&token, endpoint);
        }
        Err(error) => {
            warn!(target = "termhost", token, %error, "connection request failed");
            origin.fail(&token, error);
        }
    }
}
