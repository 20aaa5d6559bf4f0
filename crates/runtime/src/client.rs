//! Structured client over the primary endpoint.
//!
//! Adds request/response correlation and event framing on top of a raw
//! [`Endpoint`]: sequential request ids, a pending-callback map resolved by
//! a dispatch task, and a stream of unsolicited worker events.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use termhost_protocol::{ChannelId, Event, Message, Request, Response};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::mux::{Endpoint, EndpointSender};

type Callbacks = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

/// Request/response client over one worker channel.
///
/// No bound is placed on how long a request may stay pending; if the worker
/// never answers, [`Client::request`] resolves only once the channel dies.
pub struct Client {
    last_id: AtomicU32,
    callbacks: Callbacks,
    sender: EndpointSender,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    dispatch: JoinHandle<()>,
}

impl Client {
    /// Wraps an endpoint. The endpoint moves into the dispatch task, which
    /// routes responses to pending requests and forwards events; disposing
    /// the client closes the endpoint.
    pub fn new(endpoint: Endpoint) -> Self {
        let sender = endpoint.sender();
        let callbacks: Callbacks = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let task_callbacks = Arc::clone(&callbacks);
        let dispatch = tokio::spawn(async move {
            let mut endpoint = endpoint;
            while let Some(payload) = endpoint.recv().await {
                dispatch_payload(payload, &task_callbacks, &events_tx);
            }
            fail_pending(&task_callbacks);
        });

        Self {
            last_id: AtomicU32::new(0),
            callbacks,
            sender,
            events_rx: Mutex::new(Some(events_rx)),
            dispatch,
        }
    }

    /// The raw channel id of the primary endpoint this client wraps.
    pub fn channel(&self) -> ChannelId {
        self.sender.id()
    }

    /// Sends a request to the worker and awaits its response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.callbacks.lock().insert(id, tx);
        let mut guard = CancelGuard {
            id,
            callbacks: Arc::clone(&self.callbacks),
            completed: false,
        };

        let request = serde_json::to_value(Request {
            id,
            method: method.to_string(),
            params,
        })?;
        self.sender.send(request)?;

        debug!(target = "termhost", id, method, "request sent, awaiting response");
        let result = rx.await.map_err(|_| Error::ChannelClosed).and_then(|r| r);
        guard.completed = true;
        result
    }

    /// Stream of unsolicited worker events. Can be taken once.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<Event>> {
        self.events_rx.lock().take()
    }

    /// Stops the dispatch task, fails every pending request with
    /// [`Error::ChannelClosed`], and closes the underlying endpoint.
    pub fn dispose(&self) {
        // Aborting the task drops the endpoint it owns, which retires the
        // channel on the wire.
        self.dispatch.abort();
        fail_pending(&self.callbacks);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Removes the pending callback when a request future is dropped before its
/// response arrives, so the map cannot grow with orphans.
struct CancelGuard {
    id: u32,
    callbacks: Callbacks,
    completed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.completed && self.callbacks.lock().remove(&self.id).is_some() {
            debug!(target = "termhost", id = self.id, "request cancelled, callback removed");
        }
    }
}

fn fail_pending(callbacks: &Callbacks) {
    let pending: Vec<_> = callbacks.lock().drain().collect();
    for (_, tx) in pending {
        let _ = tx.send(Err(Error::ChannelClosed));
    }
}

fn dispatch_payload(
    payload: Value,
    callbacks: &Callbacks,
    events_tx: &mpsc::UnboundedSender<Event>,
) {
    match serde_json::from_value::<Message>(payload) {
        Ok(Message::Response(response)) => {
            let id = response.id;
            match callbacks.lock().remove(&id) {
                Some(tx) => {
                    let _ = tx.send(response_result(response));
                }
                None => debug!(target = "termhost", id, "response for unknown request (ignored)"),
            }
        }
        Ok(Message::Event(event)) => {
            let _ = events_tx.send(event);
        }
        Ok(Message::Unknown(value)) => {
            debug!(target = "termhost", %value, "unknown message from worker (ignored)");
        }
        Err(e) => {
            error!(target = "termhost", error = %e, "failed to parse worker message");
        }
    }
}

fn response_result(response: Response) -> Result<Value> {
    match response.error {
        Some(payload) => Err(Error::Worker {
            name: payload.name,
            message: payload.message,
        }),
        None => Ok(response.result.unwrap_or(Value::Null)),
    }
}
