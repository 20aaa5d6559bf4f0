//! Channel multiplexer over the worker pipe.
//!
//! One writer task and one reader task own the two halves of the pipe.
//! Every logical channel is an [`Endpoint`]: sends are tagged with the
//! channel id and queued to the writer; inbound `Data` frames are routed to
//! the owning endpoint through a concurrent routing table. Opening and
//! closing endpoints emits `Open`/`Close` control frames so the worker can
//! allocate and release the resources backing each channel.
//!
//! The multiplexer is generic over the stream so tests can run it over an
//! in-memory duplex pipe instead of a child process.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use termhost_protocol::{
    ChannelId, Frame, LENGTH_PREFIX_BYTES, MAX_FRAME_LEN, encode_frame, parse_frame,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

type Routes = Arc<DashMap<ChannelId, mpsc::UnboundedSender<Value>>>;

/// Shared handle to a running multiplexer.
#[derive(Clone)]
pub(crate) struct MuxHandle {
    next_channel: Arc<AtomicU32>,
    routes: Routes,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl MuxHandle {
    /// Starts the writer and reader tasks over the given pipe halves.
    ///
    /// Both tasks end on their own: the writer when every sender is gone,
    /// the reader at pipe EOF (worker death), which also closes every
    /// endpoint's inbound stream.
    pub(crate) fn spawn(
        writer: impl AsyncWrite + Unpin + Send + 'static,
        reader: impl AsyncRead + Unpin + Send + 'static,
    ) -> Self {
        let routes: Routes = Arc::new(DashMap::new());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(writer, outbound_rx));
        tokio::spawn(read_loop(reader, Arc::clone(&routes)));

        Self {
            next_channel: Arc::new(AtomicU32::new(1)),
            routes,
            outbound,
        }
    }

    /// Opens a new endpoint. Never blocks; any number of concurrent opens
    /// yield independent endpoints over the same pipe.
    pub(crate) fn open(&self) -> Result<Endpoint> {
        let id = self.next_channel.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.insert(id, tx);

        if self.outbound.send(Frame::Open { channel: id }).is_err() {
            self.routes.remove(&id);
            return Err(Error::ChannelClosed);
        }

        debug!(target = "termhost", channel = id, "opened endpoint");
        Ok(Endpoint {
            id,
            outbound: self.outbound.clone(),
            rx,
            routes: Arc::clone(&self.routes),
        })
    }

    /// Number of endpoints currently routed. Diagnostic; the resource-leak
    /// tests assert this stays flat across discard cycles.
    pub(crate) fn active_endpoints(&self) -> usize {
        self.routes.len()
    }
}

/// One bidirectional message channel into the worker.
///
/// Independently owned by whichever caller obtained it; dropping it retires
/// the channel on both sides without affecting any other endpoint.
#[derive(Debug)]
pub struct Endpoint {
    id: ChannelId,
    outbound: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Value>,
    routes: Routes,
}

impl Endpoint {
    /// The channel id this endpoint occupies on the pipe.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Queues a payload to the worker on this channel.
    pub fn send(&self, payload: Value) -> Result<()> {
        self.outbound
            .send(Frame::Data {
                channel: self.id,
                payload,
            })
            .map_err(|_| Error::ChannelClosed)
    }

    /// Receives the next payload routed to this channel. Returns `None`
    /// once the channel was closed by either side or the worker died.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Splits off a cheap send-only half. Senders do not keep the channel
    /// alive; the endpoint itself does.
    pub fn sender(&self) -> EndpointSender {
        EndpointSender {
            id: self.id,
            outbound: self.outbound.clone(),
        }
    }

    /// Closes the endpoint, releasing the worker-side resource backing it.
    /// Equivalent to dropping it.
    pub fn close(self) {}
}

/// Send-only half of an [`Endpoint`].
#[derive(Debug, Clone)]
pub struct EndpointSender {
    id: ChannelId,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl EndpointSender {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Queues a payload to the worker on this channel.
    pub fn send(&self, payload: Value) -> Result<()> {
        self.outbound
            .send(Frame::Data {
                channel: self.id,
                payload,
            })
            .map_err(|_| Error::ChannelClosed)
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        // Only emit a close frame if the route was still ours; the worker
        // closing first (or dying) already retired it.
        if self.routes.remove(&self.id).is_some() {
            let _ = self.outbound.send(Frame::Close { channel: self.id });
            debug!(target = "termhost", channel = self.id, "closed endpoint");
        }
    }
}

async fn write_loop(
    mut writer: impl AsyncWrite + Unpin,
    mut outbound_rx: mpsc::UnboundedReceiver<Frame>,
) {
    while let Some(frame) = outbound_rx.recv().await {
        let bytes = match encode_frame(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(target = "termhost", error = %e, "failed to encode frame");
                continue;
            }
        };
        if let Err(e) = writer.write_all(&bytes).await {
            error!(target = "termhost", error = %e, "worker pipe write failed");
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
}

async fn read_loop(mut reader: impl AsyncRead + Unpin, routes: Routes) {
    loop {
        let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
        if reader.read_exact(&mut len_buf).await.is_err() {
            break;
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            error!(target = "termhost", len, "oversized frame from worker, closing link");
            break;
        }

        let mut body = vec![0u8; len];
        if reader.read_exact(&mut body).await.is_err() {
            break;
        }

        match parse_frame(&body) {
            Ok(Frame::Data { channel, payload }) => match routes.get(&channel) {
                Some(tx) => {
                    let _ = tx.send(payload);
                }
                None => {
                    debug!(target = "termhost", channel, "data for unknown channel (ignored)");
                }
            },
            Ok(Frame::Close { channel }) => {
                routes.remove(&channel);
                debug!(target = "termhost", channel, "worker closed channel");
            }
            Ok(Frame::Open { channel }) => {
                // Channel allocation is supervisor-side only.
                warn!(target = "termhost", channel, "unexpected open frame from worker");
            }
            Err(e) => {
                error!(target = "termhost", error = %e, "unparseable frame from worker");
            }
        }
    }

    // Worker link is gone: drop every route so endpoint streams end.
    routes.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    /// Mux over one end of an in-memory duplex pipe; returns the peer end.
    fn mux_over_duplex() -> (MuxHandle, tokio::io::DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (read_half, write_half) = tokio::io::split(ours);
        (MuxHandle::spawn(write_half, read_half), theirs)
    }

    async fn read_peer_frame(peer: &mut tokio::io::DuplexStream) -> Frame {
        let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
        peer.read_exact(&mut len_buf).await.unwrap();
        let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        peer.read_exact(&mut body).await.unwrap();
        parse_frame(&body).unwrap()
    }

    async fn write_peer_frame(peer: &mut tokio::io::DuplexStream, frame: &Frame) {
        peer.write_all(&encode_frame(frame).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn open_emits_open_frame_and_routes_data_back() {
        let (mux, mut peer) = mux_over_duplex();
        let mut endpoint = mux.open().unwrap();

        assert_eq!(
            read_peer_frame(&mut peer).await,
            Frame::Open { channel: endpoint.id() }
        );

        write_peer_frame(
            &mut peer,
            &Frame::Data {
                channel: endpoint.id(),
                payload: json!({"hello": "world"}),
            },
        )
        .await;
        assert_eq!(endpoint.recv().await.unwrap(), json!({"hello": "world"}));
    }

    #[tokio::test]
    async fn concurrent_opens_yield_distinct_independent_endpoints() {
        let (mux, mut peer) = mux_over_duplex();
        let endpoints: Vec<Endpoint> = (0..8).map(|_| mux.open().unwrap()).collect();

        let mut ids: Vec<ChannelId> = endpoints.iter().map(Endpoint::id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(mux.active_endpoints(), 8);

        // Closing one endpoint leaves the others routable.
        let mut endpoints = endpoints;
        let closed = endpoints.remove(3);
        let closed_id = closed.id();
        closed.close();
        assert_eq!(mux.active_endpoints(), 7);

        // Drain the peer side until the close frame shows up.
        loop {
            if read_peer_frame(&mut peer).await == (Frame::Close { channel: closed_id }) {
                break;
            }
        }

        let survivor = &mut endpoints[0];
        write_peer_frame(
            &mut peer,
            &Frame::Data {
                channel: survivor.id(),
                payload: json!(1),
            },
        )
        .await;
        assert_eq!(survivor.recv().await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn data_for_closed_channel_is_dropped() {
        let (mux, mut peer) = mux_over_duplex();
        let endpoint = mux.open().unwrap();
        let id = endpoint.id();
        drop(endpoint);

        write_peer_frame(
            &mut peer,
            &Frame::Data {
                channel: id,
                payload: json!("stale"),
            },
        )
        .await;

        // A fresh endpoint is unaffected by the stale traffic.
        let mut fresh = mux.open().unwrap();
        write_peer_frame(
            &mut peer,
            &Frame::Data {
                channel: fresh.id(),
                payload: json!("fresh"),
            },
        )
        .await;
        assert_eq!(fresh.recv().await.unwrap(), json!("fresh"));
    }

    #[tokio::test]
    async fn worker_close_frame_retires_route() {
        let (mux, mut peer) = mux_over_duplex();
        let mut endpoint = mux.open().unwrap();
        write_peer_frame(&mut peer, &Frame::Close { channel: endpoint.id() }).await;
        assert_eq!(endpoint.recv().await, None);
        assert_eq!(mux.active_endpoints(), 0);
    }

    #[tokio::test]
    async fn peer_eof_ends_every_endpoint() {
        let (mux, peer) = mux_over_duplex();
        let mut a = mux.open().unwrap();
        let mut b = mux.open().unwrap();
        drop(peer);

        assert_eq!(a.recv().await, None);
        assert_eq!(b.recv().await, None);
        // Sends eventually fail once the writer task observed the break.
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if a.send(json!(0)).is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("send should start failing after peer EOF");
    }

    #[tokio::test]
    async fn oversized_frame_closes_the_link() {
        let (mux, mut peer) = mux_over_duplex();
        let mut endpoint = mux.open().unwrap();

        let bogus_len = (MAX_FRAME_LEN as u32 + 1).to_le_bytes();
        peer.write_all(&bogus_len).await.unwrap();

        assert_eq!(endpoint.recv().await, None);
        assert_eq!(mux.active_endpoints(), 0);
    }

    #[tokio::test]
    async fn repeated_open_close_cycles_do_not_grow_routing_table() {
        let (mux, peer) = mux_over_duplex();
        for _ in 0..1_000 {
            let endpoint = mux.open().unwrap();
            endpoint.close();
        }
        assert_eq!(mux.active_endpoints(), 0);
        drop(peer);
    }
}
