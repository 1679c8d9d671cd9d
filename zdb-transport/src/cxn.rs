//! `Cxn`: one peer connection's socket plus its outbound RING buffer
//! (§4.5). `Cxn` owns two RING buffers plus the socket in the source;
//! here the inbound side is realized by [`crate::codec::FrameCodec`]
//! reading straight off the socket (no staging ring needed, since
//! `tokio::net::TcpStream` already buffers), while the outbound side keeps
//! a real [`zdb_ring::Ring`] as the queue [`engine::Replicator::replicate`]
//! enqueues into, decoupling a commit's caller from the speed of the
//! socket.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{Encoder, FramedRead};

use zdb_errors::{internal_err, Result};
use zdb_kv::engine::{Engine, Replicator};
use zdb_kv::frame::Frame;
use zdb_kv::ids::HostId;
use zdb_ring::{OpenMode, Ring, RingParams, RingStatus};

use crate::codec::{FrameCodec, WireMessage};

/// A peer connection: the socket (split once `run` starts it) plus the
/// outbound ring [`Replicator::replicate`] pushes serialized frames into.
pub struct Cxn {
    peer: HostId,
    peer_addr: (IpAddr, u16),
    outbound: Ring<false, false>,
}

impl Cxn {
    /// Build a connection handle for `peer`, with its own outbound ring
    /// sized by `ring_params` (§6.2 RING config).
    pub fn new(peer: HostId, peer_addr: (IpAddr, u16), ring_params: RingParams) -> Result<Cxn> {
        let outbound = Ring::open(OpenMode::ReadWrite, ring_params).map_err(|e| internal_err!("failed to open outbound ring for {peer}: {e}"))?;
        Ok(Cxn { peer, peer_addr, outbound })
    }

    /// This connection's peer.
    pub fn peer(&self) -> HostId {
        self.peer
    }

    /// The address to (re)connect to, per `reconnect_freq` (§6.2, §7).
    pub fn peer_addr(&self) -> (IpAddr, u16) {
        self.peer_addr
    }

    fn enqueue(&self, msg: WireMessage) -> bool {
        let mut buf = BytesMut::new();
        if FrameCodec::new().encode(msg, &mut buf).is_err() {
            return false;
        }
        let len = buf.len() as u32;
        if !matches!(self.outbound.write_status(len), RingStatus::Ready) {
            return false;
        }
        match self.outbound.push(len) {
            Ok(Some(mut reserved)) => {
                reserved.bytes.copy_from_slice(&buf);
                self.outbound.push2(reserved);
                true
            }
            _ => false,
        }
    }

    /// Drive `stream` until disconnect: one task decodes inbound frames
    /// and dispatches them into `engine`, the other drains this
    /// connection's outbound ring onto the wire. Either side ending marks
    /// the peer disconnected via [`Engine::on_disconnect`] (§4.4.6).
    pub async fn run(self: Arc<Cxn>, stream: TcpStream, engine: Arc<Engine>) {
        let (read_half, write_half) = stream.into_split();
        tokio::select! {
            _ = Self::rx_loop(Arc::clone(&self), read_half, Arc::clone(&engine)) => {}
            _ = Self::tx_loop(Arc::clone(&self), write_half) => {}
        }
        engine.on_disconnect(self.peer);
    }

    async fn rx_loop(self: Arc<Cxn>, read_half: OwnedReadHalf, engine: Arc<Engine>) {
        let mut framed = FramedRead::new(read_half, FrameCodec::new());
        while let Some(result) = framed.next().await {
            match result {
                Ok(WireMessage::Kv(Frame::Heartbeat(hb))) => {
                    // `on_heartbeat` re-runs the election ranking under
                    // `Engine`'s synchronous mutex; push it off this task's
                    // executor thread rather than hold that lock inline on
                    // the tokio runtime (§4.4.4 ADD dispatch model).
                    let engine = Arc::clone(&engine);
                    if tokio::task::spawn_blocking(move || engine.on_heartbeat(hb)).await.is_err() {
                        tracing::error!(peer = %self.peer, "heartbeat dispatch task panicked");
                    }
                }
                Ok(WireMessage::Kv(Frame::Record(record))) => {
                    if let Err(err) = engine.apply_record(record).await {
                        tracing::warn!(peer = %self.peer, error = %err, "dropping malformed replicated record");
                    }
                }
                Ok(WireMessage::Kv(Frame::Commit(commit))) => {
                    if let Err(err) = engine.apply_commit_frame(commit) {
                        tracing::warn!(peer = %self.peer, error = %err, "dropping commit frame for an unregistered table");
                    }
                }
                Ok(WireMessage::Control(_)) => {
                    // Routed/ignored per §6.1; admin-CLI traffic is an
                    // out-of-scope external collaborator (§1, §6.4).
                }
                Err(err) => {
                    tracing::warn!(peer = %self.peer, error = %err, "protocol error; disconnecting peer");
                    return;
                }
            }
        }
    }

    async fn tx_loop(self: Arc<Cxn>, mut write_half: OwnedWriteHalf) {
        loop {
            match self.outbound.read_status() {
                RingStatus::Ready => {
                    let record = match self.outbound.shift() {
                        Ok(Some(record)) => record,
                        Ok(None) => continue,
                        Err(err) => {
                            tracing::error!(peer = %self.peer, error = %err, "outbound ring error; disconnecting");
                            return;
                        }
                    };
                    let bytes = record.payload.to_vec();
                    self.outbound.shift2(record);
                    if write_half.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
                RingStatus::EndOfFile => return,
                RingStatus::Empty | RingStatus::NotReady => {
                    // Non-blocking poll rather than `Ring::shift`'s
                    // spin/park blocker, which would stall a tokio worker
                    // (§4.4.4 ADD: socket TX stays on the tokio runtime,
                    // only table/election owners get dedicated threads).
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        }
    }

    /// Close the outbound ring so [`Cxn::run`]'s TX loop returns once
    /// drained, instead of waiting for `Empty` forever.
    pub fn close(&self) {
        self.outbound.eof(true);
    }
}

impl Replicator for Cxn {
    fn replicate(&self, frame: Frame) -> bool {
        self.enqueue(WireMessage::Kv(frame))
    }
}
