//! Length-delimited wire framing (§6.1): an 8-byte `Hdr` followed by a
//! `bincode`-encoded payload, the "two-stage callback (verify header
//! length, then verify payload)" the source describes realized as a
//! `tokio_util::codec::Decoder`/`Encoder` pair, modeled on the
//! `tokio_util::codec` usage common to the corpus's own gazette/broker
//! transports.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use zdb_errors::{internal_err, Error};
use zdb_kv::frame::Frame;

/// On-wire header size in bytes: `length:u32 + type:u8 + shard:u8 +
/// reserved:u16` (§6.1).
pub const HDR_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameType {
    Kv,
    Control,
}

impl FrameType {
    fn to_u8(self) -> u8 {
        match self {
            FrameType::Kv => 0,
            FrameType::Control => 1,
        }
    }

    fn from_u8(v: u8) -> Option<FrameType> {
        match v {
            0 => Some(FrameType::Kv),
            1 => Some(FrameType::Control),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Hdr {
    length: u32,
    frame_type: u8,
    shard: u8,
    reserved: u16,
}

/// Opaque admin-CLI traffic (User/Role/Perm/Key CRUD, Telemetry
/// subscribe/unsubscribe): verified as well-formed bytes but never
/// interpreted here, per §6.4 — the admin CLI is an external collaborator
/// out of scope for this workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminFrame(pub Vec<u8>);

/// The small control set the framing layer accepts and routes/ignores
/// (§6.1), distinct from the `zdb-kv` message set carried in
/// [`WireMessage::Kv`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlFrame {
    /// Admin-CLI authentication handshake (opaque to this layer).
    Login,
    /// A connection-layer liveness ping distinct from RKV's own
    /// `Frame::Heartbeat` membership gossip.
    HeartBeat,
    /// Marks the end of a recovery/catch-up burst.
    EndOfSnapshot,
    /// Requests retransmission of a sequence range.
    ResendReq,
    /// Wakes a parked peer with no payload of its own.
    Wake,
    /// Admin-CLI frame set, passed through unexamined.
    Admin(AdminFrame),
}

/// One fully decoded wire message.
#[derive(Debug, Clone)]
pub enum WireMessage {
    /// An RKV membership/replication frame (§3.3, §6.1).
    Kv(Frame),
    /// A connection-layer control frame (§6.1).
    Control(ControlFrame),
}

fn shard_of(frame: &Frame) -> u8 {
    match frame {
        Frame::Record(r) => r.shard,
        Frame::Commit(c) => c.shard,
        // Heartbeats are host-wide, not shard-scoped; 0xff marks "no shard".
        Frame::Heartbeat(_) => 0xff,
    }
}

/// Stateful length-delimited decoder/stateless encoder for [`WireMessage`]
/// (§6.1, §4.5 `FrameCodec`).
#[derive(Debug, Default)]
pub struct FrameCodec {
    header: Option<Hdr>,
}

impl FrameCodec {
    /// Construct a fresh codec with no header pending.
    pub fn new() -> FrameCodec {
        FrameCodec::default()
    }
}

impl Decoder for FrameCodec {
    type Item = WireMessage;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<WireMessage>, Error> {
        let hdr = match self.header.clone() {
            Some(hdr) => hdr,
            None => {
                if src.len() < HDR_LEN {
                    src.reserve(HDR_LEN - src.len());
                    return Ok(None);
                }
                let mut buf = src.split_to(HDR_LEN);
                let hdr = Hdr { length: buf.get_u32_le(), frame_type: buf.get_u8(), shard: buf.get_u8(), reserved: buf.get_u16_le() };
                self.header = Some(hdr.clone());
                hdr
            }
        };

        if src.len() < hdr.length as usize {
            src.reserve(hdr.length as usize - src.len());
            return Ok(None);
        }

        let payload = src.split_to(hdr.length as usize);
        self.header = None;
        let _ = hdr.reserved;

        match FrameType::from_u8(hdr.frame_type) {
            Some(FrameType::Kv) => {
                let frame: Frame = bincode::deserialize(&payload).map_err(|e| internal_err!("malformed kv frame on shard {}: {e}", hdr.shard))?;
                Ok(Some(WireMessage::Kv(frame)))
            }
            Some(FrameType::Control) => {
                let control: ControlFrame = bincode::deserialize(&payload).map_err(|e| internal_err!("malformed control frame: {e}"))?;
                Ok(Some(WireMessage::Control(control)))
            }
            None => Err(Error::Protocol(format!("unknown frame type {}", hdr.frame_type))),
        }
    }
}

impl Encoder<WireMessage> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Error> {
        let (frame_type, shard, payload) = match item {
            WireMessage::Kv(frame) => {
                let shard = shard_of(&frame);
                let payload = bincode::serialize(&frame).map_err(|e| internal_err!("failed to encode kv frame: {e}"))?;
                (FrameType::Kv, shard, payload)
            }
            WireMessage::Control(control) => {
                let payload = bincode::serialize(&control).map_err(|e| internal_err!("failed to encode control frame: {e}"))?;
                (FrameType::Control, 0xff, payload)
            }
        };

        dst.reserve(HDR_LEN + payload.len());
        dst.put_u32_le(payload.len() as u32);
        dst.put_u8(frame_type.to_u8());
        dst.put_u8(shard);
        dst.put_u16_le(0);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zdb_kv::frame::{Commit, RecordKind};

    #[test]
    fn commit_frame_round_trips_through_the_codec() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let commit = Commit { table_id: "accounts".into(), un: 7, shard: 2 };
        codec.encode(WireMessage::Kv(Frame::Commit(commit.clone())), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().expect("a full frame was buffered");
        match decoded {
            WireMessage::Kv(Frame::Commit(got)) => assert_eq!(got, commit),
            other => panic!("expected a Commit frame, got {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_waits_for_a_full_payload_before_returning() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let record = zdb_kv::frame::Record {
            table_id: "accounts".into(),
            un: 1,
            sn: 1,
            vn: 0,
            shard: 0,
            data: vec![1, 2, 3],
            kind: RecordKind::Replication,
        };
        codec.encode(WireMessage::Kv(Frame::Record(record)), &mut buf).unwrap();

        let mut partial = buf.split_to(buf.len() - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.unsplit(buf);
        assert!(codec.decode(&mut partial).unwrap().is_some());
    }

    #[test]
    fn unknown_frame_type_is_a_protocol_error() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(0);
        buf.put_u8(99);
        buf.put_u8(0);
        buf.put_u16_le(0);
        let mut codec = FrameCodec::new();
        assert!(matches!(codec.decode(&mut buf), Err(Error::Protocol(_))));
    }
}
