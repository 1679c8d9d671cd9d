//! TCP transport glue for `zdb-kv` (§4.5): wire framing and the `Cxn`
//! connection actor, the only things in this workspace that know a
//! [`zdb_kv::engine::Engine`] is reachable over a socket at all.
#![deny(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod codec;
pub mod cxn;

pub use codec::{AdminFrame, ControlFrame, FrameCodec, WireMessage};
pub use cxn::Cxn;
