//! Ambient utilities shared by every crate in the workspace: cooperative
//! shutdown, redacted debug output, cache-line padding, and process
//! resource-limit helpers.
#![deny(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod padding;
pub mod properties;
pub mod redacted;
pub mod shutdown;
pub mod ulimit;
