//! # lioncloud — userspace filesystem over a remote block-addressable storage bus
//!
//! Protocol guarantees:
//! - Every request/response is one fixed 64-bit register frame, big-endian
//!   on the wire; `register::pack`/`unpack` never allocate
//! - A `BLOCK_XFER` request's payload is always exactly `BLOCK_SIZE` (256)
//!   bytes, encrypted or not
//! - The bus is strictly synchronous: one outstanding request per
//!   connection, no pipelining, no timeouts, no automatic retry
//! - `device::devprobe` enumerates present devices from bit 16 down to bit
//!   0; this is also the order the filesystem's block allocator consumes
//!   devices in
//! - The block cache never changes what a read returns, only how fast it
//!   returns it — eviction is transparent to [`filesystem::Session`]
//! - A `Session` owns one bus connection and is not `Sync`; sharing one
//!   across threads is the embedder's responsibility

pub mod bus;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod device;
pub mod error;
pub mod filesystem;
pub mod register;

pub use config::ClientConfig;
pub use device::{BlockAddress, Device, DeviceId, BLOCK_SIZE};
pub use error::{LcError, LcResult, StateError};
pub use filesystem::{LcFHandle, Session};
pub use register::RegisterFields;
