//! Recycle variably-sized byte buffers across callers.
//!
//! [Pool] is a shared cache of fixed-capacity [bytes::BytesMut] buffers,
//! organized into one size class per distinct capacity. Callers [Pool::request]
//! a buffer of some length and [Pool::release] it when done. When the pool
//! cannot serve a request, a fresh buffer is allocated and counted as a miss.
//!
//! [Factory] warms a pool at start-up and, optionally, runs a background task
//! that tops it back up to a minimum number of buffers. Replenished buffers are
//! sized from the mean length of recently released buffers (see
//! [stats::RollingStats]), so the pool adapts to the shape of traffic rather
//! than only to its volume.
//!
//! The pool is best-effort: it never defragments or coalesces buffers of
//! different capacities and offers no per-caller quotas.
//!
//! # Status
//!
//! `commonware-pool` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

#![doc(
    html_logo_url = "https://commonware.xyz/imgs/rustdoc_logo.svg",
    html_favicon_url = "https://commonware.xyz/favicon.ico"
)]

use thiserror::Error;

mod bucket;
mod config;
pub use config::Config;
mod factory;
pub use factory::Factory;
mod pool;
pub use pool::{Pool, Returned};
mod replenisher;
pub mod stats;

/// Errors that can occur when starting a [Factory].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("buffers per size must be greater than zero")]
    ZeroBuffersPerSize,
    #[error("max distinct sizes must be greater than zero")]
    ZeroMaxDistinctSizes,
    #[error("min buffer size must be greater than zero")]
    ZeroMinBufferSize,
    #[error("max buffer size must be greater than zero")]
    ZeroMaxBufferSize,
    #[error("min buffer size ({0}) must be <= max buffer size ({1})")]
    MinBufferSizeExceedsMax(usize, usize),
    #[error("samples must be greater than zero")]
    ZeroSamples,
    #[error("replenisher requires a tokio runtime")]
    MissingRuntime,
}
