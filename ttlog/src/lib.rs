//! A per-thread lock-free async logging engine.
//!
//! Producers on hot threads encode log records into a single-producer /
//! single-consumer queue ([`spsc`]). A single dedicated backend thread
//! ([`backend`]) drains every producer's queue, orders records by
//! timestamp, formats them ([`pattern`], [`timestamp`]) and dispatches
//! them to [`sink`]s.

pub mod backend;
pub mod backend_lock;
pub mod backtrace;
pub mod clock;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod frontend;
pub mod level;
pub mod logger;
pub mod metadata;
pub mod named_args;
pub mod panic_hook;
pub mod pattern;
pub mod signal_hook;
pub mod sink;
pub mod snapshot;
pub mod spinlock;
pub mod spsc;
pub mod thread_context;
pub mod timestamp;
pub mod transit;

pub use backend::{Backend, BackendHandle};
pub use config::BackendOptions;
pub use error::QuillError;
pub use frontend::Frontend;
pub use level::LogLevel;
pub use logger::Logger;
pub use sink::Sink;

pub extern crate ttlog_macros;
