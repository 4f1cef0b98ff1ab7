#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]

pub mod kv;
pub mod wal;

pub use kv::ScalarStore;
pub use wal::{Wal, WAL_VERSION};

/// The raw-namespace key the snapshot watermark is persisted under, on the
/// scalar store's own `put_raw`/`get_raw` side.
pub const SNAPSHOT_WATERMARK_KEY: &str = "snapshots_max_log_id";
