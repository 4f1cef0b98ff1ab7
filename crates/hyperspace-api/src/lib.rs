#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]

//! The boundary adapter: plain `serde`-derived request/response types
//! mirroring the wire schema, pure validation ahead of the coordinator, and
//! the handlers that glue the two together. No socket, no byte framing —
//! that belongs to whatever transport embeds this crate.

pub mod handler;
pub mod requests;
pub mod validate;

pub use handler::{handle_query, handle_search, handle_snapshot, handle_upsert};
