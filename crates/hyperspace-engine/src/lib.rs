#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]

//! The database coordinator: fuses the WAL, the index registry, and the
//! scalar store into `upsert`/`search`/`query`/`snapshot`/`reload`.

mod coordinator;

pub use coordinator::{Database, SearchRequest};
