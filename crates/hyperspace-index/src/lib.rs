#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]

//! The pluggable vector-index layer: an exact flat index, a graph-based ANN
//! index, the scalar filter's bitmap postings, and the registry that ties an
//! index kind to its on-disk persistence.

pub mod filter;
pub mod flat;
pub mod hnsw;
pub mod registry;

pub use filter::FilterIndex;
pub use flat::FlatIndex;
pub use hnsw::HnswIndex;
pub use registry::IndexRegistry;
