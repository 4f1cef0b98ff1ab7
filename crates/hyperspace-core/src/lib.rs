//! Shared types for the engine: the scalar `Value`/`Record` model, the
//! distance-metric dispatch, the error taxonomy, and engine-wide
//! configuration. Every other crate in the workspace depends on this one and
//! nothing in here depends on them.

pub mod config;
pub mod error;
pub mod metric;
pub mod record;
pub mod value;

pub use config::EngineConfig;
pub use error::{EngineError, ErrorEnvelope, Result};
pub use metric::MetricKind;
pub use record::Record;
pub use value::Value;

use serde::{Deserialize, Serialize};

/// Which vector index a record is routed to. Chosen per-upsert by the
/// caller, not fixed for the whole collection — a collection may hold a mix
/// of flat- and ANN-indexed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Flat,
    Ann,
}

impl IndexKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FLAT" => Some(IndexKind::Flat),
            "HNSW" | "ANN" => Some(IndexKind::Ann),
            _ => None,
        }
    }

    /// The on-disk file name used by the index registry's `save_all`/`load_all`.
    pub fn file_name(self) -> &'static str {
        match self {
            IndexKind::Flat => "FLAT.index",
            IndexKind::Ann => "HNSW.index",
        }
    }
}

/// A filter predicate on an integer scalar field. Only `Eq`/`Ne` are
/// implemented; the remaining wire-level operators exist so that a request
/// containing one surfaces `UnsupportedOperator` rather than `BadRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl FilterOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" => Some(FilterOp::Eq),
            "!=" => Some(FilterOp::Ne),
            ">" => Some(FilterOp::Gt),
            "<" => Some(FilterOp::Lt),
            ">=" => Some(FilterOp::Ge),
            "<=" => Some(FilterOp::Le),
            _ => None,
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(self, FilterOp::Eq | FilterOp::Ne)
    }
}
