#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

use clap::{Parser, Subcommand};
use hyperspace_api::requests::{FilterWire, QueryRequestWire, SearchRequestWire, UpsertRequest};
use hyperspace_api::{handle_query, handle_search, handle_snapshot, handle_upsert};
use hyperspace_core::{EngineConfig, MetricKind, Value};
use hyperspace_engine::Database;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// In-process CLI over a single hyperspace-engine collection: every
/// subcommand opens the data directory, performs one operation, and exits.
/// There is no server and no client — the engine is a library, linked
/// directly into this binary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the WAL, snapshot, and scalar store for this collection.
    #[arg(long, default_value = "./hyperspace-data")]
    data_dir: PathBuf,

    /// Vector dimension this collection is configured for.
    #[arg(long, default_value_t = 128)]
    dim: usize,

    /// Distance metric: l2, ip, or cosine.
    #[arg(long, default_value = "l2")]
    metric: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert or overwrite a record.
    Upsert {
        id: u64,
        /// Comma-separated f32 components, e.g. 0.1,0.2,0.3
        #[arg(long, value_delimiter = ',')]
        vector: Vec<f32>,
        /// FLAT or HNSW
        #[arg(long, default_value = "FLAT")]
        index_type: String,
        /// JSON object of additional scalar fields, e.g. '{"color":2}'
        #[arg(long)]
        scalars: Option<String>,
    },
    /// Find the k nearest records to a query vector.
    Search {
        #[arg(long, value_delimiter = ',')]
        vector: Vec<f32>,
        #[arg(long, default_value_t = 10)]
        k: usize,
        #[arg(long, default_value = "FLAT")]
        index_type: String,
        #[arg(long)]
        filter_field: Option<String>,
        #[arg(long)]
        filter_op: Option<String>,
        #[arg(long)]
        filter_value: Option<i64>,
    },
    /// Fetch a record by id.
    Query { id: u64 },
    /// Freeze the WAL watermark and persist every index kind to the snapshot folder.
    Snapshot,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let Some(metric) = MetricKind::parse(&cli.metric) else {
        eprintln!("unrecognized metric {:?} (expected l2, ip, or cosine)", cli.metric);
        return ExitCode::FAILURE;
    };
    let config = EngineConfig::from_env(cli.data_dir);
    let db = match Database::open(config, metric, cli.dim) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("failed to open collection: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Upsert {
            id,
            vector,
            index_type,
            scalars,
        } => {
            let scalars = match parse_scalars(scalars) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("invalid --scalars: {e}");
                    return ExitCode::FAILURE;
                }
            };
            let resp = handle_upsert(
                &db,
                UpsertRequest {
                    id,
                    vector,
                    index_type,
                    scalars,
                },
            );
            print_json(&resp, resp.retcode)
        }
        Command::Search {
            vector,
            k,
            index_type,
            filter_field,
            filter_op,
            filter_value,
        } => {
            let filter = match (filter_field, filter_op, filter_value) {
                (Some(field_name), Some(op), Some(value)) => Some(FilterWire { field_name, op, value }),
                (None, None, None) => None,
                _ => {
                    eprintln!("--filter-field, --filter-op, and --filter-value must be given together");
                    return ExitCode::FAILURE;
                }
            };
            let resp = handle_search(
                &db,
                SearchRequestWire {
                    vector,
                    k: k as i64,
                    index_type,
                    filter,
                },
            );
            print_json(&resp, resp.retcode)
        }
        Command::Query { id } => {
            let resp = handle_query(&db, QueryRequestWire { id });
            print_json(&resp, resp.retcode)
        }
        Command::Snapshot => {
            let resp = handle_snapshot(&db);
            print_json(&resp, resp.retcode)
        }
    }
}

fn parse_scalars(raw: Option<String>) -> Result<BTreeMap<String, Value>, serde_json::Error> {
    match raw {
        Some(s) => serde_json::from_str(&s),
        None => Ok(BTreeMap::new()),
    }
}

fn print_json(resp: &impl serde::Serialize, retcode: i32) -> ExitCode {
    match serde_json::to_string_pretty(resp) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to encode response: {e}"),
    }
    if retcode == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
