//! rTorrent side of the query engine: field catalogue, items backed by the
//! daemon, the query driver and the SCGI/JSON-RPC plumbing underneath.

pub mod config;
mod engine;
pub mod error;
pub mod fields;
pub mod guess;
mod item;
pub mod rpc;
pub mod scgi;

pub use config::Settings;
pub use engine::{hash_view, prefetch_calls, split_call, Engine, BASE_FIELDS, PREFETCH_FIELDS};
pub use error::RpcError;
pub use item::{duration, file_types, interval_split, interval_sum, TorrentItem};
pub use rpc::{Call, JsonRpcClient, RpcClient};
