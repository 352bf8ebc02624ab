//! Filter language for rTorrent items.
//!
//! A filter string such as `ratio=+1 name=*linux* OR [ size>1G tagged=hd ]`
//! is parsed into a [`Query`], compiled against a [`FieldLookup`] into a
//! [`MatcherNode`] tree, and then either evaluated against items or rendered
//! into a pre-filter the daemon can apply before sending data back.

mod builder;
mod error;
mod field;
mod filters;
mod item;
mod keys;
mod matcher;
mod operator;
mod parser;
pub mod prefilter;
mod types;

pub use builder::{create_matcher, resolve_field, MatcherBuilder};
pub use error::{QueryError, Result};
pub use field::{
    FieldDescriptor, FieldGenerator, FieldLookup, FieldRegistry, MatcherKind, ValueType,
};
pub use filters::FieldFilter;
pub use item::{Item, Value};
pub use keys::{key_names, required_calls};
pub use matcher::MatcherNode;
pub use operator::{FastQuery, Operator};
pub use parser::{join_cli_args, parse_query};
pub use prefilter::PreFilter;
pub use types::{FilterValue, Node, Query};
