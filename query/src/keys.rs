use crate::builder::resolve_field;
use crate::error::Result;
use crate::field::FieldLookup;
use crate::types::{Node, Query};
use indexmap::IndexSet;

/// Fields named explicitly in a query, in order of first use.
///
/// Works on the parse tree alone, bare values (implicit `name`) are not included.
pub fn key_names(query: &Query) -> Vec<String> {
    let mut names = IndexSet::new();
    collect(&query.root, &mut names);
    names.into_iter().collect()
}

fn collect(node: &Node, names: &mut IndexSet<String>) {
    match node {
        Node::Conds(children) | Node::OrStmt(children) => {
            for child in children {
                collect(child, names);
            }
        }
        Node::Group { stmt, .. } => collect(stmt, names),
        Node::NamedCond { field, .. } => {
            names.insert(field.clone());
        }
        Node::UnnamedCond(_) => {}
    }
}

/// Daemon calls needed to evaluate the named fields without extra round-trips.
pub fn required_calls<S: AsRef<str>>(names: &[S], fields: &dyn FieldLookup) -> Result<Vec<String>> {
    let mut calls = IndexSet::new();
    for name in names {
        let field = resolve_field(fields, name.as_ref())?;
        calls.extend(field.requires.iter().cloned());
    }
    Ok(calls.into_iter().collect())
}

impl Query {
    pub fn key_names(&self) -> Vec<String> {
        key_names(self)
    }
}
