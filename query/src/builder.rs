use crate::error::{QueryError, Result};
use crate::field::{FieldDescriptor, FieldLookup};
use crate::filters::FieldFilter;
use crate::matcher::MatcherNode;
use crate::operator::Operator;
use crate::parser::parse_query;
use crate::types::{FilterValue, Node, Query};
use chrono::Utc;
use std::sync::Arc;
use strsim::jaro_winkler;

const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Compiles parse trees into matcher trees, resolving fields as it goes.
pub struct MatcherBuilder<'a> {
    fields: &'a dyn FieldLookup,
    now: f64,
}

impl<'a> MatcherBuilder<'a> {
    pub fn new(fields: &'a dyn FieldLookup) -> Self {
        Self {
            fields,
            now: Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }

    /// Pin the reference time for relative values like `2d`.
    pub fn with_now(mut self, now: f64) -> Self {
        self.now = now;
        self
    }

    pub fn build(&self, query: &Query) -> Result<MatcherNode> {
        self.visit(&query.root)
    }

    fn visit(&self, node: &Node) -> Result<MatcherNode> {
        match node {
            Node::Conds(children) => self.pare(children, MatcherNode::And),
            Node::OrStmt(children) => self.pare(children, MatcherNode::Or),
            Node::Group { negated, stmt } => Ok(MatcherNode::Group {
                invert: *negated,
                child: Box::new(self.visit(stmt)?),
            }),
            Node::NamedCond {
                field,
                operator,
                value,
            } => self.filter(field, *operator, value),
            Node::UnnamedCond(value) => self.filter("name", Operator::Eq, value),
        }
    }

    /// Wrap several children, but hand a lone child back unwrapped.
    fn pare(
        &self,
        children: &[Node],
        wrap: fn(Vec<MatcherNode>) -> MatcherNode,
    ) -> Result<MatcherNode> {
        let mut nodes = children
            .iter()
            .map(|child| self.visit(child))
            .collect::<Result<Vec<_>>>()?;
        if nodes.len() == 1 {
            if let Some(node) = nodes.pop() {
                return Ok(node);
            }
        }
        Ok(wrap(nodes))
    }

    fn filter(&self, name: &str, operator: Operator, value: &FilterValue) -> Result<MatcherNode> {
        let field = self.resolve(name)?;
        let filter = FieldFilter::new(field, operator, value.clone(), self.now)?;
        Ok(MatcherNode::Field(filter))
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<FieldDescriptor>> {
        resolve_field(self.fields, name)
    }
}

/// Look up a field, failing with a "did you mean" hint for unknown names.
pub fn resolve_field(fields: &dyn FieldLookup, name: &str) -> Result<Arc<FieldDescriptor>> {
    match fields.lookup(name)? {
        Some(field) => Ok(field),
        None => Err(QueryError::UnknownField {
            name: name.to_string(),
            suggestion: suggest(name, &fields.names()),
        }),
    }
}

fn suggest(name: &str, candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .map(|candidate| (jaro_winkler(name, candidate), candidate))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.clone())
}

/// Parse and compile a filter string in one go.
pub fn create_matcher(input: &str, fields: &dyn FieldLookup) -> Result<MatcherNode> {
    let query = parse_query(input)?;
    MatcherBuilder::new(fields).build(&query)
}
