/// Parse tree types for the filter language
use crate::operator::Operator;
use std::fmt;

/// A filter value exactly as written, minus surrounding quotes.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterValue {
    pub text: String,
    pub quoted: bool,
}

impl FilterValue {
    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted || self.text.is_empty() || self.text.contains(char::is_whitespace) {
            write!(f, "\"{}\"", self.text)
        } else {
            f.write_str(&self.text)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Whitespace separated conditions, implicitly ANDed.
    Conds(Vec<Node>),
    /// Alternatives separated by `OR`.
    OrStmt(Vec<Node>),
    /// `[ ... ]`, optionally preceded by `NOT` or `!`.
    Group { negated: bool, stmt: Box<Node> },
    /// `field<op>value`
    NamedCond {
        field: String,
        operator: Operator,
        value: FilterValue,
    },
    /// A bare value, matched against the item name.
    UnnamedCond(FilterValue),
}

/// A parsed filter string.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub source: String,
    pub root: Node,
}
