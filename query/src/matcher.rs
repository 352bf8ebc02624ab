use crate::error::Result;
use crate::filters::FieldFilter;
use crate::item::Item;
use crate::operator::FastQuery;
use crate::prefilter::PreFilter;
use std::fmt;

/// Compiled, immutable filter tree.
///
/// Evaluated locally with [`MatcherNode::matches`], and rendered for the
/// daemon with [`MatcherNode::pre_filter`].
#[derive(Debug)]
pub enum MatcherNode {
    Field(FieldFilter),
    And(Vec<MatcherNode>),
    Or(Vec<MatcherNode>),
    Group {
        invert: bool,
        child: Box<MatcherNode>,
    },
}

impl MatcherNode {
    pub fn matches(&self, item: &dyn Item) -> Result<bool> {
        match self {
            MatcherNode::Field(filter) => filter.matches(item),
            MatcherNode::And(children) => {
                for child in children {
                    if !child.matches(item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            MatcherNode::Or(children) => {
                for child in children {
                    if child.matches(item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            MatcherNode::Group { invert, child } => Ok(child.matches(item)? != *invert),
        }
    }

    /// Daemon-side condition, empty when nothing can be pushed down.
    pub fn pre_filter(&self, level: FastQuery) -> String {
        self.pre_filter_expr(level)
            .map(|pre_filter| pre_filter.to_string())
            .unwrap_or_default()
    }

    pub fn pre_filter_expr(&self, level: FastQuery) -> Option<PreFilter> {
        if level == FastQuery::Off {
            return None;
        }
        match self {
            MatcherNode::Field(filter) => filter.pre_filter(),
            MatcherNode::And(children) => {
                let rendered: Vec<PreFilter> = children
                    .iter()
                    .filter_map(|child| child.pre_filter_expr(level))
                    .collect();
                let complete = rendered.len() == children.len();
                if level == FastQuery::Safe {
                    // a single expression, preferably one we know is precise
                    let index = rendered.iter().position(|p| p.exact).unwrap_or(0);
                    let chosen = rendered.into_iter().nth(index)?;
                    let exact = chosen.exact && complete && children.len() == 1;
                    return Some(PreFilter {
                        command: chosen.command,
                        exact,
                    });
                }
                let mut combined = PreFilter::all_of(rendered)?;
                combined.exact &= complete;
                Some(combined)
            }
            MatcherNode::Or(children) => {
                if level == FastQuery::Safe && children.len() > 1 {
                    return None;
                }
                // a branch we cannot express could match anything
                let rendered = children
                    .iter()
                    .map(|child| child.pre_filter_expr(level))
                    .collect::<Option<Vec<_>>>()?;
                PreFilter::any_of(rendered)
            }
            MatcherNode::Group { invert, child } => {
                let inner = child.pre_filter_expr(level)?;
                if *invert {
                    inner.negate()
                } else {
                    Some(inner)
                }
            }
        }
    }

    /// Field filters in this tree, depth first.
    pub fn field_filters(&self) -> Vec<&FieldFilter> {
        let mut filters = Vec::new();
        self.collect_filters(&mut filters);
        filters
    }

    fn collect_filters<'a>(&'a self, filters: &mut Vec<&'a FieldFilter>) {
        match self {
            MatcherNode::Field(filter) => filters.push(filter),
            MatcherNode::And(children) | MatcherNode::Or(children) => {
                for child in children {
                    child.collect_filters(filters);
                }
            }
            MatcherNode::Group { child, .. } => child.collect_filters(filters),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[MatcherNode], sep: &str) -> fmt::Result {
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", child)?;
    }
    Ok(())
}

impl fmt::Display for MatcherNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatcherNode::Field(filter) => write!(f, "{}", filter),
            MatcherNode::And(children) => write_joined(f, children, " "),
            MatcherNode::Or(children) => write_joined(f, children, " OR "),
            MatcherNode::Group { invert, child } => {
                if *invert {
                    f.write_str("NOT ")?;
                }
                write!(f, "[ {} ]", child)
            }
        }
    }
}
