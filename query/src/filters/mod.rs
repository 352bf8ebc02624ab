//! Field filters, the leaves of a matcher tree.

mod numeric;
mod pattern;
mod tags;
mod time;

use crate::error::{QueryError, Result};
use crate::field::{FieldDescriptor, MatcherKind};
use crate::item::{Item, Value};
use crate::operator::Operator;
use crate::prefilter::PreFilter;
use crate::types::FilterValue;
use std::fmt;
use std::sync::Arc;

/// What a comparison gets to look at.
pub(crate) struct Candidate<'a> {
    pub field: &'a FieldDescriptor,
    pub operator: Operator,
    pub item: &'a dyn Item,
}

impl Candidate<'_> {
    pub fn value(&self) -> Result<Value> {
        self.item.attribute(&self.field.name)
    }

    pub fn unsupported(&self, filter: &'static str) -> QueryError {
        QueryError::UnsupportedOperator {
            filter,
            field: self.field.name.clone(),
            operator: self.operator,
        }
    }
}

/// Type specific comparison logic.
///
/// Implementors provide `eq` and optionally `gt`, everything else is derived.
pub(crate) trait Comparison: fmt::Debug + Send + Sync {
    fn kind(&self) -> &'static str;

    fn eq(&self, candidate: &Candidate) -> Result<bool>;

    fn gt(&self, candidate: &Candidate) -> Result<bool> {
        Err(candidate.unsupported(self.kind()))
    }

    fn matches(&self, candidate: &Candidate) -> Result<bool> {
        candidate
            .operator
            .apply(|| self.eq(candidate), || self.gt(candidate))
    }

    /// Operator actually applied, for filters whose values run backwards.
    fn effective(&self, operator: Operator) -> Operator {
        operator
    }

    /// Replacement for the condition text when rendering the filter.
    fn display_value(&self) -> Option<String> {
        None
    }

    fn pre_filter_eq(&self, _field: &FieldDescriptor, _key: &str) -> Option<PreFilter> {
        None
    }

    fn pre_filter_gt(&self, _field: &FieldDescriptor, _key: &str) -> Option<PreFilter> {
        None
    }

    /// Pre-filter for any operator, derived from the `eq` and `gt` expressions.
    fn pre_filter(
        &self,
        field: &FieldDescriptor,
        operator: Operator,
        key: &str,
    ) -> Option<PreFilter> {
        let eq = || self.pre_filter_eq(field, key);
        let gt = || self.pre_filter_gt(field, key);
        match operator {
            Operator::Eq => eq(),
            Operator::Ne => eq()?.negate(),
            Operator::Gt => gt(),
            Operator::Ge => PreFilter::any_of(vec![eq()?, gt()?]),
            Operator::Le => PreFilter::any_of(vec![eq()?, gt()?.negate()?]),
            Operator::Lt => PreFilter::all_of(vec![eq()?.negate()?, gt()?.negate()?]),
        }
    }
}

/// A single `field<op>value` condition.
#[derive(Debug)]
pub struct FieldFilter {
    field: Arc<FieldDescriptor>,
    operator: Operator,
    effective: Operator,
    value: FilterValue,
    comparison: Box<dyn Comparison>,
}

impl FieldFilter {
    /// Build the filter declared for `field`, validating the value right away.
    ///
    /// `now` anchors relative times such as `2w`.
    pub fn new(
        field: Arc<FieldDescriptor>,
        operator: Operator,
        value: FilterValue,
        now: f64,
    ) -> Result<Self> {
        let (sign_operator, text) = match field.matcher {
            MatcherKind::Float
            | MatcherKind::ByteSize
            | MatcherKind::Time
            | MatcherKind::TimeNotNull
            | MatcherKind::Duration => split_sign(operator, &value.text),
            _ => (operator, value.text.as_str()),
        };

        let comparison: Box<dyn Comparison> = match field.matcher {
            MatcherKind::Pattern => Box::new(pattern::PatternFilter::new(&field.name, text)?),
            MatcherKind::Files => Box::new(pattern::FilesFilter::new(text)),
            MatcherKind::TaggedAs => Box::new(tags::TaggedAsFilter::new(text)),
            MatcherKind::Bool => Box::new(numeric::BoolFilter::new(&field.name, text)?),
            MatcherKind::Float => Box::new(numeric::FloatFilter::new(&field.name, text)?),
            MatcherKind::ByteSize => Box::new(numeric::ByteSizeFilter::new(&field.name, text)?),
            MatcherKind::Time => Box::new(time::TimeFilter::new(&field.name, text, now, false)?),
            MatcherKind::TimeNotNull => {
                Box::new(time::TimeFilter::new(&field.name, text, now, true)?)
            }
            MatcherKind::Duration => {
                Box::new(time::DurationFilter::new(&field.name, text, now)?)
            }
        };

        Ok(Self {
            effective: comparison.effective(sign_operator),
            field,
            operator,
            value,
            comparison,
        })
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }

    pub fn field(&self) -> &FieldDescriptor {
        &self.field
    }

    /// Operator as written in the query.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Operator after value signs and direction changes are applied.
    pub fn effective_operator(&self) -> Operator {
        self.effective
    }

    pub fn kind(&self) -> &'static str {
        self.comparison.kind()
    }

    pub fn matches(&self, item: &dyn Item) -> Result<bool> {
        let candidate = Candidate {
            field: &self.field,
            operator: self.effective,
            item,
        };
        self.comparison.matches(&candidate)
    }

    pub fn pre_filter(&self) -> Option<PreFilter> {
        let key = self.field.prefilter_key.as_deref()?;
        self.comparison.pre_filter(&self.field, self.effective, key)
    }
}

impl fmt::Display for FieldFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.comparison.display_value() {
            Some(value) => write!(f, "{}{}{}", self.field.name, self.operator, value),
            None => write!(f, "{}{}{}", self.field.name, self.operator, self.value),
        }
    }
}

/// Numeric values take a leading `+` as "at least" and `-` as "at most".
fn split_sign(operator: Operator, text: &str) -> (Operator, &str) {
    if operator != Operator::Eq {
        return (operator, text);
    }
    if let Some(rest) = text.strip_prefix('+') {
        (Operator::Ge, rest)
    } else if let Some(rest) = text.strip_prefix('-') {
        (Operator::Le, rest)
    } else {
        (operator, text)
    }
}

/// Integral daemon value for a scaled threshold, if it has one.
fn integral(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && value.is_finite()).then_some(value as i64)
}
