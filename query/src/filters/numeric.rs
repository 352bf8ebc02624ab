use super::{integral, Comparison, Candidate};
use crate::error::{QueryError, Result};
use crate::field::FieldDescriptor;
use crate::operator::Operator;
use crate::prefilter::{Command, PreFilter};
use parse_size::ByteSuffix;

const TRUE: &[&str] = &["true", "t", "yes", "y", "1", "+"];
const FALSE: &[&str] = &["false", "f", "no", "n", "0", "-"];

/// Parse a truth value like `yes`, `0` or `False`.
pub(crate) fn truth(field: &str, text: &str) -> Result<bool> {
    let lowered = text.to_lowercase();
    if TRUE.contains(&lowered.as_str()) {
        Ok(true)
    } else if FALSE.contains(&lowered.as_str()) {
        Ok(false)
    } else {
        Err(QueryError::invalid_value(
            field,
            text,
            format!(
                "expected a boolean ({} or {})",
                TRUE.join("/"),
                FALSE.join("/")
            ),
        ))
    }
}

#[derive(Debug)]
pub(crate) struct BoolFilter {
    value: bool,
}

impl BoolFilter {
    pub fn new(field: &str, text: &str) -> Result<Self> {
        Ok(Self {
            value: truth(field, text)?,
        })
    }
}

impl Comparison for BoolFilter {
    fn kind(&self) -> &'static str {
        "BoolFilter"
    }

    fn eq(&self, candidate: &Candidate) -> Result<bool> {
        Ok(candidate.value()?.is_truthy() == self.value)
    }

    fn display_value(&self) -> Option<String> {
        Some(if self.value { "yes" } else { "no" }.to_string())
    }

    fn pre_filter_eq(&self, _field: &FieldDescriptor, key: &str) -> Option<PreFilter> {
        Some(PreFilter::exact(Command::compare(
            "equal",
            key,
            i64::from(self.value),
        )))
    }
}

fn item_number(candidate: &Candidate) -> Result<f64> {
    Ok(candidate.value()?.as_f64().unwrap_or(0.0))
}

#[derive(Debug)]
pub(crate) struct FloatFilter {
    value: f64,
}

impl FloatFilter {
    pub fn new(field: &str, text: &str) -> Result<Self> {
        let value = text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| QueryError::invalid_value(field, text, "expected a number"))?;
        Ok(Self { value })
    }
}

impl Comparison for FloatFilter {
    fn kind(&self) -> &'static str {
        "FloatFilter"
    }

    fn eq(&self, candidate: &Candidate) -> Result<bool> {
        Ok(item_number(candidate)? == self.value)
    }

    fn gt(&self, candidate: &Candidate) -> Result<bool> {
        Ok(item_number(candidate)? > self.value)
    }

    /// The daemon only knows integers, so values are scaled (ratio is stored
    /// per mille) and rounded outwards where they are not integral.
    fn pre_filter(
        &self,
        field: &FieldDescriptor,
        operator: Operator,
        key: &str,
    ) -> Option<PreFilter> {
        let scaled = self.value * field.prefilter_scale as f64;
        let (comparison, threshold) = match operator {
            Operator::Eq => ("equal", integral(scaled)?),
            Operator::Ne => return self.pre_filter(field, Operator::Eq, key)?.negate(),
            Operator::Gt => ("greater", scaled.floor() as i64),
            Operator::Ge => ("greater", (scaled - 1.0).floor() as i64),
            Operator::Lt => ("less", scaled.ceil() as i64),
            Operator::Le => ("less", (scaled + 1.0).ceil() as i64),
        };
        let command = Command::compare_value(comparison, key, threshold);
        Some(match integral(scaled) {
            Some(_) => PreFilter::exact(command),
            None => PreFilter::superset(command),
        })
    }
}

/// Sizes with optional binary unit suffix, `2G` is 2 GiB.
#[derive(Debug)]
pub(crate) struct ByteSizeFilter {
    bytes: u64,
}

impl ByteSizeFilter {
    pub fn new(field: &str, text: &str) -> Result<Self> {
        let bytes = parse_size::Config::new()
            .with_binary()
            .with_byte_suffix(ByteSuffix::Allow)
            .parse_size(text.trim())
            .map_err(|e| QueryError::invalid_value(field, text, format!("bad size: {}", e)))?;
        Ok(Self { bytes })
    }
}

impl Comparison for ByteSizeFilter {
    fn kind(&self) -> &'static str {
        "ByteSizeFilter"
    }

    fn eq(&self, candidate: &Candidate) -> Result<bool> {
        Ok(item_number(candidate)? == self.bytes as f64)
    }

    fn gt(&self, candidate: &Candidate) -> Result<bool> {
        Ok(item_number(candidate)? > self.bytes as f64)
    }

    fn pre_filter(
        &self,
        field: &FieldDescriptor,
        operator: Operator,
        key: &str,
    ) -> Option<PreFilter> {
        let bytes = i64::try_from(self.bytes).ok()?;
        let (comparison, threshold) = match operator {
            Operator::Eq => ("equal", bytes),
            Operator::Ne => return self.pre_filter(field, Operator::Eq, key)?.negate(),
            Operator::Gt => ("greater", bytes),
            Operator::Ge => ("greater", bytes - 1),
            Operator::Lt => ("less", bytes),
            Operator::Le => ("less", bytes.checked_add(1)?),
        };
        Some(PreFilter::exact(Command::compare(comparison, key, threshold)))
    }
}
