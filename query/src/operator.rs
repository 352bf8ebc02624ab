use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Comparison operators of the filter language.
///
/// Only `Eq` and `Gt` are primitive, every other operator is derived from
/// those two in [`Operator::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq, // = ==
    Ne, // != <>
    Gt, // >
    Ge, // >= =+
    Lt, // <
    Le, // <= =-
}

impl Operator {
    /// Canonical name, as used in error messages and logs.
    pub fn name(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Lt => "lt",
            Operator::Le => "le",
        }
    }

    /// Symbol used when a filter is rendered back to a query string.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
        }
    }

    pub fn from_conditional(conditional: &str) -> Option<Self> {
        match conditional {
            "=" | "==" => Some(Operator::Eq),
            "!=" | "<>" => Some(Operator::Ne),
            ">" => Some(Operator::Gt),
            ">=" | "=+" => Some(Operator::Ge),
            "<" => Some(Operator::Lt),
            "<=" | "=-" => Some(Operator::Le),
            _ => None,
        }
    }

    /// Mirror image used when the compared quantity runs backwards,
    /// e.g. "more than 2 days ago" means "a timestamp less than now - 2d".
    pub fn mirrored(self) -> Self {
        match self {
            Operator::Gt => Operator::Lt,
            Operator::Ge => Operator::Le,
            Operator::Lt => Operator::Gt,
            Operator::Le => Operator::Ge,
            other => other,
        }
    }

    /// Evaluate this operator from the two primitives. Each closure runs at most once.
    pub fn apply<E>(
        self,
        eq: impl FnOnce() -> Result<bool, E>,
        gt: impl FnOnce() -> Result<bool, E>,
    ) -> Result<bool, E> {
        Ok(match self {
            Operator::Eq => eq()?,
            Operator::Ne => !eq()?,
            Operator::Gt => gt()?,
            Operator::Ge => eq()? || gt()?,
            Operator::Le => eq()? || !gt()?,
            Operator::Lt => !eq()? && !gt()?,
        })
    }

    /// Direct comparison for totally ordered values.
    pub fn compare<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            Operator::Eq => left == right,
            Operator::Ne => left != right,
            Operator::Gt => left > right,
            Operator::Ge => left >= right,
            Operator::Lt => left < right,
            Operator::Le => left <= right,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// How aggressively matcher trees are pushed down to the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(try_from = "u8")]
pub enum FastQuery {
    /// Never pre-filter, always fetch everything.
    Off = 0,
    /// Use a single, preferably exact, expression per AND and skip ORs.
    #[default]
    Safe = 1,
    /// Combine everything that can be expressed.
    Aggressive = 2,
}

impl TryFrom<u8> for FastQuery {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(FastQuery::Off),
            1 => Ok(FastQuery::Safe),
            2 => Ok(FastQuery::Aggressive),
            other => Err(format!("Invalid fast-query level {} (expected 0, 1 or 2)", other)),
        }
    }
}

impl FromStr for FastQuery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("Invalid fast-query level '{}' (expected 0, 1 or 2)", s))?;
        FastQuery::try_from(level)
    }
}

impl fmt::Display for FastQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(op: Operator, eq: bool, gt: bool) -> bool {
        op.apply::<()>(|| Ok(eq), || Ok(gt)).unwrap()
    }

    #[test]
    fn test_derived_operators_follow_primitives() {
        for (eq, gt) in [(true, false), (false, true), (false, false)] {
            assert_eq!(eval(Operator::Ne, eq, gt), !eq);
            assert_eq!(eval(Operator::Ge, eq, gt), eq || gt);
            assert_eq!(eval(Operator::Le, eq, gt), eq || !gt);
            assert_eq!(eval(Operator::Lt, eq, gt), !eq && !gt);
        }
    }

    #[test]
    fn test_apply_short_circuits() {
        let result = Operator::Ge.apply(|| Ok::<_, String>(true), || Err("gt called".to_string()));
        assert_eq!(result, Ok(true));
    }

    #[test]
    fn test_conditionals() {
        assert_eq!(Operator::from_conditional("<>"), Some(Operator::Ne));
        assert_eq!(Operator::from_conditional("=+"), Some(Operator::Ge));
        assert_eq!(Operator::from_conditional("=-"), Some(Operator::Le));
        assert_eq!(Operator::from_conditional("=>"), None);
    }

    #[test]
    fn test_fast_query_parsing() {
        assert_eq!("2".parse::<FastQuery>(), Ok(FastQuery::Aggressive));
        assert_eq!(FastQuery::default(), FastQuery::Safe);
        assert!("3".parse::<FastQuery>().is_err());
        assert!("fast".parse::<FastQuery>().is_err());
        assert!(FastQuery::Off < FastQuery::Safe);
    }
}
