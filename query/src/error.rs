use crate::operator::Operator;

/// Every failure a filter string can produce, from parsing through evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The grammar rejected the filter string.
    Syntax {
        input: String,
        position: usize,
        message: String,
    },
    /// No field of that name is registered, and no dynamic generator claimed it.
    UnknownField {
        name: String,
        suggestion: Option<String>,
    },
    /// A filter value could not be coerced into the field's native type.
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
    /// Raised lazily when a filter is evaluated with an operator it cannot handle.
    UnsupportedOperator {
        filter: &'static str,
        field: String,
        operator: Operator,
    },
    /// An item could not produce the requested attribute.
    Attribute { field: String, reason: String },
}

pub type Result<T, E = QueryError> = std::result::Result<T, E>;

impl QueryError {
    pub fn syntax(input: &str, position: usize, message: impl Into<String>) -> Self {
        QueryError::Syntax {
            input: input.to_string(),
            position,
            message: message.into(),
        }
    }

    pub fn invalid_value(field: &str, value: &str, reason: impl Into<String>) -> Self {
        QueryError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn attribute(field: &str, reason: impl Into<String>) -> Self {
        QueryError::Attribute {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::Syntax {
                input,
                position,
                message,
            } => {
                write!(
                    f,
                    "Syntax error in filter '{}' at position {}: {}",
                    input, position, message
                )
            }
            QueryError::UnknownField { name, suggestion } => {
                write!(f, "Unknown field '{}'", name)?;
                if let Some(suggestion) = suggestion {
                    write!(f, ", did you mean '{}'?", suggestion)?;
                }
                Ok(())
            }
            QueryError::InvalidValue {
                field,
                value,
                reason,
            } => write!(
                f,
                "Invalid value '{}' for field '{}': {}",
                value, field, reason
            ),
            QueryError::UnsupportedOperator {
                filter,
                field,
                operator,
            } => write!(
                f,
                "Filter '{}' for field '{}' does not support comparison '{}'",
                filter,
                field,
                operator.symbol()
            ),
            QueryError::Attribute { field, reason } => {
                write!(f, "Cannot read attribute '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for QueryError {}

impl From<QueryError> for String {
    fn from(error: QueryError) -> Self {
        error.to_string()
    }
}
