//! Search filter construction.
//!
//! A small builder for the parenthesized prefix filter grammar, with
//! RFC 4515 value escaping. Callers may also pass raw filter strings to
//! [`crate::client::LdapClient::search`]; this module exists so they do
//! not have to hand-escape values.

use std::fmt;

/// Escape special characters in a filter value per RFC 4515.
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// A composable search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// All inner filters must match.
    And(Vec<Filter>),
    /// Any inner filter must match.
    Or(Vec<Filter>),
    /// The inner filter must not match.
    Not(Box<Filter>),
    /// Attribute equals value.
    Equals { attribute: String, value: String },
    /// Attribute contains the value as a substring.
    Contains { attribute: String, value: String },
    /// Attribute starts with the value.
    StartsWith { attribute: String, value: String },
    /// Attribute ends with the value.
    EndsWith { attribute: String, value: String },
    /// Attribute is ordered at or after the value.
    GreaterOrEqual { attribute: String, value: String },
    /// Attribute is ordered at or before the value.
    LessOrEqual { attribute: String, value: String },
    /// Attribute is present, regardless of value.
    Present { attribute: String },
}

impl Filter {
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn starts_with(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::StartsWith {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn ends_with(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::EndsWith {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn gte(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::GreaterOrEqual {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn lte(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::LessOrEqual {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => {
                write!(f, "(&")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                write!(f, ")")
            }
            Filter::Or(filters) => {
                write!(f, "(|")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                write!(f, ")")
            }
            Filter::Not(filter) => write!(f, "(!{filter})"),
            Filter::Equals { attribute, value } => {
                write!(f, "({}={})", attribute, escape_filter_value(value))
            }
            Filter::Contains { attribute, value } => {
                write!(f, "({}=*{}*)", attribute, escape_filter_value(value))
            }
            Filter::StartsWith { attribute, value } => {
                write!(f, "({}={}*)", attribute, escape_filter_value(value))
            }
            Filter::EndsWith { attribute, value } => {
                write!(f, "({}=*{})", attribute, escape_filter_value(value))
            }
            Filter::GreaterOrEqual { attribute, value } => {
                write!(f, "({}>={})", attribute, escape_filter_value(value))
            }
            Filter::LessOrEqual { attribute, value } => {
                write!(f, "({}<={})", attribute, escape_filter_value(value))
            }
            Filter::Present { attribute } => write!(f, "({attribute}=*)"),
        }
    }
}
