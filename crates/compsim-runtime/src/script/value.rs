//! Engine-neutral values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// String-keyed table of values.
pub type Table = BTreeMap<String, BindingValue>;

/// A value crossing the script-engine boundary.
///
/// Tables are keyed by string; sequences use [`List`](Self::List).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindingValue {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Number(f64),
    Str(String),
    List(Vec<BindingValue>),
    Table(Table),
}

impl BindingValue {
    /// Whether this is `Nil`.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// String contents, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value. Whole floats convert.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            #[allow(clippy::cast_possible_truncation)]
            Self::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean value; `Nil` and `false` are false, everything else true.
    #[must_use]
    pub fn truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// Table contents, if this is a table.
    #[must_use]
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Consumes the value, returning its table.
    #[must_use]
    pub fn into_table(self) -> Option<Table> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::List(_) | Self::Table(_) => "table",
        }
    }

    /// Builds a table from `(key, value)` pairs.
    #[must_use]
    pub fn table<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, BindingValue)>,
        K: Into<String>,
    {
        Self::Table(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for BindingValue {
    /// Text form used by `std.print`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
            Self::List(_) | Self::Table(_) => f.write_str("table"),
        }
    }
}

impl From<bool> for BindingValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for BindingValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for BindingValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for BindingValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for BindingValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for BindingValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Table> for BindingValue {
    fn from(v: Table) -> Self {
        Self::Table(v)
    }
}

impl<T: Into<BindingValue>> From<Option<T>> for BindingValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Nil, Into::into)
    }
}

impl From<Vec<BindingValue>> for BindingValue {
    fn from(v: Vec<BindingValue>) -> Self {
        Self::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_coercion() {
        assert_eq!(BindingValue::Int(4).as_int(), Some(4));
        assert_eq!(BindingValue::Number(2.0).as_int(), Some(2));
        assert_eq!(BindingValue::Number(2.5).as_int(), None);
        assert_eq!(BindingValue::from("17").as_int(), Some(17));
        assert_eq!(BindingValue::Nil.as_int(), None);
    }

    #[test]
    fn truthiness_follows_script_rules() {
        assert!(!BindingValue::Nil.truthy());
        assert!(!BindingValue::Bool(false).truthy());
        assert!(BindingValue::Int(0).truthy());
        assert!(BindingValue::from("").truthy());
    }

    #[test]
    fn display_for_print() {
        assert_eq!(BindingValue::from("hi").to_string(), "hi");
        assert_eq!(BindingValue::Int(3).to_string(), "3");
        assert_eq!(BindingValue::Nil.to_string(), "nil");
        assert_eq!(BindingValue::table([("a", BindingValue::Nil)]).to_string(), "table");
    }

    #[test]
    fn option_conversion() {
        assert_eq!(BindingValue::from(None::<String>), BindingValue::Nil);
        assert_eq!(BindingValue::from(Some("x")), BindingValue::from("x"));
    }
}
