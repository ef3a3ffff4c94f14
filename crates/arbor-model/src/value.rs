//! Dynamic field values
//!
//! [`Value`] is the uniform representation of everything a model field can
//! hold: scalars, nested model objects, lists and insertion-ordered maps.

use crate::object::ObjectRef;
use indexmap::IndexMap;
use std::fmt;

/// Insertion-ordered map used for map-kind fields
pub type ValueMap = IndexMap<String, Value>;

/// Field value
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Unset
    #[default]
    Null,

    /// Boolean
    Bool(bool),

    /// Signed integer
    Int(i64),

    /// Floating point number
    Float(f64),

    /// String
    Str(String),

    /// Nested model object
    Object(ObjectRef),

    /// Ordered sequence
    List(Vec<Value>),

    /// Insertion-ordered string-keyed map
    Map(ValueMap),
}

impl Value {
    /// Check for [`Value::Null`]
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Truthiness used by default checks and default filling
    ///
    /// Falsy: null, empty string, empty list/map, `false`, zero.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Object(_) => true,
            Self::List(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
        }
    }

    /// Nested object, if any
    #[inline]
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// String content, if any
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if any
    #[inline]
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// List content, if any
    #[inline]
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Map content, if any
    #[inline]
    #[must_use]
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Short description of the value's shape for diagnostics
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(_) => "bool".to_string(),
            Self::Int(_) => "int".to_string(),
            Self::Float(_) => "float".to_string(),
            Self::Str(_) => "string".to_string(),
            Self::Object(obj) => format!("object '{}'", obj.type_name()),
            Self::List(_) => "list".to_string(),
            Self::Map(_) => "map".to_string(),
        }
    }

    /// All model objects directly held by this value (not recursive)
    #[must_use]
    pub fn objects(&self) -> Vec<ObjectRef> {
        match self {
            Self::Object(obj) => vec![obj.clone()],
            Self::List(items) => items.iter().filter_map(|v| v.as_object().cloned()).collect(),
            Self::Map(entries) => entries
                .values()
                .filter_map(|v| v.as_object().cloned())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Convert a JSON document into a value
    ///
    /// Objects become maps, arrays become lists.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Object(obj) => write!(f, "{obj:?}"),
            Self::List(items) => write!(f, "[{} items]", items.len()),
            Self::Map(entries) => write!(f, "{{{} entries}}", entries.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Self::Object(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<ValueMap> for Value {
    fn from(value: ValueMap) -> Self {
        Self::Map(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
