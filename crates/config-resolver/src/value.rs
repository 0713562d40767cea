//! Dynamically-typed settings values.

use std::fmt;

use indexmap::IndexMap;

/// A settings value.
///
/// Mirrors the shape that `serde_json`/`serde_yaml` produce when parsing a provider file, minus
/// any schema knowledge: there is no notion of "the right type" for a setting, only what a
/// directive happens to require of it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `null`.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// String value.
    String(String),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// Mapping of values. Only ever appears before [flattening](crate::flatten::flatten); a
    /// flattened provider dictionary contains no `Object` values.
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Returns this value as a list, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns this value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns this value as an object, if it is one.
    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// True for `Bool`/`Int`/`Float`, the types `crossref` refuses to copy.
    pub(crate) fn is_numeric_or_bool(&self) -> bool {
        matches!(self, Self::Bool(_) | Self::Int(_) | Self::Float(_))
    }

    /// Renders this value the way Python's `str()` would for the scalars `prependlocal` accepts.
    pub(crate) fn to_path_segment(&self) -> String {
        match self {
            Self::Null => "None".to_owned(),
            Self::Bool(b) => if *b { "True" } else { "False" }.to_owned(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Array(_) | Self::Object(_) => format!("{self}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => formatter.write_str("null"),
            Self::Bool(b) => write!(formatter, "{b}"),
            Self::Int(i) => write!(formatter, "{i}"),
            Self::Float(v) => write!(formatter, "{v}"),
            Self::String(s) => formatter.write_str(s),
            Self::Array(items) => {
                formatter.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        formatter.write_str(", ")?;
                    }
                    write!(formatter, "{item}")?;
                }
                formatter.write_str("]")
            }
            Self::Object(map) => {
                formatter.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        formatter.write_str(", ")?;
                    }
                    write!(formatter, "{key}: {value}")?;
                }
                formatter.write_str("}")
            }
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

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(num) => {
                if let Some(i) = num.as_i64() {
                    Self::Int(i)
                } else {
                    // `as_f64` is total for any `serde_json::Number`.
                    Self::Float(num.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(value: serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Self::Null,
            serde_yaml::Value::Bool(b) => Self::Bool(b),
            serde_yaml::Value::Number(num) => {
                if let Some(i) = num.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(num.as_f64().unwrap_or_default())
                }
            }
            serde_yaml::Value::String(s) => Self::String(s),
            serde_yaml::Value::Sequence(items) => {
                Self::Array(items.into_iter().map(Value::from).collect())
            }
            serde_yaml::Value::Mapping(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| {
                        let key = key.as_str().map(str::to_owned).unwrap_or_else(|| {
                            serde_yaml::to_string(&key).unwrap_or_default().trim().to_owned()
                        });
                        (key, Value::from(value))
                    })
                    .collect(),
            ),
            serde_yaml::Value::Tagged(tagged) => Value::from(tagged.value),
        }
    }
}

/// Converts a resolved, flat [`Value`] tree back into `serde_json::Value` for [`dump_json`
/// formatting](crate::database::ConfigDatabase::dump_json).
impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), serde_json::Value::from(value)))
                    .collect(),
            ),
        }
    }
}
