//! Typed parameter values for generation requests.
//!
//! Default parameters arrive as JSON grouped by node, e.g.
//! `{"sampler": {"steps": 20, "cfg": 7.5}, "loader": {"image": "a.png"}}`.
//! They are parsed into [`ParamValue`] so downstream code can match on the
//! value kind instead of poking at `serde_json::Value`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Field name -> value. Ordered so that expansion output is deterministic.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Group (node) name -> fields for that group.
pub type DefaultParams = BTreeMap<String, ParamMap>;

/// A reference to an input image: a URL or a storage path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub image_ref: String,
}

impl ImageRef {
    pub fn new(image_ref: impl Into<String>) -> Self {
        Self {
            image_ref: image_ref.into(),
        }
    }
}

/// A single parameter value.
///
/// Deserialization is untagged: JSON booleans, integers, floats, strings and
/// arrays map onto the matching variant. An object `{"image_ref": "..."}`
/// maps onto [`ParamValue::Image`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Image(ImageRef),
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// Whether the value carries no usable content (blank text, empty list).
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Image(r) => r.image_ref.trim().is_empty(),
            Self::List(items) => items.iter().all(ParamValue::is_blank),
            Self::Bool(_) | Self::Integer(_) | Self::Float(_) => false,
        }
    }

    /// Flatten the value into image references.
    ///
    /// Lists (as used by `image_urls`) contribute each of their non-blank
    /// entries; scalars contribute their textual form.
    pub fn image_refs(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.iter().flat_map(ParamValue::image_refs).collect(),
            other if other.is_blank() => Vec::new(),
            Self::Image(r) => vec![r.image_ref.trim().to_string()],
            other => vec![other.to_string().trim().to_string()],
        }
    }

    /// Borrow the inner string for text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Image(r) => Some(&r.image_ref),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Image(r) => f.write_str(&r.image_ref),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<ImageRef> for ParamValue {
    fn from(value: ImageRef) -> Self {
        Self::Image(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_maps_to_variants() {
        let parsed: DefaultParams = serde_json::from_value(serde_json::json!({
            "sampler": {"steps": 20, "cfg": 7.5, "tiled": false, "name": "euler"},
            "loader": {"image_urls": ["a.png", "b.png"], "mask": {"image_ref": "m.png"}}
        }))
        .unwrap();

        let sampler = &parsed["sampler"];
        assert_eq!(sampler["steps"], ParamValue::Integer(20));
        assert_eq!(sampler["cfg"], ParamValue::Float(7.5));
        assert_eq!(sampler["tiled"], ParamValue::Bool(false));
        assert_eq!(sampler["name"], ParamValue::Text("euler".into()));

        let loader = &parsed["loader"];
        assert_eq!(
            loader["image_urls"],
            ParamValue::List(vec!["a.png".into(), "b.png".into()])
        );
        assert_eq!(loader["mask"], ParamValue::Image(ImageRef::new("m.png")));
    }

    #[test]
    fn serializes_back_to_plain_json() {
        let value = ParamValue::List(vec![ParamValue::Integer(1), ParamValue::Text("x".into())]);
        assert_eq!(serde_json::to_value(&value).unwrap(), serde_json::json!([1, "x"]));
    }

    #[test]
    fn image_refs_flatten_lists_and_skip_blanks() {
        let value = ParamValue::List(vec!["a.png".into(), "  ".into(), " b.png ".into()]);
        assert_eq!(value.image_refs(), vec!["a.png", "b.png"]);
        assert!(ParamValue::Text("   ".into()).image_refs().is_empty());
    }

    #[test]
    fn blank_detection() {
        assert!(ParamValue::Text(" ".into()).is_blank());
        assert!(ParamValue::List(vec![]).is_blank());
        assert!(!ParamValue::Integer(0).is_blank());
        assert!(!ParamValue::Bool(false).is_blank());
    }

    #[test]
    fn display_joins_lists() {
        let value = ParamValue::List(vec![ParamValue::Integer(1), ParamValue::Float(0.5)]);
        assert_eq!(value.to_string(), "1,0.5");
    }
}
