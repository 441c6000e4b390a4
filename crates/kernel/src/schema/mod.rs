//! Declarative request schemas.
//!
//! A [`Schema`] is plain data: a map of field name to [`FieldSpec`]. Schemas
//! can be built in code with the builder methods below or loaded from YAML
//! files, and are evaluated by the pure [`validate`] function.

mod registry;
mod validate;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use registry::{SchemaError, SchemaRegistry};
pub use validate::validate;

/// JSON type a field must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Any,
}

/// Well-known string formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Email,
    Uuid,
    /// RFC 3339 timestamp with offset.
    DateTime,
}

/// Constraints for one field.
///
/// `min`/`max` bound the numeric value for numbers, the character count for
/// strings and the item count for arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub kind: FieldKind,

    #[serde(default = "default_required")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Numeric value must be strictly greater than this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_min: Option<f64>,

    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,

    /// Value substituted when the field is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Accept numeric and boolean fields sent as strings (query parameters,
    /// form posts).
    #[serde(default)]
    pub coerce: bool,

    /// Accept `""` for string fields without applying other constraints.
    #[serde(default)]
    pub allow_empty: bool,

    /// Replaces the generated message when a constraint fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Nested fields for `object` kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, FieldSpec>>,

    /// Item spec for `array` kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSpec>>,

    #[serde(skip)]
    compiled: OnceLock<Option<Regex>>,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: true,
            min: None,
            max: None,
            exclusive_min: None,
            one_of: None,
            literal: None,
            pattern: None,
            format: None,
            default: None,
            coerce: false,
            allow_empty: false,
            message: None,
            fields: None,
            items: None,
            compiled: OnceLock::new(),
        }
    }

    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    pub fn number() -> Self {
        Self::new(FieldKind::Number)
    }

    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    pub fn any() -> Self {
        Self::new(FieldKind::Any)
    }

    pub fn object(fields: impl IntoIterator<Item = (&'static str, FieldSpec)>) -> Self {
        let mut spec = Self::new(FieldKind::Object);
        spec.fields = Some(
            fields
                .into_iter()
                .map(|(name, field)| (name.to_string(), field))
                .collect(),
        );
        spec
    }

    pub fn array(items: FieldSpec) -> Self {
        let mut spec = Self::new(FieldKind::Array);
        spec.items = Some(Box::new(items));
        spec
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn positive(mut self) -> Self {
        self.exclusive_min = Some(0.0);
        self
    }

    pub fn one_of<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.one_of = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn literal(mut self, value: impl Into<Value>) -> Self {
        self.literal = Some(value.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self.compiled = OnceLock::new();
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn coerce(mut self) -> Self {
        self.coerce = true;
        self
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Compiled form of `pattern`, cached on first use.
    ///
    /// `None` when no pattern is set or the pattern does not compile;
    /// [`Schema::check`] rejects the latter at registration time.
    fn regex(&self) -> Option<&Regex> {
        let pattern = self.pattern.as_deref()?;
        self.compiled
            .get_or_init(|| Regex::new(pattern).ok())
            .as_ref()
    }

    fn check(&self, schema: &str, path: &str) -> Result<(), SchemaError> {
        if let Some(pattern) = &self.pattern {
            Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
                schema: schema.to_string(),
                field: path.to_string(),
                source,
            })?;
        }

        if let Some(fields) = &self.fields {
            for (name, field) in fields {
                field.check(schema, &format!("{path}.{name}"))?;
            }
        }

        if let Some(items) = &self.items {
            items.check(schema, &format!("{path}[]"))?;
        }

        Ok(())
    }
}

/// A named request schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Verify the schema is usable (all patterns compile).
    pub fn check(&self) -> Result<(), SchemaError> {
        for (name, field) in &self.fields {
            field.check(&self.name, name)?;
        }
        Ok(())
    }
}
