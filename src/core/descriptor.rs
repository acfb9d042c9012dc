use crate::core::error::{OrchestratorError, Result};
use crate::core::{FieldMap, NodeValue};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The semantic type of a single field, checked against concrete values at run time.
#[derive(Clone)]
pub enum FieldType {
    Any,
    Null,
    Bool,
    Integer,
    Float,
    Number,
    String,
    Array,
    Object,
    /// An array whose items all match the inner type.
    ArrayOf(Box<FieldType>),
    /// Matches when any of the variants matches.
    OneOf(Vec<FieldType>),
    /// A named predicate, for shapes the built-in variants cannot express.
    Custom {
        name: String,
        predicate: Arc<dyn Fn(&NodeValue) -> bool + Send + Sync>,
    },
}

impl FieldType {
    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&NodeValue) -> bool + Send + Sync + 'static,
    {
        FieldType::Custom {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn array_of(inner: FieldType) -> Self {
        FieldType::ArrayOf(Box::new(inner))
    }

    /// Whether `value` satisfies this type.
    pub fn matches(&self, value: &NodeValue) -> bool {
        match self {
            FieldType::Any => true,
            FieldType::Null => value.is_null(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_f64(),
            FieldType::Number => value.is_number(),
            FieldType::String => value.is_string(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::ArrayOf(inner) => value
                .as_array()
                .is_some_and(|items| items.iter().all(|item| inner.matches(item))),
            FieldType::OneOf(variants) => variants.iter().any(|variant| variant.matches(value)),
            FieldType::Custom { predicate, .. } => predicate(value),
        }
    }

    /// Human readable name used in error messages.
    pub fn name(&self) -> String {
        match self {
            FieldType::Any => "any".to_string(),
            FieldType::Null => "null".to_string(),
            FieldType::Bool => "bool".to_string(),
            FieldType::Integer => "integer".to_string(),
            FieldType::Float => "float".to_string(),
            FieldType::Number => "number".to_string(),
            FieldType::String => "string".to_string(),
            FieldType::Array => "array".to_string(),
            FieldType::Object => "object".to_string(),
            FieldType::ArrayOf(inner) => format!("array<{}>", inner.name()),
            FieldType::OneOf(variants) => variants
                .iter()
                .map(FieldType::name)
                .collect::<Vec<_>>()
                .join(" | "),
            FieldType::Custom { name, .. } => name.clone(),
        }
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldType({})", self.name())
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for FieldType {
    type Err = OrchestratorError;

    /// Parses type names such as `int`, `str`, `array<float>` or `int | null`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let variants = split_top_level(s, '|');
        if variants.len() > 1 {
            return variants
                .into_iter()
                .map(str::parse)
                .collect::<Result<Vec<FieldType>>>()
                .map(FieldType::OneOf);
        }

        let lowered = s.to_ascii_lowercase();
        for prefix in ["array<", "list<"] {
            if let Some(rest) = lowered.strip_prefix(prefix) {
                let inner = rest.strip_suffix('>').ok_or_else(|| {
                    OrchestratorError::InvalidDeclaration(format!("unterminated type '{}'", s))
                })?;
                return Ok(FieldType::array_of(inner.parse()?));
            }
        }

        match lowered.as_str() {
            "any" => Ok(FieldType::Any),
            "null" | "none" => Ok(FieldType::Null),
            "bool" | "boolean" => Ok(FieldType::Bool),
            "int" | "integer" => Ok(FieldType::Integer),
            "float" => Ok(FieldType::Float),
            "number" => Ok(FieldType::Number),
            "str" | "string" => Ok(FieldType::String),
            "list" | "array" => Ok(FieldType::Array),
            "dict" | "map" | "object" => Ok(FieldType::Object),
            _ => Err(OrchestratorError::InvalidDeclaration(format!(
                "unknown field type '{}'",
                s
            ))),
        }
    }
}

/// Short name of the JSON kind of `value`, used when reporting mismatches.
pub fn value_kind(value: &NodeValue) -> &'static str {
    match value {
        NodeValue::Null => "null",
        NodeValue::Bool(_) => "bool",
        NodeValue::Number(n) if n.is_f64() => "float",
        NodeValue::Number(_) => "integer",
        NodeValue::String(_) => "string",
        NodeValue::Array(_) => "array",
        NodeValue::Object(_) => "object",
    }
}

/// Declares the named, typed fields a node consumes or produces.
///
/// Fields are split into required and optional; a name lives in at most one
/// of the two. Undeclared fields in validated data are ignored.
#[derive(Debug, Clone, Default)]
pub struct TypeDescriptor {
    required: BTreeMap<String, FieldType>,
    optional: BTreeMap<String, FieldType>,
}

impl TypeDescriptor {
    /// An empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// A descriptor with only required fields.
    pub fn requiring<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, FieldType)>,
    {
        Self {
            required: fields.into_iter().map(|(k, t)| (k.into(), t)).collect(),
            optional: BTreeMap::new(),
        }
    }

    /// Builds a descriptor from explicit required and optional fields.
    ///
    /// Fails with a configuration error when a name is declared in both.
    pub fn from_fields(
        required: BTreeMap<String, FieldType>,
        optional: BTreeMap<String, FieldType>,
    ) -> Result<Self> {
        let overlap: Vec<&str> = required
            .keys()
            .filter(|k| optional.contains_key(*k))
            .map(String::as_str)
            .collect();
        if !overlap.is_empty() {
            return Err(OrchestratorError::Configuration(format!(
                "field(s) declared both required and optional: [{}]",
                overlap.join(", ")
            )));
        }
        Ok(Self { required, optional })
    }

    pub fn required(&self) -> &BTreeMap<String, FieldType> {
        &self.required
    }

    pub fn optional(&self) -> &BTreeMap<String, FieldType> {
        &self.optional
    }

    /// Declared field names, filtered by category.
    pub fn keys(&self, include_required: bool, include_optional: bool) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        if include_required {
            keys.extend(self.required.keys().cloned());
        }
        if include_optional {
            keys.extend(self.optional.keys().cloned());
        }
        keys
    }

    pub fn required_keys(&self) -> BTreeSet<String> {
        self.keys(true, false)
    }

    pub fn all_keys(&self) -> BTreeSet<String> {
        self.keys(true, true)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.required.contains_key(name) || self.optional.contains_key(name)
    }

    pub fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.required.get(name).or_else(|| self.optional.get(name))
    }

    pub fn len(&self) -> usize {
        self.required.len() + self.optional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Declares a new field.
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        field_type: FieldType,
        required: bool,
    ) -> Result<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(OrchestratorError::DuplicateField(name));
        }
        if name.trim().is_empty() {
            return Err(OrchestratorError::InvalidDeclaration(
                "field name cannot be empty".to_string(),
            ));
        }
        let target = if required {
            &mut self.required
        } else {
            &mut self.optional
        };
        target.insert(name, field_type);
        Ok(())
    }

    /// Removes a field from whichever category declares it.
    pub fn remove_field(&mut self, name: &str) -> Result<FieldType> {
        self.required
            .remove(name)
            .or_else(|| self.optional.remove(name))
            .ok_or_else(|| OrchestratorError::FieldNotFound(name.to_string()))
    }

    /// Checks `data` against every declared field.
    pub fn validate(&self, data: &FieldMap) -> Result<()> {
        self.validate_required(data)?;
        for (key, field_type) in &self.optional {
            if let Some(value) = data.get(key) {
                if !field_type.matches(value) {
                    return Err(OrchestratorError::Validation(format!(
                        "optional field '{}' expected {}, got {}",
                        key,
                        field_type,
                        value_kind(value)
                    )));
                }
            }
        }
        Ok(())
    }

    /// Checks presence and type of the required fields only.
    pub fn validate_required(&self, data: &FieldMap) -> Result<()> {
        for (key, field_type) in &self.required {
            let value = data.get(key).ok_or_else(|| {
                OrchestratorError::Validation(format!("missing required field '{}'", key))
            })?;
            if !field_type.matches(value) {
                return Err(OrchestratorError::Validation(format!(
                    "field '{}' expected {}, got {}",
                    key,
                    field_type,
                    value_kind(value)
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .required
            .iter()
            .map(|(k, t)| format!("{}: {}", k, t))
            .collect();
        parts.extend(self.optional.iter().map(|(k, t)| format!("{}?: {}", k, t)));
        write!(f, "{{{}}}", parts.join(", "))
    }
}

impl FromStr for TypeDescriptor {
    type Err = OrchestratorError;

    /// Parses shorthand syntax: "text: str, lang?: str, count: int"
    fn from_str(s: &str) -> Result<Self> {
        let mut descriptor = TypeDescriptor::new();
        for entry in split_top_level(s, ',') {
            if entry.is_empty() {
                continue;
            }
            let (name, field_type) = match entry.split_once(':') {
                Some((name, type_name)) => (name.trim(), type_name.parse::<FieldType>()?),
                None => (entry, FieldType::Any),
            };
            match name.strip_suffix('?') {
                Some(name) => descriptor.add_field(name.trim(), field_type, false)?,
                None => descriptor.add_field(name, field_type, true)?,
            }
        }
        Ok(descriptor)
    }
}

/// Splits on `sep` outside of `<...>` groups, trimming every piece.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

/// Macro for rapid descriptor creation: descriptor!("text: str, lang?: str")
#[macro_export]
macro_rules! descriptor {
    ($s:expr) => {
        $s.parse::<$crate::TypeDescriptor>()
            .expect("Invalid descriptor shorthand")
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_type_parsing() {
        assert!(matches!("int".parse::<FieldType>(), Ok(FieldType::Integer)));
        assert!(matches!(" Str ".parse::<FieldType>(), Ok(FieldType::String)));
        assert_eq!(
            "array<int | null>".parse::<FieldType>().unwrap().name(),
            "array<integer | null>"
        );
        assert!(matches!(
            "tensor".parse::<FieldType>(),
            Err(OrchestratorError::InvalidDeclaration(_))
        ));
    }

    #[test]
    fn test_field_type_matching() {
        assert!(FieldType::Integer.matches(&json!(3)));
        assert!(!FieldType::Integer.matches(&json!(3.5)));
        assert!(!FieldType::Integer.matches(&json!(true)));
        assert!(FieldType::Number.matches(&json!(3.5)));
        assert!(FieldType::array_of(FieldType::String).matches(&json!(["a", "b"])));
        assert!(!FieldType::array_of(FieldType::String).matches(&json!(["a", 1])));

        let even = FieldType::custom("even", |v| v.as_i64().is_some_and(|n| n % 2 == 0));
        assert!(even.matches(&json!(4)));
        assert!(!even.matches(&json!(5)));
    }

    #[test]
    fn test_shorthand_parsing() {
        let desc: TypeDescriptor = "text: str, lang?: str, tags: array<str>, extra"
            .parse()
            .unwrap();
        assert_eq!(
            desc.required_keys(),
            BTreeSet::from(["text".to_string(), "tags".to_string(), "extra".to_string()])
        );
        assert_eq!(desc.keys(false, true), BTreeSet::from(["lang".to_string()]));
        assert!(matches!(desc.field_type("extra"), Some(FieldType::Any)));
        assert_eq!(
            desc.to_string(),
            "{extra: any, tags: array<string>, text: string, lang?: string}"
        );
    }

    #[test]
    fn test_shorthand_rejects_duplicates() {
        let err = "a: int, a?: str".parse::<TypeDescriptor>().unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateField(name) if name == "a"));
    }
}
