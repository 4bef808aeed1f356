// Tool Argument Schema - kinds, constraints and validated values

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Wire type of a single argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    String,
    Integer,
    Boolean,
    StringList,
}

impl ArgKind {
    /// Human-readable name used in type mismatch messages
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgKind::String => "a string",
            ArgKind::Integer => "an integer",
            ArgKind::Boolean => "a boolean",
            ArgKind::StringList => "a list of strings",
        }
    }

    fn json_type(&self) -> &'static str {
        match self {
            ArgKind::String => "string",
            ArgKind::Integer => "integer",
            ArgKind::Boolean => "boolean",
            ArgKind::StringList => "array",
        }
    }
}

/// Semantic constraint on an argument value.
///
/// For `StringList` arguments every element is checked, except for
/// `NonEmpty` which applies to the list itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// CIDR, single IPv4 address, or `a.b.c.d-e.f.g.h` range
    Ipv4Network,
    /// 1..=65535
    Port,
    /// `22,80,8000-8100`
    PortList,
    OneOf(&'static [&'static str]),
    Domain,
    /// Domain, IPv4, IPv6 or IPv4 CIDR
    Host,
    Email,
    HttpUrl,
    /// `<digits>[K|M|G]`
    Bandwidth,
    Username,
    MacAddress,
    InterfaceName,
    /// No control characters, no leading `-`
    SafeText,
    FilePath,
    /// http(s) URL, `@`-prefixed URL, or image file path
    OcrSource,
    IntRange { min: i64, max: i64 },
    NonEmpty,
}

impl Constraint {
    /// Rule name reported in constraint violations
    pub fn rule(&self) -> String {
        match self {
            Constraint::Ipv4Network => "ipv4_network".to_string(),
            Constraint::Port => "port".to_string(),
            Constraint::PortList => "port_list".to_string(),
            Constraint::OneOf(set) => format!("one_of({})", set.join("|")),
            Constraint::Domain => "domain".to_string(),
            Constraint::Host => "host".to_string(),
            Constraint::Email => "email".to_string(),
            Constraint::HttpUrl => "http_url".to_string(),
            Constraint::Bandwidth => "bandwidth".to_string(),
            Constraint::Username => "username".to_string(),
            Constraint::MacAddress => "mac_address".to_string(),
            Constraint::InterfaceName => "interface_name".to_string(),
            Constraint::SafeText => "safe_text".to_string(),
            Constraint::FilePath => "file_path".to_string(),
            Constraint::OcrSource => "ocr_source".to_string(),
            Constraint::IntRange { min, max } => format!("int_range({min}..={max})"),
            Constraint::NonEmpty => "non_empty".to_string(),
        }
    }
}

/// A validated argument value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
}

impl ArgValue {
    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Str(s) => Value::String(s.clone()),
            ArgValue::Int(i) => Value::from(*i),
            ArgValue::Bool(b) => Value::Bool(*b),
            ArgValue::List(items) => Value::from(items.clone()),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Str(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Str(s)
    }
}

impl From<i64> for ArgValue {
    fn from(i: i64) -> Self {
        ArgValue::Int(i)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(items: Vec<String>) -> Self {
        ArgValue::List(items)
    }
}

/// Declaration of one tool argument
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
    pub description: &'static str,
    pub constraints: Vec<Constraint>,
    pub default: Option<ArgValue>,
}

impl ArgSpec {
    pub fn required(name: &'static str, kind: ArgKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
            constraints: Vec::new(),
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: ArgKind, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_default(mut self, value: impl Into<ArgValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// JSON Schema fragment for this argument
    pub fn json_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".into(), json!(self.kind.json_type()));
        schema.insert("description".into(), json!(self.description));

        if self.kind == ArgKind::StringList {
            schema.insert("items".into(), json!({ "type": "string" }));
        }

        for constraint in &self.constraints {
            match constraint {
                Constraint::OneOf(set) if self.kind == ArgKind::StringList => {
                    schema.insert("items".into(), json!({ "type": "string", "enum": set }));
                }
                Constraint::OneOf(set) => {
                    schema.insert("enum".into(), json!(set));
                }
                Constraint::Port => {
                    schema.insert("minimum".into(), json!(1));
                    schema.insert("maximum".into(), json!(65535));
                }
                Constraint::IntRange { min, max } => {
                    schema.insert("minimum".into(), json!(min));
                    schema.insert("maximum".into(), json!(max));
                }
                Constraint::NonEmpty if self.kind == ArgKind::StringList => {
                    schema.insert("minItems".into(), json!(1));
                }
                Constraint::Email => {
                    schema.insert("format".into(), json!("email"));
                }
                Constraint::HttpUrl => {
                    schema.insert("format".into(), json!("uri"));
                }
                _ => {}
            }
        }

        if let Some(default) = &self.default {
            schema.insert("default".into(), default.to_json());
        }

        Value::Object(schema)
    }
}

/// Render an input schema (JSON Schema object) for a list of arguments.
///
/// `extra` adds undeclared-but-accepted properties such as the output
/// destination of persisting tools.
pub fn input_schema(specs: &[ArgSpec], extra: &[(&str, Value)]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for spec in specs {
        properties.insert(spec.name.to_string(), spec.json_schema());
        if spec.required {
            required.push(spec.name);
        }
    }
    for (name, schema) in extra {
        properties.insert((*name).to_string(), schema.clone());
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Arguments that passed validation, with defaults filled in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidatedArgs(BTreeMap<String, ArgValue>);

impl ValidatedArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ArgValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(ArgValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Absent booleans read as false
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.0.get(name), Some(ArgValue::Bool(true)))
    }

    pub fn list(&self, name: &str) -> &[String] {
        match self.0.get(name) {
            Some(ArgValue::List(items)) => items.as_slice(),
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArgValue)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_schema_lists_required_and_rejects_extras() {
        let specs = vec![
            ArgSpec::required("domain", ArgKind::String, "Target domain").with(Constraint::Domain),
            ArgSpec::optional("scan_type", ArgKind::String, "Scan type")
                .with(Constraint::OneOf(&["std", "rvl"]))
                .with_default("std"),
        ];

        let schema = input_schema(&specs, &[]);

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["domain"]));
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["properties"]["scan_type"]["enum"], json!(["std", "rvl"]));
        assert_eq!(schema["properties"]["scan_type"]["default"], json!("std"));
    }

    #[test]
    fn test_list_schema_carries_item_enum() {
        let spec = ArgSpec::optional("scan_options", ArgKind::StringList, "Options")
            .with(Constraint::OneOf(&["quick", "udp"]));

        let schema = spec.json_schema();

        assert_eq!(schema["type"], "array");
        assert_eq!(schema["items"]["enum"], json!(["quick", "udp"]));
    }

    #[test]
    fn test_validated_args_typed_getters() {
        let args = ValidatedArgs::new()
            .with("port", 80i64)
            .with("subnet", "10.0.0.0/24")
            .with("nsfw", true)
            .with("usernames", vec!["alice".to_string()]);

        assert_eq!(args.int("port"), Some(80));
        assert_eq!(args.str("subnet"), Some("10.0.0.0/24"));
        assert!(args.flag("nsfw"));
        assert!(!args.flag("missing"));
        assert_eq!(args.list("usernames"), ["alice".to_string()]);
        assert!(args.list("missing").is_empty());
        assert_eq!(args.str("port"), None);
    }
}
