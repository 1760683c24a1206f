//! Template data model.
//!
//! Variable definitions arrive as loosely typed JSON (`{"type": "number",
//! "default": 5, "min": 1}`) and are parsed into [`VariableDefinition`],
//! a tagged variant per declared type. Parsing reports every problem it
//! finds rather than stopping at the first one.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Variables the job processor injects into every item.
pub const INJECTED_VARIABLES: &[&str] = &["index", "date"];

/// Type names accepted in a variable definition.
pub const VARIABLE_TYPES: &[&str] = &["string", "number", "boolean", "array", "object"];

/// Ordered mapping from variable name to its definition.
pub type VariableSchema = IndexMap<String, VariableDefinition>;

/// How supplied variable values are checked before a job is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    #[default]
    Strict,
    Custom,
    None,
}

impl std::fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationMode::Strict => write!(f, "strict"),
            ValidationMode::Custom => write!(f, "custom"),
            ValidationMode::None => write!(f, "none"),
        }
    }
}

/// Declared type plus the constraints that apply to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VariableKind {
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
        #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
        allowed: Option<Vec<String>>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Number>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
        allowed: Option<Vec<Number>>,
    },
    Boolean {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<bool>,
    },
    Array {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Vec<Value>>,
    },
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Map<String, Value>>,
    },
}

/// A single declared template variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    #[serde(flatten)]
    pub kind: VariableKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VariableDefinition {
    pub fn new(kind: VariableKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::new(VariableKind::String {
            default: None,
            allowed: None,
        })
    }

    pub fn number() -> Self {
        Self::new(VariableKind::Number {
            default: None,
            min: None,
            max: None,
            allowed: None,
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            VariableKind::String { .. } => "string",
            VariableKind::Number { .. } => "number",
            VariableKind::Boolean { .. } => "boolean",
            VariableKind::Array { .. } => "array",
            VariableKind::Object { .. } => "object",
        }
    }

    /// Default value as loose JSON, if declared.
    pub fn default_value(&self) -> Option<Value> {
        match &self.kind {
            VariableKind::String { default, .. } => default.clone().map(Value::String),
            VariableKind::Number { default, .. } => default.clone().map(Value::Number),
            VariableKind::Boolean { default } => default.map(Value::Bool),
            VariableKind::Array { default } => default.clone().map(Value::Array),
            VariableKind::Object { default } => default.clone().map(Value::Object),
        }
    }

    pub fn has_default(&self) -> bool {
        self.default_value().is_some()
    }

    /// Whether `value` has the declared JSON type.
    pub fn accepts_type(&self, value: &Value) -> bool {
        matches!(
            (&self.kind, value),
            (VariableKind::String { .. }, Value::String(_))
                | (VariableKind::Number { .. }, Value::Number(_))
                | (VariableKind::Boolean { .. }, Value::Bool(_))
                | (VariableKind::Array { .. }, Value::Array(_))
                | (VariableKind::Object { .. }, Value::Object(_))
        )
    }

    /// Parse a loosely typed JSON definition, collecting every problem.
    pub fn from_json(name: &str, raw: &Value) -> Result<Self, Vec<String>> {
        let Some(obj) = raw.as_object() else {
            return Err(vec![format!("Variable {} must be an object", name)]);
        };

        let type_name = match obj.get("type") {
            None => return Err(vec![format!("Variable {} missing 'type' field", name)]),
            Some(Value::String(t)) if VARIABLE_TYPES.contains(&t.as_str()) => t.as_str(),
            Some(Value::String(t)) => {
                return Err(vec![format!("Variable {} has invalid type: {}", name, t)])
            }
            Some(other) => {
                return Err(vec![format!("Variable {} has invalid type: {}", name, other)])
            }
        };

        let mut errors = Vec::new();
        let default = obj.get("default").filter(|v| !v.is_null());
        let description = match obj.get("description") {
            None | Some(Value::Null) => None,
            Some(Value::String(d)) => Some(d.clone()),
            Some(_) => {
                errors.push(format!("Variable {}: description must be a string", name));
                None
            }
        };

        let kind = match type_name {
            "string" => {
                let default = match default {
                    None => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(_) => {
                        errors.push(format!("Variable {}: default must be a string", name));
                        None
                    }
                };
                let allowed = parse_enum(name, obj.get("enum"), &mut errors, |v| {
                    v.as_str().map(str::to_string)
                });
                if let (Some(d), Some(allowed)) = (&default, &allowed) {
                    if !allowed.contains(d) {
                        errors.push(format!("Variable {}: default not in enum", name));
                    }
                }
                VariableKind::String { default, allowed }
            }
            "number" => {
                let min = parse_bound(name, "min", obj.get("min"), &mut errors);
                let max = parse_bound(name, "max", obj.get("max"), &mut errors);
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        errors.push(format!("Variable {}: min > max", name));
                    }
                }
                let default = match default {
                    None => None,
                    Some(Value::Number(n)) => Some(n.clone()),
                    Some(_) => {
                        errors.push(format!("Variable {}: default must be a number", name));
                        None
                    }
                };
                if let Some(d) = default.as_ref().and_then(Number::as_f64) {
                    if min.is_some_and(|lo| d < lo) {
                        errors.push(format!("Variable {}: default < min", name));
                    }
                    if max.is_some_and(|hi| d > hi) {
                        errors.push(format!("Variable {}: default > max", name));
                    }
                }
                let allowed = parse_enum(name, obj.get("enum"), &mut errors, |v| v.as_number().cloned());
                VariableKind::Number {
                    default,
                    min,
                    max,
                    allowed,
                }
            }
            "boolean" => VariableKind::Boolean {
                default: match default {
                    None => None,
                    Some(Value::Bool(b)) => Some(*b),
                    Some(_) => {
                        errors.push(format!("Variable {}: default must be a boolean", name));
                        None
                    }
                },
            },
            "array" => VariableKind::Array {
                default: match default {
                    None => None,
                    Some(Value::Array(items)) => Some(items.clone()),
                    Some(_) => {
                        errors.push(format!("Variable {}: default must be an array", name));
                        None
                    }
                },
            },
            _ => VariableKind::Object {
                default: match default {
                    None => None,
                    Some(Value::Object(map)) => Some(map.clone()),
                    Some(_) => {
                        errors.push(format!("Variable {}: default must be an object", name));
                        None
                    }
                },
            },
        };

        if errors.is_empty() {
            Ok(Self { kind, description })
        } else {
            Err(errors)
        }
    }

    /// Loose JSON form, the inverse of [`VariableDefinition::from_json`].
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn parse_bound(name: &str, field: &str, raw: Option<&Value>, errors: &mut Vec<String>) -> Option<f64> {
    match raw {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => {
            errors.push(format!("Variable {}: {} must be a number", name, field));
            None
        }
    }
}

fn parse_enum<T>(
    name: &str,
    raw: Option<&Value>,
    errors: &mut Vec<String>,
    item: impl Fn(&Value) -> Option<T>,
) -> Option<Vec<T>> {
    match raw {
        None | Some(Value::Null) => None,
        Some(Value::Array(values)) => {
            let parsed: Option<Vec<T>> = values.iter().map(&item).collect();
            if parsed.is_none() {
                errors.push(format!("Variable {}: enum values do not match its type", name));
            }
            parsed
        }
        Some(_) => {
            errors.push(format!("Variable {}: enum must be a list", name));
            None
        }
    }
}

/// Parse a whole loose variable mapping. Names are not checked here.
pub fn parse_variables(raw: &IndexMap<String, Value>) -> (VariableSchema, Vec<String>) {
    let mut schema = VariableSchema::new();
    let mut errors = Vec::new();
    for (name, def) in raw {
        match VariableDefinition::from_json(name, def) {
            Ok(parsed) => {
                schema.insert(name.clone(), parsed);
            }
            Err(errs) => errors.extend(errs),
        }
    }
    (schema, errors)
}

/// Default values declared in a schema.
pub fn schema_defaults(schema: &VariableSchema) -> Map<String, Value> {
    schema
        .iter()
        .filter_map(|(name, def)| def.default_value().map(|v| (name.clone(), v)))
        .collect()
}

/// Generation hints carried by a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Recommended provider id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Recommended model id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A stored, parameterized prompt pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(default)]
    pub variables: VariableSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub provider_settings: ProviderSettings,
    #[serde(default)]
    pub validation_mode: ValidationMode,
    #[serde(default)]
    pub validation_rules: Map<String, Value>,
    #[serde(default = "default_public")]
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Whether generations should request and parse JSON output.
    pub fn has_output_schema(&self) -> bool {
        has_schema(self.output_schema.as_ref())
    }

    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.is_public || self.owner_id == user_id
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

/// An empty object or null schema counts as "no schema".
pub fn has_schema(schema: Option<&Value>) -> bool {
    match schema {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

fn default_public() -> bool {
    true
}

/// Caller-supplied template fields, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt: String,
    #[serde(default)]
    pub variables: IndexMap<String, Value>,
    #[serde(default)]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub provider_settings: ProviderSettings,
    #[serde(default)]
    pub validation_mode: ValidationMode,
    #[serde(default)]
    pub validation_rules: Map<String, Value>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

impl TemplateDraft {
    /// Loose view of an existing template, used to re-validate on update.
    pub fn from_template(template: &Template) -> Self {
        Self {
            name: template.name.clone(),
            description: template.description.clone(),
            category: template.category.clone(),
            tags: template.tags.clone(),
            system_prompt: template.system_prompt.clone(),
            user_prompt: template.user_prompt.clone(),
            variables: template
                .variables
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
            output_schema: template.output_schema.clone(),
            provider_settings: template.provider_settings.clone(),
            validation_mode: template.validation_mode,
            validation_rules: template.validation_rules.clone(),
            is_public: template.is_public,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_number_definition() {
        let def = VariableDefinition::from_json(
            "count",
            &json!({"type": "number", "default": 5, "min": 1, "max": 10, "description": "How many"}),
        )
        .unwrap();
        assert_eq!(def.type_name(), "number");
        assert_eq!(def.default_value(), Some(json!(5)));
        assert_eq!(def.description.as_deref(), Some("How many"));
    }

    #[test]
    fn test_parse_reports_all_number_problems() {
        let errors = VariableDefinition::from_json(
            "count",
            &json!({"type": "number", "default": 50, "min": 10, "max": 1}),
        )
        .unwrap_err();
        assert_eq!(
            errors,
            vec![
                "Variable count: min > max".to_string(),
                "Variable count: default > max".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_type_errors() {
        assert_eq!(
            VariableDefinition::from_json("x", &json!({"default": 1})).unwrap_err(),
            vec!["Variable x missing 'type' field".to_string()]
        );
        assert_eq!(
            VariableDefinition::from_json("x", &json!({"type": "date"})).unwrap_err(),
            vec!["Variable x has invalid type: date".to_string()]
        );
        assert!(VariableDefinition::from_json("x", &json!("string")).is_err());
        assert!(VariableDefinition::from_json("x", &json!({"type": "boolean", "default": "yes"})).is_err());
    }

    #[test]
    fn test_string_enum_default_must_be_member() {
        let errors = VariableDefinition::from_json(
            "tone",
            &json!({"type": "string", "enum": ["formal", "casual"], "default": "angry"}),
        )
        .unwrap_err();
        assert_eq!(errors, vec!["Variable tone: default not in enum".to_string()]);
    }

    #[test]
    fn test_loose_json_round_trip() {
        let raw = json!({"type": "string", "default": "AI", "enum": ["AI", "ML"]});
        let def = VariableDefinition::from_json("topic", &raw).unwrap();
        assert_eq!(def.to_json(), raw);
        let back: VariableDefinition = serde_json::from_value(raw).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn test_schema_defaults_and_order() {
        let raw: IndexMap<String, Value> = serde_json::from_value(json!({
            "topic": {"type": "string"},
            "count": {"type": "number", "default": 5},
            "formal": {"type": "boolean", "default": false}
        }))
        .unwrap();
        let (schema, errors) = parse_variables(&raw);
        assert!(errors.is_empty());
        assert_eq!(
            schema.keys().cloned().collect::<Vec<_>>(),
            vec!["topic", "count", "formal"]
        );
        let defaults = schema_defaults(&schema);
        assert_eq!(defaults.get("count"), Some(&json!(5)));
        assert_eq!(defaults.get("formal"), Some(&json!(false)));
        assert!(!defaults.contains_key("topic"));
    }

    #[test]
    fn test_has_schema() {
        assert!(!has_schema(None));
        assert!(!has_schema(Some(&json!({}))));
        assert!(!has_schema(Some(&Value::Null)));
        assert!(has_schema(Some(&json!({"type": "object"}))));
    }

    #[test]
    fn test_validation_mode_serde() {
        assert_eq!(serde_json::to_value(ValidationMode::None).unwrap(), json!("none"));
        let mode: ValidationMode = serde_json::from_value(json!("custom")).unwrap();
        assert_eq!(mode, ValidationMode::Custom);
        assert_eq!(ValidationMode::default(), ValidationMode::Strict);
    }
}
