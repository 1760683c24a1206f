//! Variable and template-structure validation.
//!
//! Two independent checks live here. [`validate_variables`] runs per
//! generation request against supplied values. [`Validator::validate_template`]
//! runs when a template is created or edited. Prompts that reference names
//! missing from the variable schema only ever produce warnings.

use crate::error::{Result, TemplateError};
use crate::model::{
    parse_variables, Template, TemplateDraft, ValidationMode, VariableKind, VariableSchema,
    INJECTED_VARIABLES,
};
use crate::renderer::{merge_defaults, Renderer};
use chrono::{DateTime, Utc};
use jsonschema::{Draft, JSONSchema};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// JSON types an output schema may declare at its root.
pub const SCHEMA_TYPES: &[&str] = &["object", "array", "string", "number", "integer", "boolean", "null"];

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn ok() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Convert into a result, keeping the warnings on success.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.valid {
            Ok(self.warnings)
        } else {
            Err(TemplateError::Invalid(self.errors))
        }
    }
}

/// Check supplied values against declared definitions.
///
/// `rules` is only consulted in [`ValidationMode::Custom`]. Its shape is
/// `{"required": [name, ...], "fields": {name: {min_length, max_length,
/// pattern, min, max, type, enum}}}`; any absent rule is not checked.
pub fn validate_variables(
    values: &Map<String, Value>,
    schema: &VariableSchema,
    mode: ValidationMode,
    rules: &Map<String, Value>,
) -> ValidationReport {
    let errors = match mode {
        ValidationMode::None => Vec::new(),
        ValidationMode::Strict => strict_errors(values, schema),
        ValidationMode::Custom => custom_errors(&merge_defaults(schema, values), rules),
    };
    ValidationReport::new(errors, Vec::new())
}

fn strict_errors(values: &Map<String, Value>, schema: &VariableSchema) -> Vec<String> {
    let mut errors = Vec::new();
    for (name, def) in schema {
        let Some(value) = values.get(name) else {
            if !def.has_default() {
                errors.push(format!("missing required variable `{}`", name));
            }
            continue;
        };

        if !def.accepts_type(value) {
            errors.push(format!(
                "variable `{}` must be of type {}, got {}",
                name,
                def.type_name(),
                json_type(value)
            ));
            continue;
        }

        match &def.kind {
            VariableKind::Number { min, max, allowed, .. } => {
                let n = value.as_f64().unwrap_or_default();
                if let Some(lo) = min {
                    if n < *lo {
                        errors.push(format!("variable `{}` must be >= {}", name, lo));
                    }
                }
                if let Some(hi) = max {
                    if n > *hi {
                        errors.push(format!("variable `{}` must be <= {}", name, hi));
                    }
                }
                if let Some(allowed) = allowed {
                    if !allowed.iter().any(|a| a.as_f64() == Some(n)) {
                        errors.push(enum_error(name, allowed.iter().map(|a| a.to_string())));
                    }
                }
            }
            VariableKind::String {
                allowed: Some(allowed),
                ..
            } => {
                if !allowed.iter().any(|a| Some(a.as_str()) == value.as_str()) {
                    errors.push(enum_error(name, allowed.iter().cloned()));
                }
            }
            _ => {}
        }
    }
    errors
}

fn custom_errors(values: &Map<String, Value>, rules: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(required) = rules.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !values.contains_key(name) {
                errors.push(format!("missing required variable `{}`", name));
            }
        }
    }

    let Some(fields) = rules.get("fields").and_then(Value::as_object) else {
        return errors;
    };
    for (name, rule) in fields {
        let (Some(value), Some(rule)) = (values.get(name), rule.as_object()) else {
            continue;
        };

        if let Some(expected) = rule.get("type").and_then(Value::as_str) {
            if json_type(value) != expected {
                errors.push(format!(
                    "variable `{}` must be of type {}, got {}",
                    name,
                    expected,
                    json_type(value)
                ));
                continue;
            }
        }

        if let Some(text) = value.as_str() {
            let len = text.chars().count() as u64;
            if let Some(min) = rule.get("min_length").and_then(Value::as_u64) {
                if len < min {
                    errors.push(format!("variable `{}` must be at least {} characters", name, min));
                }
            }
            if let Some(max) = rule.get("max_length").and_then(Value::as_u64) {
                if len > max {
                    errors.push(format!("variable `{}` must be at most {} characters", name, max));
                }
            }
            if let Some(pattern) = rule.get("pattern").and_then(Value::as_str) {
                match Regex::new(pattern) {
                    Ok(re) if !re.is_match(text) => {
                        errors.push(format!("variable `{}` does not match pattern {}", name, pattern))
                    }
                    Ok(_) => {}
                    Err(_) => errors.push(format!("invalid pattern rule for `{}`: {}", name, pattern)),
                }
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(lo) = rule.get("min").and_then(Value::as_f64) {
                if n < lo {
                    errors.push(format!("variable `{}` must be >= {}", name, lo));
                }
            }
            if let Some(hi) = rule.get("max").and_then(Value::as_f64) {
                if n > hi {
                    errors.push(format!("variable `{}` must be <= {}", name, hi));
                }
            }
        }

        if let Some(allowed) = rule.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                errors.push(enum_error(name, allowed.iter().map(display_value)));
            }
        }
    }
    errors
}

fn enum_error(name: &str, allowed: impl Iterator<Item = String>) -> String {
    format!(
        "variable `{}` must be one of: {}",
        name,
        allowed.collect::<Vec<_>>().join(", ")
    )
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

static VARIABLE_NAME_REGEX: OnceLock<Regex> = OnceLock::new();

/// `^[A-Za-z_][A-Za-z0-9_]*$`
pub fn is_valid_variable_name(name: &str) -> bool {
    VARIABLE_NAME_REGEX
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
        .is_match(name)
}

/// Errors for a candidate output schema.
pub fn output_schema_errors(schema: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    if let Err(err) = JSONSchema::options().with_draft(Draft::Draft7).compile(schema) {
        errors.push(format!("Invalid JSON schema: {}", err));
    }
    match schema.get("type") {
        Some(Value::String(t)) if !SCHEMA_TYPES.contains(&t.as_str()) => {
            errors.push(format!("Invalid schema type: {}", t));
        }
        Some(Value::Array(types)) => {
            for t in types {
                if !t.as_str().is_some_and(|t| SCHEMA_TYPES.contains(&t)) {
                    errors.push(format!("Invalid schema type: {}", display_value(t)));
                }
            }
        }
        Some(Value::String(_)) | None => {}
        Some(other) => errors.push(format!("Invalid schema type: {}", other)),
    }
    errors
}

/// Template-level validator. Holds a renderer for syntax checks and static
/// variable extraction.
#[derive(Default)]
pub struct Validator {
    renderer: Renderer,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_renderer(renderer: Renderer) -> Self {
        Self { renderer }
    }

    /// Names referenced by either prompt but absent from `declared`.
    /// Injected per-item names are never reported.
    pub fn undeclared_variables(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        declared: impl Fn(&str) -> bool,
    ) -> BTreeSet<String> {
        let mut used = self.renderer.extract_variables(system_prompt);
        used.extend(self.renderer.extract_variables(user_prompt));
        used.into_iter()
            .filter(|name| !declared(name.as_str()) && !INJECTED_VARIABLES.contains(&name.as_str()))
            .collect()
    }

    /// Warning text for prompt references missing from the schema.
    pub fn prompt_warnings(&self, system_prompt: &str, user_prompt: &str, schema: &VariableSchema) -> Vec<String> {
        undeclared_warning(self.undeclared_variables(system_prompt, user_prompt, |n| schema.contains_key(n)))
    }

    /// Structural validation of a template draft.
    pub fn validate_template(&self, draft: &TemplateDraft) -> ValidationReport {
        let mut errors = Vec::new();

        for (field, prompt) in [("system_prompt", &draft.system_prompt), ("user_prompt", &draft.user_prompt)] {
            if let Err(err) = self.renderer.check_syntax(prompt) {
                errors.push(format!("Invalid template syntax in {}: {}", field, err));
            }
        }

        let warnings = undeclared_warning(self.undeclared_variables(
            &draft.system_prompt,
            &draft.user_prompt,
            |n| draft.variables.contains_key(n),
        ));

        if let Some(schema) = draft.output_schema.as_ref().filter(|s| !s.is_null()) {
            errors.extend(output_schema_errors(schema));
        }

        for name in draft.variables.keys() {
            if !is_valid_variable_name(name) {
                errors.push(format!("Invalid variable name: {}", name));
            }
        }
        let (_, variable_errors) = parse_variables(&draft.variables);
        errors.extend(variable_errors);

        ValidationReport::new(errors, warnings)
    }

    /// Per-request checks for a generation against `template`. Warnings are
    /// reported regardless of the template's validation mode.
    pub fn validate_generation(&self, template: &Template, values: &Map<String, Value>) -> ValidationReport {
        let mut report = validate_variables(
            values,
            &template.variables,
            template.validation_mode,
            &template.validation_rules,
        );
        report.warnings = self.prompt_warnings(&template.system_prompt, &template.user_prompt, &template.variables);
        report
    }

    /// Validate a draft and materialize it as a stored template.
    /// Returns the template together with any warnings.
    pub fn build_template(
        &self,
        draft: TemplateDraft,
        id: impl Into<String>,
        owner_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(Template, Vec<String>)> {
        let warnings = self.validate_template(&draft).into_result()?;
        if !warnings.is_empty() {
            tracing::debug!(template = %draft.name, ?warnings, "template references undeclared variables");
        }
        let (variables, errors) = parse_variables(&draft.variables);
        if !errors.is_empty() {
            return Err(TemplateError::Invalid(errors));
        }
        let template = Template {
            id: id.into(),
            owner_id: owner_id.into(),
            name: draft.name,
            description: draft.description,
            category: draft.category,
            tags: draft.tags,
            system_prompt: draft.system_prompt,
            user_prompt: draft.user_prompt,
            variables,
            output_schema: draft.output_schema.filter(|s| !s.is_null()),
            provider_settings: draft.provider_settings,
            validation_mode: draft.validation_mode,
            validation_rules: draft.validation_rules,
            is_public: draft.is_public,
            created_at: now,
            updated_at: now,
        };
        Ok((template, warnings))
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }
}

fn undeclared_warning(names: BTreeSet<String>) -> Vec<String> {
    if names.is_empty() {
        Vec::new()
    } else {
        vec![format!(
            "Undefined variables in prompts: {}",
            names.into_iter().collect::<Vec<_>>().join(", ")
        )]
    }
}
