//! Prompt templates: data model, rendering and validation.
//!
//! A [`Template`] pairs a system and user prompt written in a Jinja-style
//! mini-language with a schema of declared variables. [`Renderer`] renders
//! prompts with strict-undefined semantics; [`Validator`] checks template
//! structure and per-request variable values.
//!
//! ```
//! use serde_json::json;
//! use templates::Renderer;
//!
//! let renderer = Renderer::new();
//! let vars = json!({"n": 3}).as_object().cloned().unwrap_or_default();
//! let text = renderer.render("{{ n | number_to_words }} {{ 'box' | pluralize(n) }}", &vars).unwrap();
//! assert_eq!(text, "three boxes");
//! ```

pub mod error;
pub mod filters;
pub mod model;
pub mod renderer;
pub mod validator;

pub use error::{RenderError, Result, TemplateError};
pub use model::{
    has_schema, parse_variables, schema_defaults, ProviderSettings, Template, TemplateDraft,
    ValidationMode, VariableDefinition, VariableKind, VariableSchema, INJECTED_VARIABLES,
};
pub use renderer::{merge_defaults, RenderedPrompt, Renderer};
pub use validator::{validate_variables, ValidationReport, Validator};
