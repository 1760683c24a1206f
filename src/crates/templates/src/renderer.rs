//! Prompt rendering with strict-undefined semantics.
//!
//! Every variable a prompt references must be supplied or filled from a
//! definition default; anything else is a [`RenderError`], never a blank.

use crate::error::RenderError;
use crate::filters;
use crate::model::{schema_defaults, Template, VariableSchema};
use minijinja::{Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A rendered system/user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
}

impl RenderedPrompt {
    /// Diagnostic form stored on a job after its first item.
    pub fn diagnostic(&self) -> String {
        format!("System: {}\n\nUser: {}", self.system_prompt, self.user_prompt)
    }
}

/// Caller values layered over definition defaults; caller values win.
pub fn merge_defaults(schema: &VariableSchema, values: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = schema_defaults(schema);
    for (name, value) in values {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// Renders prompts. Cheap to share; construct once and reuse.
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_filter("capitalize_first", filters::capitalize_first_filter);
        env.add_filter("number_to_words", filters::number_to_words_filter);
        env.add_filter("pluralize", filters::pluralize_filter);
        Self { env }
    }

    /// Render one template string against exactly the given variables.
    pub fn render(&self, source: &str, variables: &Map<String, Value>) -> Result<String, RenderError> {
        Ok(self.env.render_str(source, variables)?)
    }

    /// Render after merging definition defaults under `variables`.
    pub fn render_with_defaults(
        &self,
        source: &str,
        variables: &Map<String, Value>,
        schema: &VariableSchema,
    ) -> Result<String, RenderError> {
        self.render(source, &merge_defaults(schema, variables))
    }

    /// Render both prompts of a template.
    pub fn render_prompt(
        &self,
        template: &Template,
        variables: &Map<String, Value>,
    ) -> Result<RenderedPrompt, RenderError> {
        self.render_pair(
            &template.system_prompt,
            &template.user_prompt,
            &template.variables,
            variables,
        )
    }

    /// Render a prompt pair that is not (yet) a stored template.
    pub fn render_pair(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &VariableSchema,
        variables: &Map<String, Value>,
    ) -> Result<RenderedPrompt, RenderError> {
        let merged = merge_defaults(schema, variables);
        Ok(RenderedPrompt {
            system_prompt: self.render(system_prompt, &merged)?,
            user_prompt: self.render(user_prompt, &merged)?,
        })
    }

    /// Check that `source` parses.
    pub fn check_syntax(&self, source: &str) -> Result<(), RenderError> {
        self.env.template_from_str(source)?;
        Ok(())
    }

    /// Free variable names referenced by `source`, found without evaluating
    /// it. Loop and `set` bindings are not free. Unparseable input yields an
    /// empty set.
    pub fn extract_variables(&self, source: &str) -> BTreeSet<String> {
        match self.env.template_from_str(source) {
            Ok(template) => template.undeclared_variables(false).into_iter().collect(),
            Err(_) => BTreeSet::new(),
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
