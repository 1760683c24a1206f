//! Template management
//!
//! Owner-scoped CRUD over [`TemplateStore`], plus dry-run validation and
//! prompt previews. Templates are visible to their owner and, when public,
//! to everyone; only the owner may change or delete one.

use crate::db::{Page, TemplateFilter, TemplateStore};
use crate::error::{ForgeError, Result};
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use templates::{
    ProviderSettings, RenderedPrompt, Template, TemplateDraft, ValidationMode, ValidationReport,
    Validator,
};
use tracing::info;
use uuid::Uuid;

/// Partial template update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub user_prompt: Option<String>,
    #[serde(default)]
    pub variables: Option<IndexMap<String, Value>>,
    /// `null` clears the schema
    #[serde(default, deserialize_with = "deserialize_present")]
    pub output_schema: Option<Option<Value>>,
    #[serde(default)]
    pub provider_settings: Option<ProviderSettings>,
    #[serde(default)]
    pub validation_mode: Option<ValidationMode>,
    #[serde(default)]
    pub validation_rules: Option<Map<String, Value>>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

/// Distinguish an explicit `null` from an absent field.
fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<Value>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Some(if value.is_null() { None } else { Some(value) }))
}

impl TemplatePatch {
    /// Whether the patch touches fields that require re-validation.
    pub fn changes_structure(&self) -> bool {
        self.system_prompt.is_some()
            || self.user_prompt.is_some()
            || self.variables.is_some()
            || self.output_schema.is_some()
    }

    fn apply(self, draft: &mut TemplateDraft) {
        if let Some(v) = self.name {
            draft.name = v;
        }
        if let Some(v) = self.description {
            draft.description = v;
        }
        if let Some(v) = self.category {
            draft.category = v;
        }
        if let Some(v) = self.tags {
            draft.tags = v;
        }
        if let Some(v) = self.system_prompt {
            draft.system_prompt = v;
        }
        if let Some(v) = self.user_prompt {
            draft.user_prompt = v;
        }
        if let Some(v) = self.variables {
            draft.variables = v;
        }
        if let Some(v) = self.output_schema {
            draft.output_schema = v;
        }
        if let Some(v) = self.provider_settings {
            draft.provider_settings = v;
        }
        if let Some(v) = self.validation_mode {
            draft.validation_mode = v;
        }
        if let Some(v) = self.validation_rules {
            draft.validation_rules = v;
        }
        if let Some(v) = self.is_public {
            draft.is_public = v;
        }
    }

    fn apply_metadata(self, template: &mut Template) {
        if let Some(v) = self.name {
            template.name = v;
        }
        if let Some(v) = self.description {
            template.description = v;
        }
        if let Some(v) = self.category {
            template.category = v;
        }
        if let Some(v) = self.tags {
            template.tags = v;
        }
        if let Some(v) = self.provider_settings {
            template.provider_settings = v;
        }
        if let Some(v) = self.validation_mode {
            template.validation_mode = v;
        }
        if let Some(v) = self.validation_rules {
            template.validation_rules = v;
        }
        if let Some(v) = self.is_public {
            template.is_public = v;
        }
    }
}

/// What a preview renders: a stored template or an unsaved draft.
#[derive(Debug, Clone)]
pub enum PreviewSource {
    Stored(String),
    Draft(Box<TemplateDraft>),
}

/// Template CRUD, validation and preview.
pub struct TemplateService {
    store: Arc<dyn TemplateStore>,
    validator: Arc<Validator>,
}

impl TemplateService {
    pub fn new(store: Arc<dyn TemplateStore>, validator: Arc<Validator>) -> Self {
        Self { store, validator }
    }

    /// Validate and persist a new template owned by `owner`.
    pub async fn create(&self, owner: &str, draft: TemplateDraft) -> Result<(Template, Vec<String>)> {
        let id = Uuid::new_v4().to_string();
        let (template, warnings) = self.validator.build_template(draft, id, owner, Utc::now())?;
        self.store.insert_template(&template).await?;
        info!(template_id = %template.id, owner = %owner, "Template created");
        Ok((template, warnings))
    }

    /// Fetch a template the caller may see.
    pub async fn get(&self, caller: &str, id: &str) -> Result<Template> {
        match self.store.get_template(id).await? {
            Some(template) if template.is_visible_to(caller) => Ok(template),
            _ => Err(template_not_found(id)),
        }
    }

    async fn get_owned(&self, caller: &str, id: &str) -> Result<Template> {
        let template = self
            .store
            .get_template(id)
            .await?
            .ok_or_else(|| template_not_found(id))?;
        if !template.is_owned_by(caller) {
            return Err(ForgeError::AccessDenied(
                "Only the template owner can modify this template".to_string(),
            ));
        }
        Ok(template)
    }

    /// Apply a patch. Prompt, variable or schema changes re-run structural
    /// validation. Existing jobs keep their own snapshot.
    pub async fn update(
        &self,
        caller: &str,
        id: &str,
        patch: TemplatePatch,
    ) -> Result<(Template, Vec<String>)> {
        let existing = self.get_owned(caller, id).await?;
        let now = Utc::now();

        let (mut updated, warnings) = if patch.changes_structure() {
            let mut draft = TemplateDraft::from_template(&existing);
            patch.apply(&mut draft);
            self.validator
                .build_template(draft, existing.id.clone(), existing.owner_id.clone(), now)?
        } else {
            let mut template = existing.clone();
            patch.apply_metadata(&mut template);
            (template, Vec::new())
        };
        updated.created_at = existing.created_at;
        updated.updated_at = now;

        self.store.update_template(&updated).await?;
        info!(template_id = %id, "Template updated");
        Ok((updated, warnings))
    }

    pub async fn delete(&self, caller: &str, id: &str) -> Result<()> {
        self.get_owned(caller, id).await?;
        if !self.store.delete_template(id).await? {
            return Err(template_not_found(id));
        }
        info!(template_id = %id, "Template deleted");
        Ok(())
    }

    /// Caller's own templates plus public ones, newest-updated first.
    pub async fn list(&self, filter: &TemplateFilter) -> Result<Page<Template>> {
        Ok(self.store.list_templates(filter).await?)
    }

    /// Structural validation without persisting.
    pub fn validate(&self, draft: &TemplateDraft) -> ValidationReport {
        self.validator.validate_template(draft)
    }

    /// Render prompts with `variables` merged over definition defaults.
    pub async fn preview(
        &self,
        caller: &str,
        source: PreviewSource,
        variables: &Map<String, Value>,
    ) -> Result<RenderedPrompt> {
        let renderer = self.validator.renderer();
        match source {
            PreviewSource::Stored(id) => {
                let template = self.get(caller, &id).await?;
                Ok(renderer.render_prompt(&template, variables)?)
            }
            PreviewSource::Draft(draft) => {
                let (schema, errors) = templates::parse_variables(&draft.variables);
                if !errors.is_empty() {
                    return Err(ForgeError::ValidationFailed(errors));
                }
                Ok(renderer.render_pair(&draft.system_prompt, &draft.user_prompt, &schema, variables)?)
            }
        }
    }
}

fn template_not_found(id: &str) -> ForgeError {
    ForgeError::not_found(format!("Template {} not found", id))
}
