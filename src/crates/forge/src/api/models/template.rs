//! Template API models

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use templates::{Template, TemplateDraft};

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::validation::{validate_not_empty, validate_pagination};
use crate::db::{TemplateFilter, DEFAULT_LIMIT, MAX_LIMIT};
use crate::services::PreviewSource;

/// A template together with the non-fatal findings of its validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateWithWarnings {
    pub template: Template,
    pub warnings: Vec<String>,
}

/// Query parameters for GET /api/v1/templates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateListQuery {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub is_public: Option<bool>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

impl TemplateListQuery {
    /// Build the store filter, scoped to `viewer`
    pub fn into_filter(self, viewer: &str) -> ApiResult<TemplateFilter> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        validate_pagination(limit, MAX_LIMIT)?;

        let mut filter = TemplateFilter::for_viewer(viewer);
        filter.category = self.category;
        filter.tag = self.tag;
        filter.is_public = self.is_public;
        filter.skip = self.skip.unwrap_or(0);
        filter.limit = limit;
        Ok(filter)
    }
}

/// Request body for POST /api/v1/templates/preview
///
/// Exactly one of `template_id` and `template` names what to render.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub template: Option<TemplateDraft>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl PreviewRequest {
    pub fn into_parts(self) -> ApiResult<(PreviewSource, Map<String, Value>)> {
        let source = match (self.template_id, self.template) {
            (Some(id), None) => {
                validate_not_empty(&id, "template_id")?;
                PreviewSource::Stored(id)
            }
            (None, Some(draft)) => PreviewSource::Draft(Box::new(draft)),
            _ => {
                return Err(ApiError::BadRequest(
                    "Either template_id or template must be provided".to_string(),
                ))
            }
        };
        Ok((source, self.variables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_query_defaults() {
        let filter = TemplateListQuery::default().into_filter("alice").unwrap();
        assert_eq!(filter.viewer, "alice");
        assert_eq!(filter.skip, 0);
        assert_eq!(filter.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_list_query_rejects_large_limit() {
        let query = TemplateListQuery {
            limit: Some(MAX_LIMIT + 1),
            ..Default::default()
        };
        assert!(query.into_filter("alice").is_err());
    }

    #[test]
    fn test_preview_requires_one_source() {
        let empty: PreviewRequest = serde_json::from_value(json!({"variables": {}})).unwrap();
        assert!(matches!(empty.into_parts(), Err(ApiError::BadRequest(_))));

        let both: PreviewRequest = serde_json::from_value(json!({
            "template_id": "t1",
            "template": {"name": "x", "user_prompt": "hi"}
        }))
        .unwrap();
        assert!(both.into_parts().is_err());

        let stored: PreviewRequest =
            serde_json::from_value(json!({"template_id": "t1", "variables": {"a": 1}})).unwrap();
        let (source, vars) = stored.into_parts().unwrap();
        assert!(matches!(source, PreviewSource::Stored(id) if id == "t1"));
        assert_eq!(vars["a"], json!(1));
    }
}
