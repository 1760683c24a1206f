//! Request validation helpers

use crate::api::error::{ApiError, ApiResult};

/// Validate that a required string field is not blank
pub fn validate_not_empty(value: &str, field_name: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::ValidationError(format!("{} cannot be empty", field_name)));
    }
    Ok(())
}

/// Validate a page size against the allowed maximum
pub fn validate_pagination(limit: u32, max_limit: u32) -> ApiResult<()> {
    if limit == 0 {
        return Err(ApiError::ValidationError("limit must be greater than 0".to_string()));
    }
    if limit > max_limit {
        return Err(ApiError::ValidationError(format!(
            "limit cannot exceed {}",
            max_limit
        )));
    }
    Ok(())
}
