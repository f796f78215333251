use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for widget assembly operations.
pub type WidgetResult<T> = Result<T, WidgetError>;

/// Errors surfaced by the widget assembly pipeline.
///
/// Display strings are user-visible and never carry query text or store
/// responses; transport details stay in the `detail` fields for logging.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WidgetError {
    #[error("widget definition '{widget_id}' not found")]
    DefinitionNotFound { widget_id: String },
    #[error("widget definition '{widget_id}' is invalid: {reason}")]
    DefinitionInvalid { widget_id: String, reason: String },
    #[error("placeholder '{name}' expected {expected} but got {actual}")]
    PlaceholderTypeMismatch {
        name: String,
        expected: &'static str,
        actual: String,
    },
    #[error("placeholder '{name}' has no binding")]
    PlaceholderUnbound { name: String },
    #[error("query template '{query}' did not render to valid JSON")]
    QueryTemplateInvalid { query: String },
    #[error("query key '{key}' is missing from raw results")]
    QueryKeyMissing { key: String },
    #[error("query '{key}' failed in the analytics store")]
    QueryFailed { key: String },
    #[error("spec key '{spec_key}' is not handled by '{processor}'")]
    SpecKeyUnknown { processor: String, spec_key: String },
    #[error("post-processor '{name}' is not registered")]
    PostProcessorUnknown { name: String },
    #[error("{region} spec #{index} produced {actual}, expected {expected}")]
    RegionShapeMismatch {
        region: &'static str,
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("analytics store request failed")]
    StoreTransport { detail: String },
    #[error("function '{name}' failed: {message}")]
    Function { name: String, message: String },
    #[error("{service} request failed")]
    ServiceUnavailable {
        service: &'static str,
        detail: String,
    },
    #[error("request cancelled")]
    Cancelled,
    #[error("external call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl WidgetError {
    /// Stable snake_case tag exposed to API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DefinitionNotFound { .. } => "definition_not_found",
            Self::DefinitionInvalid { .. } => "definition_invalid",
            Self::PlaceholderTypeMismatch { .. } => "placeholder_type_mismatch",
            Self::PlaceholderUnbound { .. } => "placeholder_unbound",
            Self::QueryTemplateInvalid { .. } => "query_template_invalid",
            Self::QueryKeyMissing { .. } => "query_key_missing",
            Self::QueryFailed { .. } => "query_failed",
            Self::SpecKeyUnknown { .. } => "spec_key_unknown",
            Self::PostProcessorUnknown { .. } => "post_processor_unknown",
            Self::RegionShapeMismatch { .. } => "region_shape_mismatch",
            Self::StoreTransport { .. } => "store_transport_error",
            Self::Function { .. } => "function_error",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Cancelled => "cancelled",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// Returns true when the error is confined to one region rather than the
    /// whole request. Transport layers may still choose to fail the request.
    pub fn is_region_scoped(&self) -> bool {
        matches!(
            self,
            Self::QueryKeyMissing { .. } | Self::QueryFailed { .. }
        )
    }

    /// Builds the wire error object.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }

    pub fn spec_key_unknown(processor: &str, spec_key: &str) -> Self {
        Self::SpecKeyUnknown {
            processor: processor.to_string(),
            spec_key: spec_key.to_string(),
        }
    }
}

/// Error object returned in place of a widget payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
