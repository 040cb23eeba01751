use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type Id = String;

/// Top-level request member holding the operation objects
pub const ATOMIC_OPERATIONS: &str = "atomic:operations";

/// Top-level response member holding the operation results
pub const ATOMIC_RESULTS: &str = "atomic:results";

/// Extension URI negotiated through the `ext` media type parameter
pub const ATOMIC_EXTENSION: &str = "https://jsonapi.org/ext/atomic";

pub const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

pub const ATOMIC_CONTENT_TYPE: &str =
    "application/vnd.api+json;ext=\"https://jsonapi.org/ext/atomic\"";

/// Resource types starting with this marker are bulk collections
pub const BULK_TYPE_PREFIX: &str = "bulk";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl DataType {
    /// Whether a JSON value is acceptable for an attribute of this type.
    /// `null` is handled by the caller (required vs optional).
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            DataType::String => value.is_string(),
            DataType::Number => value.is_number(),
            DataType::Boolean => value.is_boolean(),
            DataType::Object => value.is_object(),
            DataType::Array => value.is_array(),
        }
    }
}

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

pub fn is_bulk_type(resource_type: &str) -> bool {
    resource_type.starts_with(BULK_TYPE_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_type_matches() {
        assert!(DataType::String.matches(&json!("x")));
        assert!(!DataType::String.matches(&json!(1)));
        assert!(DataType::Number.matches(&json!(1.5)));
        assert!(DataType::Boolean.matches(&json!(false)));
        assert!(DataType::Object.matches(&json!({})));
        assert!(DataType::Array.matches(&json!([])));
        assert!(!DataType::Array.matches(&json!(null)));
    }

    #[test]
    fn test_bulk_type_marker() {
        assert!(is_bulk_type("bulkArticles"));
        assert!(!is_bulk_type("articles"));
    }
}
