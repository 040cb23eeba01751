use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Machine-readable failure kinds surfaced in the `id` member of an error object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingOperationObjects,
    InvalidOperationObjects,
    MissingOperationCode,
    NotImplemented,
    MissingId,
    MultipleIdFields,
    MissingType,
    MissingRefAttribute,
    MissingRelationshipNaming,
    MissingPrimaryData,
    InvalidPrimaryDataType,
    InvalidOperationMetaObject,
    InvalidOperationIncludeValue,
    MissingHrefAttribute,
    UnknownOperationCode,
    UnknownLid,
    ObjectDoesNotExist,
    InvalidAttribute,
    InvalidRelationship,
    UnsupportedOperation,
    InvalidIncludePath,
    InvalidJson,
    UnsupportedMediaType,
    InternalError,
}

impl ErrorKind {
    pub fn id(&self) -> &'static str {
        match self {
            ErrorKind::MissingOperationObjects => "missing-operation-objects",
            ErrorKind::InvalidOperationObjects => "invalid-operation-objects",
            ErrorKind::MissingOperationCode => "missing-operation-code",
            ErrorKind::NotImplemented => "not-implemented",
            ErrorKind::MissingId => "missing-id",
            ErrorKind::MultipleIdFields => "multiple-id-fields",
            ErrorKind::MissingType => "missing-type",
            ErrorKind::MissingRefAttribute => "missing-ref-attribute",
            ErrorKind::MissingRelationshipNaming => "missing-relationship-naming",
            ErrorKind::MissingPrimaryData => "missing-primary-data",
            ErrorKind::InvalidPrimaryDataType => "invalid-primary-data-type",
            ErrorKind::InvalidOperationMetaObject => "invalid-operation-meta-object",
            ErrorKind::InvalidOperationIncludeValue => "invalid-operation-include-value",
            ErrorKind::MissingHrefAttribute => "missing-href-attribute",
            ErrorKind::UnknownOperationCode => "unknown-operation-code",
            ErrorKind::UnknownLid => "unknown-lid",
            ErrorKind::ObjectDoesNotExist => "object-does-not-exist",
            ErrorKind::InvalidAttribute => "invalid-attribute",
            ErrorKind::InvalidRelationship => "invalid-relationship",
            ErrorKind::UnsupportedOperation => "unsupported-operation",
            ErrorKind::InvalidIncludePath => "invalid-include-path",
            ErrorKind::InvalidJson => "invalid-json",
            ErrorKind::UnsupportedMediaType => "unsupported-media-type",
            ErrorKind::InternalError => "internal-error",
        }
    }

    /// HTTP status class: 400 for malformed documents, 422 for domain
    /// violations detected while executing.
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::UnknownLid
            | ErrorKind::ObjectDoesNotExist
            | ErrorKind::InvalidAttribute
            | ErrorKind::InvalidRelationship
            | ErrorKind::UnsupportedOperation => 422,
            ErrorKind::UnsupportedMediaType => 415,
            ErrorKind::InternalError => 500,
            _ => 400,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A protocol error: the first failure of a batch, reported with a pointer
/// into the original request document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail} (at {pointer})")]
pub struct AtomicError {
    pub kind: ErrorKind,
    pub detail: String,
    pub pointer: String,
}

impl AtomicError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            pointer: pointer.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject {
            id: self.kind.id().to_string(),
            detail: self.detail.clone(),
            source: ErrorSource {
                pointer: self.pointer.clone(),
            },
            status: self.status().to_string(),
        }
    }

    /// `{"errors": [ ... ]}`
    pub fn to_document(&self) -> Value {
        serde_json::json!({ "errors": [self.to_error_object()] })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorObject {
    pub id: String,
    pub detail: String,
    pub source: ErrorSource,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSource {
    pub pointer: String,
}
