//! Structured errors returned to API consumers.
//!
//! These are values carried inside responses, never stack traces. They are
//! distinct from the Rust error types used to propagate failures internally.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a request-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorId {
    NoSolution,
    NoOrigin,
    NoDestination,
    NoOriginNorDestination,
    DateOutOfBounds,
    UnknownObject,
    BadFilter,
    ServiceUnavailable,
    InternalError,
}

impl ErrorId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorId::NoSolution => "no_solution",
            ErrorId::NoOrigin => "no_origin",
            ErrorId::NoDestination => "no_destination",
            ErrorId::NoOriginNorDestination => "no_origin_nor_destination",
            ErrorId::DateOutOfBounds => "date_out_of_bounds",
            ErrorId::UnknownObject => "unknown_object",
            ErrorId::BadFilter => "bad_filter",
            ErrorId::ServiceUnavailable => "service_unavailable",
            ErrorId::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error attached to a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub id: ErrorId,
    pub message: String,
}

impl ResponseError {
    pub fn new(id: ErrorId, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
        }
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.message)
    }
}
