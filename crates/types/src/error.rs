use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{borrow::Cow, error::Error as StdError};
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;

/// Structured description of a failed compilation or decode, suitable for
/// returning to the caller as JSON.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message.
    #[schema(example = "Window size must be positive.")]
    pub message: String,
    /// Error code is a string that specifies this error type.
    #[schema(example = "WatermarkRequired")]
    pub error_code: Cow<'static, str>,
    /// Detailed error metadata.
    /// The contents of this field is determined by `error_code`.
    #[schema(value_type=Object)]
    pub details: JsonValue,
}

/// Error trait which planner errors implement such that they
/// can be transformed to a complete JSON error response.
pub trait DetailedError: StdError + Serialize {
    /// Identifying name of the error.
    fn error_code(&self) -> Cow<'static, str>;
}

impl<E> From<&E> for ErrorResponse
where
    E: DetailedError,
{
    fn from(error: &E) -> ErrorResponse {
        Self::from_error(error)
    }
}

impl ErrorResponse {
    pub fn from_error<E>(error: &E) -> Self
    where
        E: DetailedError,
    {
        let response = Self::from_error_nolog(error);
        debug!(
            "[planner error] {}: {}",
            response.error_code, response.message
        );
        response
    }

    pub fn from_error_nolog<E>(error: &E) -> Self
    where
        E: DetailedError,
    {
        let message = error.to_string();
        let error_code = error.error_code();
        let details = serde_json::to_value(error).unwrap_or_else(|e| {
            JsonValue::String(format!("Failed to serialize error. Details: '{e}'"))
        });

        Self {
            message,
            error_code,
            details,
        }
    }
}

/// An invalid window specification or compiler configuration.
#[derive(Clone, Debug, Error, Serialize, PartialEq, Eq)]
pub enum ConfigError {
    /// The descriptor column of the window is empty.
    #[error("Window time attribute must name a column.")]
    EmptyTimeAttribute,

    /// Window `size`, `slide` or `step` is zero.
    #[error("Window {parameter} must be positive.")]
    NonPositive { parameter: &'static str },

    /// The window kind requires a parameter that was not supplied.
    #[error("{kind} window requires a {parameter}.")]
    MissingParameter {
        kind: &'static str,
        parameter: &'static str,
    },

    /// The window kind does not accept a parameter that was supplied.
    #[error("{kind} window does not accept a {parameter}.")]
    UnexpectedParameter {
        kind: &'static str,
        parameter: &'static str,
    },

    /// Cumulate windows grow by `step` up to `size`.
    #[error("Cumulate window size ({size_millis} ms) must be an integral multiple of its step ({step_millis} ms).")]
    SizeNotMultipleOfStep { size_millis: i64, step_millis: i64 },

    /// The offset must be smaller than the window's slide, step or size.
    #[error("Window offset ({offset_millis} ms) must be smaller than {unit} ({unit_millis} ms).")]
    OffsetOutOfRange {
        offset_millis: i64,
        unit: &'static str,
        unit_millis: i64,
    },

    /// Rows would fall into more windows than the planner supports.
    #[error("Window assigns each row to up to {windows} windows; at most {limit} are supported.")]
    TooManyWindowsPerRow { windows: u64, limit: u64 },

    /// The plan stores durations in whole milliseconds.
    #[error("Window {parameter} must be a whole number of milliseconds that fits in 64 bits.")]
    NotWholeMillis { parameter: &'static str },

    /// Distinct-aggregate splitting needs at least one bucket.
    #[error("Distinct aggregate split bucket count must be positive.")]
    ZeroBucketCount,

    /// Early firing was enabled without a firing interval.
    #[error("Early firing requires a positive delay.")]
    MissingEarlyFireDelay,

    /// Configuration option with an unknown key.
    #[error("Unknown configuration option '{key}'.")]
    UnknownOption { key: String },

    /// Configuration option with a value that does not parse.
    #[error("Invalid value '{value}' for configuration option '{key}': {reason}")]
    InvalidOption {
        key: String,
        value: String,
        reason: String,
    },

    /// Connector changelog mode string that does not parse.
    #[error("Invalid changelog mode '{0}': expected a comma-separated list of I, UB, UA and D.")]
    InvalidChangelogMode(String),

    /// Configuration document that does not parse.
    #[error("Unable to parse configuration: {0}")]
    Parse(String),
}

impl DetailedError for ConfigError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::EmptyTimeAttribute => Cow::from("EmptyTimeAttribute"),
            Self::NonPositive { .. } => Cow::from("NonPositiveWindowParameter"),
            Self::MissingParameter { .. } => Cow::from("MissingWindowParameter"),
            Self::UnexpectedParameter { .. } => Cow::from("UnexpectedWindowParameter"),
            Self::SizeNotMultipleOfStep { .. } => Cow::from("SizeNotMultipleOfStep"),
            Self::OffsetOutOfRange { .. } => Cow::from("OffsetOutOfRange"),
            Self::NotWholeMillis { .. } => Cow::from("NotWholeMillis"),
            Self::TooManyWindowsPerRow { .. } => Cow::from("TooManyWindowsPerRow"),
            Self::ZeroBucketCount => Cow::from("ZeroBucketCount"),
            Self::MissingEarlyFireDelay => Cow::from("MissingEarlyFireDelay"),
            Self::UnknownOption { .. } => Cow::from("UnknownOption"),
            Self::InvalidOption { .. } => Cow::from("InvalidOption"),
            Self::InvalidChangelogMode(_) => Cow::from("InvalidChangelogMode"),
            Self::Parse(_) => Cow::from("ConfigParseError"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_response() {
        let error = ConfigError::SizeNotMultipleOfStep {
            size_millis: 15_000,
            step_millis: 4_000,
        };
        let response = ErrorResponse::from_error_nolog(&error);
        assert_eq!(response.error_code, "SizeNotMultipleOfStep");
        assert_eq!(
            response.message,
            "Cumulate window size (15000 ms) must be an integral multiple of its step (4000 ms)."
        );
        assert_eq!(
            response.details,
            serde_json::json!({"SizeNotMultipleOfStep": {"size_millis": 15000, "step_millis": 4000}})
        );
    }
}
