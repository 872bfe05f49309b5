use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use sqlx::Error as SqlxError;
use std::io::Error as IoError;
use thiserror::Error;

use crate::model::Collection;
use crate::validation::FieldErrors;

pub const REMOTE_NOT_FOUND: &str = "REMOTE/NOT_FOUND";
pub const REMOTE_UNAVAILABLE: &str = "REMOTE/UNAVAILABLE";
pub const REMOTE_CONSTRAINT: &str = "REMOTE/CONSTRAINT";
pub const REMOTE_DECODE: &str = "REMOTE/DECODE";
pub const VALIDATION_FIELDS: &str = "VALIDATION/FIELDS";
pub const CACHE_NOT_FOUND: &str = "CACHE/NOT_FOUND";

/// A structured application error that can be serialized and surfaced to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppError {
    /// Machine readable error code.
    pub code: String,
    /// Human friendly message that can be shown directly to the user.
    pub message: String,
    /// Arbitrary key/value pairs that provide additional context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
    /// Optional nested cause that preserves the error chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<AppError>>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Default code used when an upstream error does not expose a specific code.
    pub const UNKNOWN_CODE: &'static str = "APP/UNKNOWN";
    /// Code used for errors created from free-form messages.
    pub const GENERIC_CODE: &'static str = "APP/GENERIC";

    /// Construct a new application error with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: HashMap::new(),
            cause: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    /// Adds a contextual key/value pair to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Extends the context map with additional key/value pairs.
    pub fn with_contexts<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.context
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the nested cause for the error.
    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.code == REMOTE_NOT_FOUND || self.code == CACHE_NOT_FOUND
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] {} ({:?})", self.code, self.message, self.context)
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<&str> for AppError {
    fn from(message: &str) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

impl From<String> for AppError {
    fn from(message: String) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

impl From<AnyhowError> for AppError {
    fn from(error: AnyhowError) -> Self {
        fn convert(err: &(dyn StdError + 'static)) -> AppError {
            if let Some(app) = err.downcast_ref::<AppError>() {
                return app.clone();
            }

            let mut root = AppError::new(AppError::UNKNOWN_CODE, err.to_string());
            if let Some(source) = err.source() {
                root.cause = Some(Box::new(convert(source)));
            }
            root
        }

        convert(error.as_ref())
    }
}

impl From<IoError> for AppError {
    fn from(error: IoError) -> Self {
        let code = format!("IO/{:?}", error.kind());
        let mut app_error = AppError::new(code, error.to_string());
        if let Some(os_code) = error.raw_os_error() {
            app_error = app_error.with_context("os_code", os_code.to_string());
        }
        app_error
    }
}

impl From<SerdeJsonError> for AppError {
    fn from(error: SerdeJsonError) -> Self {
        let code = if error.is_data() {
            "JSON/DATA"
        } else if error.is_syntax() {
            "JSON/SYNTAX"
        } else if error.is_eof() {
            "JSON/EOF"
        } else {
            "JSON/ERROR"
        };

        let mut app_error = AppError::new(code, error.to_string());
        let line = error.line();
        if line > 0 {
            app_error = app_error.with_context("line", line.to_string());
        }
        let column = error.column();
        if column > 0 {
            app_error = app_error.with_context("column", column.to_string());
        }
        app_error
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::RowNotFound => AppError::new(REMOTE_NOT_FOUND, "Record not found"),
            SqlxError::ColumnNotFound(name) => {
                AppError::new(REMOTE_DECODE, format!("Column not found: {name}"))
            }
            SqlxError::PoolTimedOut => AppError::new(
                REMOTE_UNAVAILABLE,
                "Timed out acquiring a database connection",
            ),
            SqlxError::PoolClosed => AppError::new(REMOTE_UNAVAILABLE, "Database pool is closed"),
            SqlxError::Io(err) => AppError::new(REMOTE_UNAVAILABLE, "Storage I/O failure")
                .with_cause(AppError::from(err)),
            SqlxError::Database(db) => {
                let mut app_error = AppError::new(REMOTE_CONSTRAINT, db.message().to_string());
                if let Some(code) = db.code() {
                    app_error = app_error.with_context("sqlite_code", code.to_string());
                }
                if let Some(constraint) = db.constraint() {
                    app_error = app_error.with_context("constraint", constraint.to_string());
                }
                app_error
            }
            SqlxError::ColumnDecode { index, source } => {
                AppError::new(REMOTE_DECODE, source.to_string())
                    .with_context("column_index", index.to_string())
            }
            SqlxError::Decode(decode_err) => AppError::new(REMOTE_DECODE, decode_err.to_string()),
            other => AppError::new("REMOTE/ERROR", other.to_string()),
        }
    }
}

/// Failures a collection session can surface to the caller.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("remote store error: {0}")]
    Remote(AppError),
    #[error("{collection} {id} is not in the local cache")]
    NotFound { collection: Collection, id: String },
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            SyncError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<FieldErrors> for SyncError {
    fn from(errors: FieldErrors) -> Self {
        SyncError::Validation(errors)
    }
}

impl From<AppError> for SyncError {
    fn from(error: AppError) -> Self {
        SyncError::Remote(error)
    }
}

impl From<SyncError> for AppError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::Validation(errors) => AppError::new(
                VALIDATION_FIELDS,
                "Some fields need attention before saving.",
            )
            .with_contexts(errors.iter().map(|(k, v)| (k.to_string(), v.to_string()))),
            SyncError::Remote(inner) => inner,
            SyncError::NotFound { collection, id } => {
                AppError::new(CACHE_NOT_FOUND, "That record no longer exists.")
                    .with_context("collection", collection.as_str())
                    .with_context("id", id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn builds_error_with_context_and_cause() {
        let error = AppError::new("TEST/CODE", "Something went wrong")
            .with_context("collection", "paints")
            .with_context("id", "1234")
            .with_cause(AppError::from("inner failure"));

        assert_eq!(error.code(), "TEST/CODE");
        assert_eq!(error.message(), "Something went wrong");
        assert_eq!(error.context().get("collection"), Some(&"paints".to_string()));
        assert_eq!(error.context().get("id"), Some(&"1234".to_string()));
        let cause = error.cause().expect("cause present");
        assert_eq!(cause.message(), "inner failure");
        assert_eq!(cause.code(), AppError::GENERIC_CODE);
    }

    #[test]
    fn converts_anyhow_error_chain_into_nested_causes() {
        let err = (|| -> anyhow::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
                .context("failed to save home")
        })()
        .unwrap_err();

        let app_error = AppError::from(err);
        assert_eq!(app_error.code(), AppError::UNKNOWN_CODE);
        assert_eq!(app_error.message(), "failed to save home");

        let cause = app_error.cause().expect("io cause present");
        assert!(cause.message().contains("disk full"));
    }

    #[test]
    fn converts_anyhow_preserves_existing_app_error() {
        let inner = AppError::new(REMOTE_CONSTRAINT, "nope").with_context("table", "homes");
        let converted = AppError::from(AnyhowError::from(inner.clone()));
        assert_eq!(converted, inner);
    }

    #[test]
    fn serde_json_errors_capture_position() {
        let err: SerdeJsonError =
            serde_json::from_str::<serde_json::Value>("{\"foo\": }").expect_err("invalid json");
        let app_error = AppError::from(err);
        assert_eq!(app_error.code(), "JSON/SYNTAX");
        assert!(app_error.context().contains_key("line"));
        assert!(app_error.context().contains_key("column"));
    }

    #[test]
    fn sqlx_row_not_found_maps_to_remote_not_found() {
        let app_error = AppError::from(SqlxError::RowNotFound);
        assert_eq!(app_error.code(), REMOTE_NOT_FOUND);
        assert!(app_error.is_not_found());
    }

    #[test]
    fn validation_error_flattens_fields_into_context() {
        let mut errors = FieldErrors::default();
        errors.insert("hex", "Use a # followed by six hex digits.");
        let app_error = AppError::from(SyncError::from(errors));
        assert_eq!(app_error.code(), VALIDATION_FIELDS);
        assert_eq!(
            app_error.context().get("hex").map(String::as_str),
            Some("Use a # followed by six hex digits.")
        );
    }

    #[test]
    fn cache_miss_names_collection_and_id() {
        let app_error = AppError::from(SyncError::NotFound {
            collection: Collection::Vendors,
            id: "v-1".into(),
        });
        assert_eq!(app_error.code(), CACHE_NOT_FOUND);
        assert_eq!(app_error.context().get("collection").map(String::as_str), Some("vendors"));
        assert_eq!(app_error.context().get("id").map(String::as_str), Some("v-1"));
    }

    #[test]
    fn json_shape_is_flat_struct() {
        let error = AppError::new(REMOTE_NOT_FOUND, "gone").with_context("id", "h1");
        let value = serde_json::to_value(&error).expect("serialize app error");
        assert_eq!(value.get("code").and_then(|v| v.as_str()), Some(REMOTE_NOT_FOUND));
        assert_eq!(
            value.get("context").and_then(|c| c.get("id")).and_then(|v| v.as_str()),
            Some("h1")
        );
        assert!(value.get("cause").is_none());
    }
}
