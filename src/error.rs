//! Error taxonomy for the extraction engine.
//!
//! Structural skips and resolution fallbacks never become errors; they are
//! absorbed where they happen. What remains is listed here. Callers at the
//! edges (CLI, HTTP) work with `anyhow::Error` and downcast when they need
//! the class.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Required tables are not provisioned in the connected database.
    #[error("schema not provisioned: missing table(s) {0}")]
    SchemaMissing(String),

    /// Storage failure other than a resolved uniqueness collision.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A JSON map could not be serialized for storage.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller input that cannot be processed at all (e.g. empty source URI).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
