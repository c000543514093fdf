use thiserror::Error;

/// Failures raised by a store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported value in column {column}: {message}")]
    Unsupported { column: String, message: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Structural error in {stage}: {message}")]
    Structure { stage: String, message: String },

    #[error("Load failed during {stage} on table {table}: {source}")]
    Load {
        stage: String,
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("Enrichment failed on table {table} after loading {loaded_rows} rows: {source}")]
    Enrichment {
        table: String,
        loaded_rows: usize,
        #[source]
        source: StoreError,
    },

    #[error("Query failed on {target}: {source}")]
    Query {
        target: String,
        #[source]
        source: StoreError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    pub fn structure(stage: &str, message: impl Into<String>) -> Self {
        EtlError::Structure {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    /// True when the data reached the table but the post-load step did not.
    pub fn is_enrichment_failure(&self) -> bool {
        matches!(self, EtlError::Enrichment { .. })
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
