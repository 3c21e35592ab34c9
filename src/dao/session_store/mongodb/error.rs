use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("join code `{join_code}` is already used by an active session")]
    DuplicateJoinCode { join_code: String },
    #[error("`{operation}` failed on collection `{collection}`")]
    Query {
        collection: &'static str,
        operation: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("document in `{collection}` has an invalid `{field}` value `{value}`")]
    CorruptDocument {
        collection: &'static str,
        field: &'static str,
        value: String,
        #[source]
        source: uuid::Error,
    },
}

impl MongoDaoError {
    /// Error mapper for a failed driver call.
    pub fn query(
        collection: &'static str,
        operation: &'static str,
    ) -> impl FnOnce(MongoError) -> MongoDaoError {
        move |source| MongoDaoError::Query {
            collection,
            operation,
            source,
        }
    }
}

/// Whether the driver rejected a write because of a unique index.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}
