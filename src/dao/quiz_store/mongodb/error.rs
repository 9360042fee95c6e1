use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

use crate::dao::models::{QuestionId, UserId};

/// Result alias for the MongoDB backend.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Failures of the MongoDB backend, converted into [`StorageError`] at the trait boundary.
///
/// [`StorageError`]: crate::dao::storage::StorageError
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// A required environment variable is unset.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// `MONGO_URI` could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// The rejected URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver refused the parsed options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered while connecting.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings tried.
        attempts: u32,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A periodic ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed at startup.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Target collection.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A multi-document transaction aborted or failed to commit.
    #[error("MongoDB transaction for `{op}` failed")]
    Transaction {
        /// Operation the transaction served.
        op: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Recording an answer failed.
    #[error("failed to record answer of user `{user_id}` to question `{question_id}`")]
    RecordAnswer {
        /// Answering user.
        user_id: UserId,
        /// Answered question.
        question_id: QuestionId,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A read failed.
    #[error("failed to query collection `{collection}`")]
    Query {
        /// Target collection.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A write failed.
    #[error("failed to write collection `{collection}`")]
    Write {
        /// Target collection.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A retention delete failed.
    #[error("failed to purge collection `{collection}`")]
    Purge {
        /// Target collection.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The cursor version no longer matches.
    #[error("batch cursor changed concurrently (expected version {expected:?})")]
    CursorConflict {
        /// Version the writer read.
        expected: Option<u64>,
    },
    /// The period was already closed.
    #[error("ceremony `{id}` already recorded")]
    CeremonyExists {
        /// Ceremony document id.
        id: String,
    },
}

/// Whether the server rejected a write because of a unique index.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}
