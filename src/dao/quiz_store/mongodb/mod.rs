/// Connection settings read from the environment.
pub mod config;
mod connection;
mod error;
mod models;
/// Transactional [`QuizStore`](crate::dao::quiz_store::QuizStore) implementation.
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoQuizStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::CursorConflict { expected } => StorageError::VersionConflict { expected },
            MongoDaoError::CeremonyExists { id } => StorageError::AlreadyExists {
                what: format!("ceremony `{id}`"),
            },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
