/// Database model definitions.
pub mod models;
/// Persistence layer for users, answers, leaderboards and the batch cursor.
pub mod quiz_store;
/// Storage abstraction layer for database operations.
pub mod storage;
