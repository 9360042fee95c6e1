/// Answer validation, scoring and deduplication.
pub mod answer_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Timer loops and non-overlap gates for background work.
pub mod jobs;
/// Rankings, user statistics and period-close ceremonies.
pub mod leaderboard_service;
/// Question rotation over the persisted batch cursor.
pub mod quiz_scheduler;
/// Purge of expired answers and leaderboard periods.
pub mod retention;
/// Worker pool every storage call goes through.
pub mod storage_pool;
/// Storage connection supervisor with reconnect backoff.
pub mod storage_supervisor;
