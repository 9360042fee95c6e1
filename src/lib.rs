//! Library crate for quizboard-back, exposing modules for binaries and integration tests.

/// UTC period boundaries and ceremony fire times.
pub mod calendar;
/// Runtime configuration loaded from `config/app.json`.
pub mod config;
/// Immutable quiz bank.
pub mod content;
/// Persistence models and store backends.
pub mod dao;
/// Outbound message channels and message rendering.
pub mod delivery;
/// HTTP request and response payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// axum route trees.
pub mod routes;
/// Scheduler, scoring, leaderboards, retention and job orchestration.
pub mod services;
/// Shared application state.
pub mod state;
