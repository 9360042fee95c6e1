use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::dao::models::{
    AnswerEntity, BatchCursorEntity, CeremonyEntity, LeaderboardEntryEntity, QuestionId,
    StandingEntity, UserEntity, UserId, WindowKind,
};

pub const CURSOR_ID: &str = "batch_cursor";

pub fn to_bson_time(value: OffsetDateTime) -> DateTime {
    DateTime::from_millis((value.unix_timestamp_nanos() / 1_000_000) as i64)
}

pub fn from_bson_time(value: DateTime) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(value.timestamp_millis()) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

fn to_count(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

pub fn guard_id(user_id: UserId, question_id: QuestionId) -> String {
    format!("{user_id}:{question_id}")
}

pub fn entry_id(user_id: UserId, window: WindowKind, period_start: OffsetDateTime) -> String {
    format!(
        "{user_id}:{}:{}",
        window.as_str(),
        to_bson_time(period_start).timestamp_millis()
    )
}

pub fn ceremony_id(window: WindowKind, period_start: OffsetDateTime) -> String {
    format!(
        "{}:{}",
        window.as_str(),
        to_bson_time(period_start).timestamp_millis()
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDocument {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub display_name: String,
    pub total_score: i64,
    pub answered: i64,
    pub correct: i64,
    pub registered_at: DateTime,
    pub last_activity: DateTime,
}

impl From<&UserEntity> for UserDocument {
    fn from(value: &UserEntity) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name.clone(),
            total_score: i64::from(value.total_score),
            answered: i64::from(value.answered),
            correct: i64::from(value.correct),
            registered_at: to_bson_time(value.registered_at),
            last_activity: to_bson_time(value.last_activity),
        }
    }
}

impl From<UserDocument> for UserEntity {
    fn from(value: UserDocument) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            total_score: to_count(value.total_score),
            answered: to_count(value.answered),
            correct: to_count(value.correct),
            registered_at: from_bson_time(value.registered_at),
            last_activity: from_bson_time(value.last_activity),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: UserId,
    pub question_id: i64,
    pub batch_id: String,
    pub chosen_index: i64,
    pub is_correct: bool,
    pub points_delta: i32,
    pub answered_at: DateTime,
}

impl From<&AnswerEntity> for AnswerDocument {
    fn from(value: &AnswerEntity) -> Self {
        Self {
            id: value.id.to_string(),
            user_id: value.user_id,
            question_id: i64::from(value.question_id),
            batch_id: value.batch_id.clone(),
            chosen_index: i64::from(value.chosen_index),
            is_correct: value.is_correct,
            points_delta: value.points_delta,
            answered_at: to_bson_time(value.answered_at),
        }
    }
}

/// Last accepted answer per (user, question); its `_id` is the dedup uniqueness key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerGuardDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub answered_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: UserId,
    pub window: WindowKind,
    pub period_start: DateTime,
    pub score: i64,
    pub answered: i64,
    pub correct: i64,
    pub reached_at: DateTime,
    pub updated_at: DateTime,
}

impl From<&LeaderboardEntryEntity> for EntryDocument {
    fn from(value: &LeaderboardEntryEntity) -> Self {
        Self {
            id: entry_id(value.user_id, value.window, value.period_start),
            user_id: value.user_id,
            window: value.window,
            period_start: to_bson_time(value.period_start),
            score: i64::from(value.score),
            answered: i64::from(value.answered),
            correct: i64::from(value.correct),
            reached_at: to_bson_time(value.reached_at),
            updated_at: to_bson_time(value.updated_at),
        }
    }
}

impl From<EntryDocument> for LeaderboardEntryEntity {
    fn from(value: EntryDocument) -> Self {
        Self {
            user_id: value.user_id,
            window: value.window,
            period_start: from_bson_time(value.period_start),
            score: to_count(value.score),
            answered: to_count(value.answered),
            correct: to_count(value.correct),
            reached_at: from_bson_time(value.reached_at),
            updated_at: from_bson_time(value.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingDocument {
    pub user_id: UserId,
    pub display_name: String,
    pub score: i64,
    pub answered: i64,
    pub correct: i64,
    pub reached_at: DateTime,
}

impl From<&StandingEntity> for StandingDocument {
    fn from(value: &StandingEntity) -> Self {
        Self {
            user_id: value.user_id,
            display_name: value.display_name.clone(),
            score: i64::from(value.score),
            answered: i64::from(value.answered),
            correct: i64::from(value.correct),
            reached_at: to_bson_time(value.reached_at),
        }
    }
}

impl From<StandingDocument> for StandingEntity {
    fn from(value: StandingDocument) -> Self {
        Self {
            user_id: value.user_id,
            display_name: value.display_name,
            score: to_count(value.score),
            answered: to_count(value.answered),
            correct: to_count(value.correct),
            reached_at: from_bson_time(value.reached_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CeremonyDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub window: WindowKind,
    pub period_start: DateTime,
    pub closed_at: DateTime,
    pub standings: Vec<StandingDocument>,
}

impl From<&CeremonyEntity> for CeremonyDocument {
    fn from(value: &CeremonyEntity) -> Self {
        Self {
            id: ceremony_id(value.window, value.period_start),
            window: value.window,
            period_start: to_bson_time(value.period_start),
            closed_at: to_bson_time(value.closed_at),
            standings: value.standings.iter().map(Into::into).collect(),
        }
    }
}

impl From<CeremonyDocument> for CeremonyEntity {
    fn from(value: CeremonyDocument) -> Self {
        Self {
            window: value.window,
            period_start: from_bson_time(value.period_start),
            closed_at: from_bson_time(value.closed_at),
            standings: value.standings.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub shuffled_order: Vec<String>,
    pub position: i64,
    pub next_question: i64,
    pub cycle: i64,
    pub version: i64,
    pub updated_at: DateTime,
}

impl From<&BatchCursorEntity> for CursorDocument {
    fn from(value: &BatchCursorEntity) -> Self {
        Self {
            id: CURSOR_ID.to_owned(),
            shuffled_order: value.shuffled_order.clone(),
            position: value.position as i64,
            next_question: value.next_question as i64,
            cycle: value.cycle as i64,
            version: value.version as i64,
            updated_at: to_bson_time(value.updated_at),
        }
    }
}

impl From<CursorDocument> for BatchCursorEntity {
    fn from(value: CursorDocument) -> Self {
        Self {
            shuffled_order: value.shuffled_order,
            position: value.position.max(0) as usize,
            next_question: value.next_question.max(0) as usize,
            cycle: value.cycle.max(0) as u64,
            version: value.version.max(0) as u64,
            updated_at: from_bson_time(value.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn bson_time_round_trips_at_millisecond_precision() {
        let at = datetime!(2025-07-13 21:00:00.123 UTC);
        assert_eq!(from_bson_time(to_bson_time(at)), at);
    }

    #[test]
    fn entry_ids_are_unique_per_window_and_period() {
        let start = datetime!(2025-07-07 00:00 UTC);
        assert_ne!(
            entry_id(1, WindowKind::Weekly, start),
            entry_id(1, WindowKind::Monthly, start)
        );
        assert_eq!(
            entry_id(1, WindowKind::Weekly, start),
            format!("1:weekly:{}", start.unix_timestamp() * 1000)
        );
    }
}
