use std::{collections::HashMap, sync::Arc};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    ClientSession, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        AnswerDocument, AnswerGuardDocument, CURSOR_ID, CeremonyDocument, CursorDocument,
        EntryDocument, UserDocument, ceremony_id, entry_id, from_bson_time, guard_id,
        to_bson_time,
    },
};
use crate::dao::{
    models::{
        AnswerAttempt, BatchCursorEntity, CeremonyEntity, LeaderboardEntryEntity, RecordOutcome,
        StandingEntity, UserEntity, UserId, WindowKind,
    },
    quiz_store::QuizStore,
    storage::StorageResult,
};

const USERS: &str = "users";
const ANSWERS: &str = "answers";
const ANSWER_GUARDS: &str = "answer_guards";
const ENTRIES: &str = "leaderboard_entries";
const CEREMONIES: &str = "ceremonies";
const CURSORS: &str = "batch_cursor";

/// (collection, index name, keys)
fn index_specs() -> [(&'static str, &'static str, Document); 5] {
    [
        (
            ANSWERS,
            "answer_user_question_idx",
            doc! { "user_id": 1, "question_id": 1, "answered_at": -1 },
        ),
        (ANSWERS, "answer_time_idx", doc! { "answered_at": 1 }),
        (
            ENTRIES,
            "entry_ranking_idx",
            doc! { "window": 1, "period_start": 1, "score": -1, "reached_at": 1, "user_id": 1 },
        ),
        (ENTRIES, "entry_user_idx", doc! { "user_id": 1 }),
        (CEREMONIES, "ceremony_period_idx", doc! { "period_start": 1 }),
    ]
}

/// [`QuizStore`] backed by MongoDB. Multi-document writes run inside transactions,
/// so the server must be a replica set.
#[derive(Clone)]
pub struct MongoQuizStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: mongodb::Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoQuizStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        for (collection, index, keys) in index_specs() {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(index.to_owned())).build())
                .build();
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }
        debug!("MongoDB indexes ensured");
        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        let guard = self.inner.state.read().await;
        guard.database.collection::<T>(name)
    }

    async fn start_transaction(&self, op: &'static str) -> MongoResult<ClientSession> {
        let client = {
            let guard = self.inner.state.read().await;
            guard.client.clone()
        };
        let mut session = client
            .start_session()
            .await
            .map_err(|source| MongoDaoError::Transaction { op, source })?;
        session
            .start_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction { op, source })?;
        Ok(session)
    }

    async fn commit(session: &mut ClientSession, op: &'static str) -> MongoResult<()> {
        session
            .commit_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction { op, source })
    }

    // A session dropped before commit aborts its transaction.
    async fn record_answer(&self, attempt: AnswerAttempt) -> MongoResult<RecordOutcome> {
        let user_id = attempt.answer.user_id;
        let question_id = attempt.answer.question_id;
        let failed = |source| MongoDaoError::RecordAnswer {
            user_id,
            question_id,
            source,
        };

        let users = self.collection::<UserDocument>(USERS).await;
        let answers = self.collection::<AnswerDocument>(ANSWERS).await;
        let guards = self.collection::<AnswerGuardDocument>(ANSWER_GUARDS).await;
        let entries = self.collection::<EntryDocument>(ENTRIES).await;

        let mut session = self.start_transaction("record_answer").await?;
        let guard_key = guard_id(user_id, question_id);
        let cutoff = attempt.dedup_cutoff();

        let previous = guards
            .find_one(doc! { "_id": &guard_key })
            .session(&mut session)
            .await
            .map_err(failed)?;
        if let Some(previous) = previous {
            let last_answered_at = from_bson_time(previous.answered_at);
            if last_answered_at > cutoff {
                session
                    .abort_transaction()
                    .await
                    .map_err(|source| MongoDaoError::Transaction {
                        op: "record_answer",
                        source,
                    })?;
                return Ok(RecordOutcome::Duplicate { last_answered_at });
            }
        }

        let AnswerAttempt {
            answer,
            display_name,
            delta,
            periods,
            ..
        } = attempt;
        let now = answer.answered_at;

        let mut user: UserEntity = users
            .find_one(doc! { "_id": user_id })
            .session(&mut session)
            .await
            .map_err(failed)?
            .map(Into::into)
            .unwrap_or_else(|| UserEntity::new(user_id, display_name.clone(), now));
        user.display_name = display_name;
        user.apply(delta, answer.is_correct, now);
        users
            .replace_one(doc! { "_id": user_id }, UserDocument::from(&user))
            .upsert(true)
            .session(&mut session)
            .await
            .map_err(failed)?;

        for (window, period_start) in periods {
            let id = entry_id(user_id, window, period_start);
            let mut entry: LeaderboardEntryEntity = entries
                .find_one(doc! { "_id": &id })
                .session(&mut session)
                .await
                .map_err(failed)?
                .map(Into::into)
                .unwrap_or_else(|| LeaderboardEntryEntity::new(user_id, window, period_start, now));
            entry.apply(delta, answer.is_correct, now);
            entries
                .replace_one(doc! { "_id": &id }, EntryDocument::from(&entry))
                .upsert(true)
                .session(&mut session)
                .await
                .map_err(failed)?;
        }

        answers
            .insert_one(AnswerDocument::from(&answer))
            .session(&mut session)
            .await
            .map_err(failed)?;
        guards
            .replace_one(
                doc! { "_id": &guard_key },
                AnswerGuardDocument {
                    id: guard_key.clone(),
                    answered_at: to_bson_time(now),
                },
            )
            .upsert(true)
            .session(&mut session)
            .await
            .map_err(failed)?;

        Self::commit(&mut session, "record_answer").await?;
        Ok(RecordOutcome::Recorded { user })
    }

    async fn find_user(&self, id: UserId) -> MongoResult<Option<UserEntity>> {
        let users = self.collection::<UserDocument>(USERS).await;
        let document = users
            .find_one(doc! { "_id": id })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: USERS,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn user_entries(&self, id: UserId) -> MongoResult<Vec<LeaderboardEntryEntity>> {
        let entries = self.collection::<EntryDocument>(ENTRIES).await;
        let query = |source| MongoDaoError::Query {
            collection: ENTRIES,
            source,
        };
        let documents: Vec<EntryDocument> = entries
            .find(doc! { "user_id": id })
            .await
            .map_err(query)?
            .try_collect()
            .await
            .map_err(query)?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn top_standings(
        &self,
        window: WindowKind,
        period_start: OffsetDateTime,
        limit: usize,
    ) -> MongoResult<Vec<StandingEntity>> {
        let entries = self.collection::<EntryDocument>(ENTRIES).await;
        let query = |source| MongoDaoError::Query {
            collection: ENTRIES,
            source,
        };
        let top: Vec<LeaderboardEntryEntity> = entries
            .find(doc! { "window": window.as_str(), "period_start": to_bson_time(period_start) })
            .sort(doc! { "score": -1, "reached_at": 1, "user_id": 1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(query)?
            .try_collect::<Vec<EntryDocument>>()
            .await
            .map_err(query)?
            .into_iter()
            .map(Into::into)
            .collect();

        if top.is_empty() {
            return Ok(Vec::new());
        }

        let users = self.collection::<UserDocument>(USERS).await;
        let query_users = |source| MongoDaoError::Query {
            collection: USERS,
            source,
        };
        let ids: Vec<UserId> = top.iter().map(|entry| entry.user_id).collect();
        let names: HashMap<UserId, String> = users
            .find(doc! { "_id": { "$in": ids } })
            .await
            .map_err(query_users)?
            .try_collect::<Vec<UserDocument>>()
            .await
            .map_err(query_users)?
            .into_iter()
            .map(|user| (user.id, user.display_name))
            .collect();

        Ok(top
            .iter()
            .map(|entry| {
                let name = names
                    .get(&entry.user_id)
                    .cloned()
                    .unwrap_or_else(|| format!("User_{}", entry.user_id));
                StandingEntity::from_entry(entry, name)
            })
            .collect())
    }

    async fn close_period(&self, ceremony: CeremonyEntity) -> MongoResult<u64> {
        let ceremonies = self.collection::<CeremonyDocument>(CEREMONIES).await;
        let entries = self.collection::<EntryDocument>(ENTRIES).await;
        let document = CeremonyDocument::from(&ceremony);
        let id = document.id.clone();
        let closed_at = to_bson_time(ceremony.closed_at);

        let mut session = self.start_transaction("close_period").await?;

        if let Err(source) = ceremonies
            .insert_one(&document)
            .session(&mut session)
            .await
        {
            if is_duplicate_key(&source) {
                return Err(MongoDaoError::CeremonyExists { id });
            }
            return Err(MongoDaoError::Write {
                collection: CEREMONIES,
                source,
            });
        }

        let reset = entries
            .update_many(
                doc! {
                    "window": ceremony.window.as_str(),
                    "period_start": to_bson_time(ceremony.period_start),
                },
                doc! { "$set": {
                    "score": 0_i64,
                    "answered": 0_i64,
                    "correct": 0_i64,
                    "reached_at": closed_at,
                    "updated_at": closed_at,
                } },
            )
            .session(&mut session)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: ENTRIES,
                source,
            })?;

        Self::commit(&mut session, "close_period").await?;
        Ok(reset.matched_count)
    }

    async fn find_ceremony(
        &self,
        window: WindowKind,
        period_start: OffsetDateTime,
    ) -> MongoResult<Option<CeremonyEntity>> {
        let ceremonies = self.collection::<CeremonyDocument>(CEREMONIES).await;
        let document = ceremonies
            .find_one(doc! { "_id": ceremony_id(window, period_start) })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: CEREMONIES,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn load_cursor(&self) -> MongoResult<Option<BatchCursorEntity>> {
        let cursors = self.collection::<CursorDocument>(CURSORS).await;
        let document = cursors
            .find_one(doc! { "_id": CURSOR_ID })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: CURSORS,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn save_cursor(
        &self,
        cursor: BatchCursorEntity,
        expected_version: Option<u64>,
    ) -> MongoResult<()> {
        let cursors = self.collection::<CursorDocument>(CURSORS).await;
        let document = CursorDocument::from(&cursor);
        let write = |source| MongoDaoError::Write {
            collection: CURSORS,
            source,
        };

        match expected_version {
            None => match cursors.insert_one(&document).await {
                Ok(_) => Ok(()),
                Err(source) if is_duplicate_key(&source) => {
                    Err(MongoDaoError::CursorConflict { expected: None })
                }
                Err(source) => Err(write(source)),
            },
            Some(version) => {
                let result = cursors
                    .replace_one(
                        doc! { "_id": CURSOR_ID, "version": version as i64 },
                        &document,
                    )
                    .await
                    .map_err(write)?;
                if result.matched_count == 0 {
                    return Err(MongoDaoError::CursorConflict {
                        expected: expected_version,
                    });
                }
                Ok(())
            }
        }
    }

    async fn purge(&self, collection: &'static str, filter: Document) -> MongoResult<u64> {
        let result = self
            .collection::<Document>(collection)
            .await
            .delete_many(filter)
            .await
            .map_err(|source| MongoDaoError::Purge { collection, source })?;
        Ok(result.deleted_count)
    }

    async fn delete_answers_before(&self, cutoff: OffsetDateTime) -> MongoResult<u64> {
        let filter = doc! { "answered_at": { "$lt": to_bson_time(cutoff) } };
        let deleted = self.purge(ANSWERS, filter.clone()).await?;
        let guards = self.purge(ANSWER_GUARDS, filter).await?;
        debug!(deleted, guards, "purged old answers");
        Ok(deleted)
    }

    async fn delete_entries_before(&self, cutoff: OffsetDateTime) -> MongoResult<u64> {
        self.purge(
            ENTRIES,
            doc! { "period_start": { "$lt": to_bson_time(cutoff) } },
        )
        .await
    }

    async fn delete_ceremonies_before(&self, cutoff: OffsetDateTime) -> MongoResult<u64> {
        self.purge(
            CEREMONIES,
            doc! { "period_start": { "$lt": to_bson_time(cutoff) } },
        )
        .await
    }
}

impl QuizStore for MongoQuizStore {
    fn record_answer(&self, attempt: AnswerAttempt) -> BoxFuture<'static, StorageResult<RecordOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.record_answer(attempt).await.map_err(Into::into) })
    }

    fn find_user(&self, id: UserId) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_user(id).await.map_err(Into::into) })
    }

    fn user_entries(
        &self,
        id: UserId,
    ) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.user_entries(id).await.map_err(Into::into) })
    }

    fn top_standings(
        &self,
        window: WindowKind,
        period_start: OffsetDateTime,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<StandingEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .top_standings(window, period_start, limit)
                .await
                .map_err(Into::into)
        })
    }

    fn close_period(&self, ceremony: CeremonyEntity) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.close_period(ceremony).await.map_err(Into::into) })
    }

    fn find_ceremony(
        &self,
        window: WindowKind,
        period_start: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<Option<CeremonyEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_ceremony(window, period_start)
                .await
                .map_err(Into::into)
        })
    }

    fn load_cursor(&self) -> BoxFuture<'static, StorageResult<Option<BatchCursorEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_cursor().await.map_err(Into::into) })
    }

    fn save_cursor(
        &self,
        cursor: BatchCursorEntity,
        expected_version: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_cursor(cursor, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_answers_before(&self, cutoff: OffsetDateTime) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.delete_answers_before(cutoff).await.map_err(Into::into) })
    }

    fn delete_entries_before(&self, cutoff: OffsetDateTime) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.delete_entries_before(cutoff).await.map_err(Into::into) })
    }

    fn delete_ceremonies_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_ceremonies_before(cutoff)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
