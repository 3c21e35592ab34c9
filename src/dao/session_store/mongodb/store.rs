use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        CHAT_MESSAGES, FEEDS, MongoChatMessageDocument, MongoFeedDocument,
        MongoParticipantDocument, MongoQueueItemDocument, MongoSessionDocument, MongoVoteDocument,
        PARTICIPANTS, QUEUE_ITEMS, SESSIONS, VOTES, convert_all, playback_source_name,
    },
};
use crate::dao::{
    models::{
        ChatMessageEntity, FeedEntity, ParticipantEntity, QueueItemEntity, SessionEntity,
        SessionPatch, UpdateCondition, VoteEntity,
    },
    session_store::SessionStore,
    storage::StorageResult,
};

/// MongoDB-backed [`SessionStore`], one collection per entity.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();
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
        info!(database = %self.config.database_name, "MongoDB connection re-established");
        Ok(())
    }
}

fn index(keys: Document, name: &str, unique: bool) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(Some(name.to_owned()))
                .unique(Some(unique))
                .build(),
        )
        .build()
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState { client, database }),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let active_code = IndexModel::builder()
            .keys(doc! { "join_code": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("session_active_join_code_idx".to_owned()))
                    .unique(Some(true))
                    .partial_filter_expression(Some(doc! { "is_active": true }))
                    .build(),
            )
            .build();

        let indexes = [
            (SESSIONS, "join_code", active_code),
            (
                PARTICIPANTS,
                "session_id",
                index(doc! { "session_id": 1, "created_at": 1 }, "participant_session_idx", false),
            ),
            (
                FEEDS,
                "session_id,user_id",
                index(doc! { "session_id": 1, "user_id": 1 }, "feed_owner_idx", true),
            ),
            (
                QUEUE_ITEMS,
                "session_id,played,created_at",
                index(
                    doc! { "session_id": 1, "played": 1, "created_at": 1, "_id": 1 },
                    "queue_fifo_idx",
                    false,
                ),
            ),
            (
                VOTES,
                "session_id,user_id",
                index(doc! { "session_id": 1, "user_id": 1 }, "vote_voter_idx", true),
            ),
            (
                CHAT_MESSAGES,
                "session_id,created_at",
                index(doc! { "session_id": 1, "created_at": 1 }, "chat_session_idx", false),
            ),
        ];

        for (collection, name, model) in indexes {
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index: name,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.state.read().await.database.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database().await.collection::<T>(name)
    }

    async fn insert_session(&self, session: SessionEntity) -> MongoResult<()> {
        let join_code = session.join_code.clone();
        let document = MongoSessionDocument::from(session);
        let collection = self.collection::<MongoSessionDocument>(SESSIONS).await;
        match collection.insert_one(&document).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => {
                Err(MongoDaoError::DuplicateJoinCode { join_code })
            }
            Err(source) => Err(MongoDaoError::query(SESSIONS, "insert_one")(source)),
        }
    }

    async fn find_session_by(&self, filter: Document) -> MongoResult<Option<SessionEntity>> {
        self.collection::<MongoSessionDocument>(SESSIONS)
            .await
            .find_one(filter)
            .await
            .map_err(MongoDaoError::query(SESSIONS, "find_one"))?
            .map(SessionEntity::try_from)
            .transpose()
    }

    async fn update_session(
        &self,
        id: Uuid,
        patch: SessionPatch,
        condition: UpdateCondition,
    ) -> MongoResult<Option<SessionEntity>> {
        let mut filter = doc! { "_id": id.to_string() };
        if let UpdateCondition::OwnerIs(owner) = condition {
            filter.insert(
                "current_feed_owner_id",
                owner.map(|owner| owner.to_string()),
            );
        }

        let mut set = doc! { "updated_at": DateTime::now() };
        if let Some(host_id) = patch.host_id {
            set.insert("host_id", host_id.to_string());
        }
        if let Some(owner) = patch.current_feed_owner_id {
            set.insert("current_feed_owner_id", owner.to_string());
        }
        if let Some(playback) = patch.playback {
            set.insert("current_video_id", playback.video_id);
            set.insert("current_source", playback_source_name(playback.source));
            set.insert(
                "current_queue_item_id",
                playback.queue_item_id.map(|id| id.to_string()),
            );
            set.insert(
                "playback_started_at",
                DateTime::from_system_time(playback.started_at),
            );
        }

        self.collection::<MongoSessionDocument>(SESSIONS)
            .await
            .find_one_and_update(filter, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::query(SESSIONS, "find_one_and_update"))?
            .map(SessionEntity::try_from)
            .transpose()
    }

    async fn insert_participant(&self, participant: ParticipantEntity) -> MongoResult<()> {
        self.collection::<MongoParticipantDocument>(PARTICIPANTS)
            .await
            .insert_one(MongoParticipantDocument::from(participant))
            .await
            .map_err(MongoDaoError::query(PARTICIPANTS, "insert_one"))?;
        Ok(())
    }

    async fn list_participants(&self, session_id: Uuid) -> MongoResult<Vec<ParticipantEntity>> {
        let documents: Vec<MongoParticipantDocument> = self
            .collection::<MongoParticipantDocument>(PARTICIPANTS)
            .await
            .find(doc! { "session_id": session_id.to_string() })
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await
            .map_err(MongoDaoError::query(PARTICIPANTS, "find"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query(PARTICIPANTS, "find"))?;
        convert_all(documents)
    }

    async fn set_participant_connected(
        &self,
        participant_id: Uuid,
        connected: bool,
        seen_at: Option<SystemTime>,
    ) -> MongoResult<Option<ParticipantEntity>> {
        let mut set = doc! { "is_connected": connected };
        if let Some(seen_at) = seen_at {
            set.insert("last_seen_at", DateTime::from_system_time(seen_at));
        }

        self.collection::<MongoParticipantDocument>(PARTICIPANTS)
            .await
            .find_one_and_update(
                doc! { "_id": participant_id.to_string() },
                doc! { "$set": set },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::query(PARTICIPANTS, "find_one_and_update"))?
            .map(ParticipantEntity::try_from)
            .transpose()
    }

    async fn insert_feed(&self, feed: FeedEntity) -> MongoResult<bool> {
        let collection = self.collection::<MongoFeedDocument>(FEEDS).await;
        match collection.insert_one(MongoFeedDocument::from(feed)).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::query(FEEDS, "insert_one")(source)),
        }
    }

    async fn find_feed(&self, session_id: Uuid, user_id: Uuid) -> MongoResult<Option<FeedEntity>> {
        self.collection::<MongoFeedDocument>(FEEDS)
            .await
            .find_one(doc! {
                "session_id": session_id.to_string(),
                "user_id": user_id.to_string(),
            })
            .await
            .map_err(MongoDaoError::query(FEEDS, "find_one"))?
            .map(FeedEntity::try_from)
            .transpose()
    }

    async fn advance_feed_pointer(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        expected: usize,
    ) -> MongoResult<Option<FeedEntity>> {
        let expected_index = i64::try_from(expected).unwrap_or(i64::MAX);
        let mut filter = doc! {
            "session_id": session_id.to_string(),
            "user_id": user_id.to_string(),
            "pointer_index": expected_index,
        };
        // The item at `expected` must exist, so the pointer never passes the end.
        filter.insert(format!("items.{expected}"), doc! { "$exists": true });

        self.collection::<MongoFeedDocument>(FEEDS)
            .await
            .find_one_and_update(
                filter,
                doc! {
                    "$inc": { "pointer_index": 1_i64 },
                    "$set": { "updated_at": DateTime::now() },
                },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::query(FEEDS, "find_one_and_update"))?
            .map(FeedEntity::try_from)
            .transpose()
    }

    async fn insert_queue_item(&self, item: QueueItemEntity) -> MongoResult<()> {
        self.collection::<MongoQueueItemDocument>(QUEUE_ITEMS)
            .await
            .insert_one(MongoQueueItemDocument::from(item))
            .await
            .map_err(MongoDaoError::query(QUEUE_ITEMS, "insert_one"))?;
        Ok(())
    }

    async fn list_unplayed_queue(&self, session_id: Uuid) -> MongoResult<Vec<QueueItemEntity>> {
        let documents: Vec<MongoQueueItemDocument> = self
            .collection::<MongoQueueItemDocument>(QUEUE_ITEMS)
            .await
            .find(doc! { "session_id": session_id.to_string(), "played": false })
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await
            .map_err(MongoDaoError::query(QUEUE_ITEMS, "find"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query(QUEUE_ITEMS, "find"))?;
        convert_all(documents)
    }

    async fn mark_queue_item_played(&self, item_id: Uuid) -> MongoResult<Option<QueueItemEntity>> {
        self.collection::<MongoQueueItemDocument>(QUEUE_ITEMS)
            .await
            .find_one_and_update(
                doc! { "_id": item_id.to_string(), "played": false },
                doc! { "$set": { "played": true } },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::query(QUEUE_ITEMS, "find_one_and_update"))?
            .map(QueueItemEntity::try_from)
            .transpose()
    }

    async fn delete_queue_item(&self, session_id: Uuid, item_id: Uuid) -> MongoResult<bool> {
        let result = self
            .collection::<MongoQueueItemDocument>(QUEUE_ITEMS)
            .await
            .delete_one(doc! {
                "_id": item_id.to_string(),
                "session_id": session_id.to_string(),
                "played": false,
            })
            .await
            .map_err(MongoDaoError::query(QUEUE_ITEMS, "delete_one"))?;
        Ok(result.deleted_count > 0)
    }

    async fn upsert_vote(&self, vote: VoteEntity) -> MongoResult<()> {
        self.collection::<MongoVoteDocument>(VOTES)
            .await
            .update_one(
                doc! {
                    "session_id": vote.session_id.to_string(),
                    "user_id": vote.user_id.to_string(),
                },
                doc! { "$set": {
                    "vote": vote.vote,
                    "updated_at": DateTime::from_system_time(vote.updated_at),
                } },
            )
            .upsert(true)
            .await
            .map_err(MongoDaoError::query(VOTES, "update_one"))?;
        Ok(())
    }

    async fn list_votes(&self, session_id: Uuid) -> MongoResult<Vec<VoteEntity>> {
        let documents: Vec<MongoVoteDocument> = self
            .collection::<MongoVoteDocument>(VOTES)
            .await
            .find(doc! { "session_id": session_id.to_string() })
            .sort(doc! { "updated_at": 1, "user_id": 1 })
            .await
            .map_err(MongoDaoError::query(VOTES, "find"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query(VOTES, "find"))?;
        convert_all(documents)
    }

    async fn delete_votes(&self, session_id: Uuid) -> MongoResult<u64> {
        let result = self
            .collection::<MongoVoteDocument>(VOTES)
            .await
            .delete_many(doc! { "session_id": session_id.to_string() })
            .await
            .map_err(MongoDaoError::query(VOTES, "delete_many"))?;
        Ok(result.deleted_count)
    }

    async fn insert_chat_message(&self, message: ChatMessageEntity) -> MongoResult<()> {
        self.collection::<MongoChatMessageDocument>(CHAT_MESSAGES)
            .await
            .insert_one(MongoChatMessageDocument::from(message))
            .await
            .map_err(MongoDaoError::query(CHAT_MESSAGES, "insert_one"))?;
        Ok(())
    }

    async fn list_chat_messages(&self, session_id: Uuid) -> MongoResult<Vec<ChatMessageEntity>> {
        let documents: Vec<MongoChatMessageDocument> = self
            .collection::<MongoChatMessageDocument>(CHAT_MESSAGES)
            .await
            .find(doc! { "session_id": session_id.to_string() })
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await
            .map_err(MongoDaoError::query(CHAT_MESSAGES, "find"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::query(CHAT_MESSAGES, "find"))?;
        convert_all(documents)
    }
}

impl SessionStore for MongoSessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await.map_err(Into::into) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_session_by(doc! { "_id": id.to_string() })
                .await
                .map_err(Into::into)
        })
    }

    fn find_active_session_by_code(
        &self,
        join_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_session_by(doc! { "join_code": join_code, "is_active": true })
                .await
                .map_err(Into::into)
        })
    }

    fn update_session(
        &self,
        id: Uuid,
        patch: SessionPatch,
        condition: UpdateCondition,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_session(id, patch, condition)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_participant(participant)
                .await
                .map_err(Into::into)
        })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_participants(session_id).await.map_err(Into::into) })
    }

    fn set_participant_connected(
        &self,
        participant_id: Uuid,
        connected: bool,
        seen_at: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_participant_connected(participant_id, connected, seen_at)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_feed(&self, feed: FeedEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.insert_feed(feed).await.map_err(Into::into) })
    }

    fn find_feed(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<FeedEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_feed(session_id, user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn advance_feed_pointer(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        expected: usize,
    ) -> BoxFuture<'static, StorageResult<Option<FeedEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .advance_feed_pointer(session_id, user_id, expected)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_queue_item(&self, item: QueueItemEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_queue_item(item).await.map_err(Into::into) })
    }

    fn list_unplayed_queue(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QueueItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_unplayed_queue(session_id)
                .await
                .map_err(Into::into)
        })
    }

    fn mark_queue_item_played(
        &self,
        item_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QueueItemEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.mark_queue_item_played(item_id).await.map_err(Into::into) })
    }

    fn delete_queue_item(
        &self,
        session_id: Uuid,
        item_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_queue_item(session_id, item_id)
                .await
                .map_err(Into::into)
        })
    }

    fn upsert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_vote(vote).await.map_err(Into::into) })
    }

    fn list_votes(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_votes(session_id).await.map_err(Into::into) })
    }

    fn delete_votes(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.delete_votes(session_id).await.map_err(Into::into) })
    }

    fn insert_chat_message(
        &self,
        message: ChatMessageEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_chat_message(message).await.map_err(Into::into) })
    }

    fn list_chat_messages(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_chat_messages(session_id)
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
