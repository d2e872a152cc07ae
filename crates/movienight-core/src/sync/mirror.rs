use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStore, GroupRow, MirroredGroup, UserRow};
use crate::error::AppError;
use crate::models::User;
use crate::remote::{
    DocumentSnapshot, DocumentStore, GroupDocument, Query, QuerySnapshot, RemoteError,
    RemoteResult, UserDocument, GROUPS_COLLECTION, MEMBERS_FIELD, USERS_COLLECTION,
};

/// Resolves a user id into a user while translating group documents.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn lookup_user(&self, user_id: &str) -> RemoteResult<User>;
}

/// Looks users up in the remote `users` collection.
#[derive(Clone)]
pub struct RemoteUserLookup {
    store: Arc<dyn DocumentStore>,
}

impl RemoteUserLookup {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UserLookup for RemoteUserLookup {
    async fn lookup_user(&self, user_id: &str) -> RemoteResult<User> {
        let data = self
            .store
            .get_document(USERS_COLLECTION, user_id)
            .await?
            .ok_or_else(|| RemoteError::NotFound(format!("{}/{}", USERS_COLLECTION, user_id)))?;
        Ok(UserDocument::parse(user_id, &data)?.into_user(user_id))
    }
}

/// One emission of the group mirror: the groups written to the cache, or
/// the error that kept a snapshot out of it.
pub type GroupSnapshot = Result<Vec<MirroredGroup>, AppError>;

/// Handle to a running mirror task.
///
/// Exposes the latest value the task produced. Dropping or cancelling the
/// handle stops the task, which drops its remote subscription.
pub struct MirrorHandle<T> {
    latest: watch::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T: Clone> MirrorHandle<T> {
    /// Wait for the next value. Returns None once the task has stopped.
    pub async fn changed(&mut self) -> Option<T> {
        self.latest.changed().await.ok()?;
        Some(self.latest.borrow_and_update().clone())
    }

    /// The most recent value, without waiting
    pub fn latest(&self) -> T {
        self.latest.borrow().clone()
    }
}

impl<T> MirrorHandle<T> {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Drop for MirrorHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Mirrors remote group and user documents into the cache.
#[derive(Clone)]
pub struct GroupMirror {
    store: Arc<dyn DocumentStore>,
    cache: Arc<CacheStore>,
    users: Arc<dyn UserLookup>,
}

impl GroupMirror {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<CacheStore>, users: Arc<dyn UserLookup>) -> Self {
        Self { store, cache, users }
    }

    /// Follow every remote group `user_id` is a member of.
    ///
    /// Each remote snapshot is translated into rows and written to the
    /// cache in one step; the translated groups are then published on the
    /// returned handle, or the cache error if the write failed. Groups a
    /// mirror of this user wrote earlier, in this process or a previous
    /// one, are deleted from the cache once they leave the snapshot.
    /// Nothing else is ever deleted.
    pub async fn observe_groups_for_user(&self, user_id: &str) -> RemoteResult<MirrorHandle<GroupSnapshot>> {
        let mut subscription = self
            .store
            .subscribe(Query::array_contains(GROUPS_COLLECTION, MEMBERS_FIELD, user_id))
            .await?;
        info!(user_id = user_id, "Started group mirror");

        let (tx, rx) = watch::channel(Ok(Vec::new()));
        let mirror = self.clone();
        let user_id = user_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                let groups = mirror.translate_snapshot(&snapshot).await;
                let present: Vec<String> = snapshot.documents.iter().map(|d| d.id.clone()).collect();

                let published = match mirror.cache.apply_mirror_snapshot(&user_id, &groups, &present) {
                    Ok(removed) => {
                        debug!(
                            user_id = %user_id,
                            groups = groups.len(),
                            removed = removed.len(),
                            "Mirrored group snapshot"
                        );
                        Ok(groups)
                    }
                    Err(e) => {
                        error!(error = %e, user_id = %user_id, "Failed to write mirrored groups to cache");
                        Err(AppError::from(e))
                    }
                };

                // The handle may not be read; the cache write above is what matters
                let _ = tx.send(published);
            }

            debug!(user_id = %user_id, "Group subscription closed");
        });

        Ok(MirrorHandle { latest: rx, task })
    }

    /// Follow a single remote user document, keeping its cache row current.
    /// A missing document publishes None and leaves the cache untouched.
    pub async fn observe_user(&self, user_id: &str) -> RemoteResult<MirrorHandle<Option<User>>> {
        let mut subscription = self
            .store
            .subscribe(Query::document(USERS_COLLECTION, user_id))
            .await?;

        let (tx, rx) = watch::channel(None);
        let cache = Arc::clone(&self.cache);
        let user_id = user_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                let user = match snapshot.documents.first() {
                    Some(doc) => match UserDocument::parse(&doc.id, &doc.data) {
                        Ok(parsed) => Some(parsed.into_user(&doc.id)),
                        Err(e) => {
                            warn!(error = %e, user_id = %user_id, "Skipping malformed user document");
                            continue;
                        }
                    },
                    None => None,
                };

                if let Some(ref user) = user {
                    if let Err(e) = cache.apply_mirrored_user(UserRow::from(user.clone())) {
                        error!(error = %e, user_id = %user_id, "Failed to write mirrored user to cache");
                        continue;
                    }
                }
                let _ = tx.send(user);
            }
        });

        Ok(MirrorHandle { latest: rx, task })
    }

    /// Translate every document of a snapshot; failures are isolated per
    /// document and logged.
    async fn translate_snapshot(&self, snapshot: &QuerySnapshot) -> Vec<MirroredGroup> {
        join_all(snapshot.documents.iter().map(|doc| self.translate_group(doc)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn translate_group(&self, doc: &DocumentSnapshot) -> Option<MirroredGroup> {
        let group = match GroupDocument::parse(&doc.id, &doc.data).and_then(|d| d.into_group(&doc.id)) {
            Ok(group) => group,
            Err(e) => {
                warn!(error = %e, group_id = %doc.id, "Skipping group document");
                return None;
            }
        };

        let members = join_all(group.members.iter().map(|id| self.resolve_member(id))).await;
        let (row, _) = GroupRow::from_group(&group);
        Some(MirroredGroup { group: row, members })
    }

    /// Resolve a member, falling back to an empty user on any failure.
    async fn resolve_member(&self, user_id: &str) -> UserRow {
        match self.users.lookup_user(user_id).await {
            Ok(user) => user.into(),
            Err(e) => {
                debug!(error = %e, user_id = user_id, "Member lookup failed, using placeholder");
                User::placeholder(user_id).into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::StatusRow;
    use crate::models::{Group, MovieStatus, StatusKey};
    use crate::remote::{Document, LocalDocumentStore};
    use serde_json::{json, Value};

    const WAIT: Duration = Duration::from_secs(2);

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("test document must be an object"),
        }
    }

    struct Fixture {
        store: Arc<LocalDocumentStore>,
        cache: Arc<CacheStore>,
        mirror: GroupMirror,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(LocalDocumentStore::new());
        let cache = Arc::new(CacheStore::in_memory());
        let remote: Arc<dyn DocumentStore> = store.clone();
        let lookup = Arc::new(RemoteUserLookup::new(Arc::clone(&remote)));
        let mirror = GroupMirror::new(remote, Arc::clone(&cache), lookup);
        Fixture { store, cache, mirror }
    }

    async fn put_group(store: &LocalDocumentStore, group: &Group) {
        let data = GroupDocument::from_group(group).to_document().expect("encode failed");
        store
            .set_document(GROUPS_COLLECTION, &group.id, data)
            .await
            .expect("set failed");
    }

    async fn put_user(store: &LocalDocumentStore, id: &str, email: &str) {
        let data = UserDocument::from_user(&User::new(id, email)).to_document().expect("encode failed");
        store.set_document(USERS_COLLECTION, id, data).await.expect("set failed");
    }

    async fn next<T: Clone>(handle: &mut MirrorHandle<T>) -> T {
        tokio::time::timeout(WAIT, handle.changed())
            .await
            .expect("timed out waiting for mirror")
            .expect("mirror stopped")
    }

    async fn next_groups(handle: &mut MirrorHandle<GroupSnapshot>) -> Vec<MirroredGroup> {
        next(handle).await.expect("snapshot not written")
    }

    async fn wait_for_no_listeners(store: &LocalDocumentStore) {
        tokio::time::timeout(WAIT, async {
            while store.listener_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("listener was not removed");
    }

    #[tokio::test]
    async fn test_mirror_writes_groups_and_members_to_cache() {
        let f = fixture();
        put_user(&f.store, "user-1", "one@example.com").await;
        put_user(&f.store, "user-2", "two@example.com").await;
        let mut group = Group::new("g1", "user-1", "Movie Nights");
        group.add_member("user-2");
        put_group(&f.store, &group).await;

        let mut handle = f.mirror.observe_groups_for_user("user-1").await.expect("observe failed");
        let mirrored = next_groups(&mut handle).await;
        assert_eq!(mirrored.len(), 1);

        let cached = f.cache.groups_for_user("user-1").expect("query failed");
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].name, "Movie Nights");
        assert_eq!(cached[0].members, vec!["user-1".to_string(), "user-2".to_string()]);

        let members = f.cache.group_members("g1").expect("query failed");
        assert_eq!(members[1].email, "two@example.com");
    }

    #[tokio::test]
    async fn test_malformed_document_does_not_block_others() {
        let f = fixture();
        put_user(&f.store, "user-1", "one@example.com").await;
        put_group(&f.store, &Group::new("good", "user-1", "Movie Nights")).await;
        f.store
            .set_document(GROUPS_COLLECTION, "broken", doc(json!({"members": ["user-1"]})))
            .await
            .expect("set failed");

        let mut handle = f.mirror.observe_groups_for_user("user-1").await.expect("observe failed");
        let mirrored = next_groups(&mut handle).await;
        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].group.id, "good");
        assert!(f.cache.get_group("broken").expect("read failed").is_none());
    }

    #[tokio::test]
    async fn test_owner_missing_from_members_is_normalized() {
        let f = fixture();
        f.store
            .set_document(
                GROUPS_COLLECTION,
                "g1",
                doc(json!({"ownerId": "user-9", "name": "Movie Nights", "members": ["user-1"]})),
            )
            .await
            .expect("set failed");

        let mut handle = f.mirror.observe_groups_for_user("user-1").await.expect("observe failed");
        next_groups(&mut handle).await;

        let group = f.cache.get_group("g1").expect("read failed").expect("group missing");
        assert_eq!(group.members, vec!["user-9".to_string(), "user-1".to_string()]);
    }

    struct FlakyLookup;

    #[async_trait]
    impl UserLookup for FlakyLookup {
        async fn lookup_user(&self, user_id: &str) -> RemoteResult<User> {
            if user_id == "flaky" {
                Err(RemoteError::Unavailable)
            } else {
                Ok(User::new(user_id, format!("{}@example.com", user_id)))
            }
        }
    }

    #[tokio::test]
    async fn test_failed_member_lookup_falls_back_to_placeholder() {
        let store = Arc::new(LocalDocumentStore::new());
        let cache = Arc::new(CacheStore::in_memory());
        let mirror = GroupMirror::new(store.clone(), Arc::clone(&cache), Arc::new(FlakyLookup));

        let mut group = Group::new("g1", "user-1", "Movie Nights");
        group.add_member("flaky");
        put_group(&store, &group).await;

        let mut handle = mirror.observe_groups_for_user("user-1").await.expect("observe failed");
        let mirrored = next_groups(&mut handle).await;
        assert_eq!(mirrored[0].members.len(), 2);

        let flaky = cache.get_user("flaky").expect("read failed").expect("user missing");
        assert!(flaky.is_placeholder());
        let owner = cache.get_user("user-1").expect("read failed").expect("user missing");
        assert_eq!(owner.email, "user-1@example.com");
    }

    #[tokio::test]
    async fn test_removed_remote_group_is_deleted_only_if_mirrored() {
        let f = fixture();
        put_group(&f.store, &Group::new("g1", "user-1", "Movie Nights")).await;

        // A row the mirror never wrote
        let (local_row, _) = GroupRow::from_group(&Group::new("local", "user-1", "Drafts"));
        f.cache.upsert_group(local_row).expect("upsert failed");
        f.cache.set_members("local", vec!["user-1".to_string()]).expect("members failed");

        let mut handle = f.mirror.observe_groups_for_user("user-1").await.expect("observe failed");
        next_groups(&mut handle).await;
        f.cache
            .upsert_status(StatusRow::new(StatusKey::new("g1", "user-1", 7), MovieStatus::WatchedByUser))
            .expect("status failed");

        f.store.delete_document(GROUPS_COLLECTION, "g1").await.expect("delete failed");
        let mirrored = next_groups(&mut handle).await;
        assert!(mirrored.is_empty());

        assert!(f.cache.get_group("g1").expect("read failed").is_none());
        assert!(f.cache.statuses_for_group("g1").expect("read failed").is_empty());
        assert!(f.cache.get_group("local").expect("read failed").is_some());
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_published() {
        let f = fixture();
        let mut handle = f.mirror.observe_groups_for_user("user-1").await.expect("observe failed");
        assert!(next_groups(&mut handle).await.is_empty());
        assert_eq!(f.cache.sync_age().expect("read failed").as_deref(), Some("just now"));
    }

    #[tokio::test]
    async fn test_cancel_unregisters_remote_listener() {
        let f = fixture();
        let handle = f.mirror.observe_groups_for_user("user-1").await.expect("observe failed");
        assert_eq!(f.store.listener_count(), 1);

        handle.cancel();
        wait_for_no_listeners(&f.store).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_observe_user_updates_cache() {
        let f = fixture();
        let mut handle = f.mirror.observe_user("user-1").await.expect("observe failed");
        assert_eq!(next(&mut handle).await, None);

        put_user(&f.store, "user-1", "one@example.com").await;
        let user = next(&mut handle).await.expect("user missing");
        assert_eq!(user.email, "one@example.com");

        let row = f.cache.get_user("user-1").expect("read failed").expect("row missing");
        assert_eq!(row.email, "one@example.com");
    }

    #[tokio::test]
    async fn test_remote_delete_while_closed_is_applied_on_restart() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let store = Arc::new(LocalDocumentStore::new());
        let remote: Arc<dyn DocumentStore> = store.clone();
        let lookup: Arc<dyn UserLookup> = Arc::new(RemoteUserLookup::new(Arc::clone(&remote)));
        put_user(&store, "user-1", "one@example.com").await;
        put_group(&store, &Group::new("g1", "user-1", "Movie Nights")).await;

        {
            let cache = Arc::new(CacheStore::open(dir.path()).expect("open failed"));
            let mirror = GroupMirror::new(Arc::clone(&remote), cache, Arc::clone(&lookup));
            let mut handle = mirror.observe_groups_for_user("user-1").await.expect("observe failed");
            assert_eq!(next_groups(&mut handle).await.len(), 1);
        }
        wait_for_no_listeners(&store).await;

        store.delete_document(GROUPS_COLLECTION, "g1").await.expect("delete failed");

        let cache = Arc::new(CacheStore::open(dir.path()).expect("reopen failed"));
        assert_eq!(cache.groups_for_user("user-1").expect("query failed").len(), 1);
        let mirror = GroupMirror::new(remote, Arc::clone(&cache), lookup);
        let mut handle = mirror.observe_groups_for_user("user-1").await.expect("observe failed");
        assert!(next_groups(&mut handle).await.is_empty());
        assert!(cache.groups_for_user("user-1").expect("query failed").is_empty());
    }

    #[tokio::test]
    async fn test_failed_cache_write_is_published() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let store = Arc::new(LocalDocumentStore::new());
        let cache = Arc::new(CacheStore::open(dir.path()).expect("open failed"));
        std::fs::create_dir(dir.path().join("cache.json")).expect("mkdir failed");
        let remote: Arc<dyn DocumentStore> = store.clone();
        let lookup = Arc::new(RemoteUserLookup::new(Arc::clone(&remote)));
        let mirror = GroupMirror::new(remote, Arc::clone(&cache), lookup);
        put_group(&store, &Group::new("g1", "user-1", "Movie Nights")).await;

        let mut handle = mirror.observe_groups_for_user("user-1").await.expect("observe failed");
        let err = next(&mut handle).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Storage);
        assert!(cache.get_group("g1").expect("read failed").is_none());
    }
}
