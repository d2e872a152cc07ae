//! Repository façade over the cache, the remote store and the catalogue.
//!
//! Reads of groups and users come from the cache as live streams that
//! re-emit whenever the cache changes. Commands write to the remote store
//! only; the cache converges through the group mirror started by
//! `sync_groups_for_user`. Catalogue calls are read-through with no
//! caching. Every operation returns `RepoResult`, so lower-layer failures
//! reach callers as an `AppError` value.

mod live;
mod status;

use std::sync::Arc;

use futures::stream::BoxStream;
use tracing::{debug, info};

use crate::api::CatalogClient;
use crate::cache::CacheStore;
use crate::error::{AppError, ErrorKind};
use crate::models::{Group, Movie, MoviePage, User};
use crate::remote::{
    new_document_id, Document, DocumentStore, GroupDocument, UserDocument, GROUPS_COLLECTION,
    USERS_COLLECTION,
};
use crate::sync::{GroupMirror, GroupSnapshot, MirrorHandle, RemoteUserLookup};
use crate::validation::{validate_email, validate_group_name, validate_user_id};

use live::watch_cache;

/// A convenience type alias for `Result<T, AppError>`.
pub type RepoResult<T> = Result<T, AppError>;

pub struct Repository {
    cache: Arc<CacheStore>,
    remote: Arc<dyn DocumentStore>,
    catalog: CatalogClient,
    mirror: GroupMirror,
}

impl Repository {
    pub fn new(cache: Arc<CacheStore>, remote: Arc<dyn DocumentStore>, catalog: CatalogClient) -> Self {
        let users = Arc::new(RemoteUserLookup::new(Arc::clone(&remote)));
        let mirror = GroupMirror::new(Arc::clone(&remote), Arc::clone(&cache), users);
        Self {
            cache,
            remote,
            catalog,
            mirror,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn catalog(&self) -> &CatalogClient {
        &self.catalog
    }

    // ===== Live Reads =====

    /// Groups `user_id` belongs to, re-emitted on every cache change
    pub fn get_my_groups(&self, user_id: &str) -> BoxStream<'static, RepoResult<Vec<Group>>> {
        let user_id = user_id.to_string();
        watch_cache(Arc::clone(&self.cache), move |cache| {
            Ok(cache.groups_for_user(&user_id)?)
        })
    }

    /// A single cached group; None while it is not (or no longer) cached
    pub fn observe_group(&self, group_id: &str) -> BoxStream<'static, RepoResult<Option<Group>>> {
        let group_id = group_id.to_string();
        watch_cache(Arc::clone(&self.cache), move |cache| Ok(cache.get_group(&group_id)?))
    }

    pub fn observe_user(&self, user_id: &str) -> BoxStream<'static, RepoResult<Option<User>>> {
        let user_id = user_id.to_string();
        watch_cache(Arc::clone(&self.cache), move |cache| {
            Ok(cache.get_user(&user_id)?.map(|row| row.into_user()))
        })
    }

    // ===== Sync =====

    /// Start mirroring the remote groups of `user_id` into the cache.
    /// Mirroring stops when the returned handle is cancelled or dropped.
    pub async fn sync_groups_for_user(
        &self,
        user_id: &str,
    ) -> RepoResult<MirrorHandle<GroupSnapshot>> {
        Ok(self.mirror.observe_groups_for_user(user_id).await?)
    }

    /// Keep the cached row of `user_id` in step with its remote document
    pub async fn sync_user(&self, user_id: &str) -> RepoResult<MirrorHandle<Option<User>>> {
        Ok(self.mirror.observe_user(user_id).await?)
    }

    /// How long ago the mirror last wrote to the cache, for display
    pub fn sync_age(&self) -> RepoResult<Option<String>> {
        Ok(self.cache.sync_age()?)
    }

    // ===== Groups =====

    /// Read a group, from the cache if present, else from the remote store
    pub async fn get_group(&self, group_id: &str) -> RepoResult<Group> {
        if let Some(group) = self.cache.get_group(group_id)? {
            return Ok(group);
        }
        self.fetch_remote_group(group_id).await
    }

    pub async fn create_group(&self, name: &str, owner_id: &str) -> RepoResult<Group> {
        validate_group_name(name)?;
        validate_user_id(owner_id)?;

        let group = Group::new(new_document_id(), owner_id, name.trim());
        self.write_group(&group).await?;
        info!(group_id = %group.id, owner = owner_id, "Group created");
        Ok(group)
    }

    /// Replace the remote group document. Last write wins.
    pub async fn update_group(&self, group: &Group) -> RepoResult<Group> {
        validate_group_name(&group.name)?;
        let mut group = group.clone();
        group.normalize_owner();
        group.touch();
        self.write_group(&group).await?;
        Ok(group)
    }

    /// Delete a group. Deleting a group that does not exist succeeds.
    pub async fn delete_group(&self, group_id: &str) -> RepoResult<()> {
        self.remote.delete_document(GROUPS_COLLECTION, group_id).await?;
        info!(group_id = group_id, "Group deleted");
        Ok(())
    }

    /// Add `user_id` to a group. Adding an existing member is a no-op.
    pub async fn add_member(&self, group_id: &str, user_id: &str) -> RepoResult<Group> {
        validate_user_id(user_id)?;
        let mut group = self.fetch_remote_group(group_id).await?;
        if !group.add_member(user_id) {
            debug!(group_id = group_id, user_id = user_id, "Already a member");
            return Ok(group);
        }
        group.touch();
        self.update_group_fields(&group, &["members"]).await?;
        Ok(group)
    }

    /// Remove `user_id` from a group. The owner cannot be removed.
    pub async fn delete_member(&self, group_id: &str, user_id: &str) -> RepoResult<Group> {
        let mut group = self.fetch_remote_group(group_id).await?;
        if group.is_owner(user_id) {
            return Err(AppError::group("The group owner cannot be removed"));
        }
        if !group.remove_member(user_id) {
            return Ok(group);
        }
        group.touch();
        self.update_group_fields(&group, &["members"]).await?;
        Ok(group)
    }

    async fn fetch_remote_group(&self, group_id: &str) -> RepoResult<Group> {
        let data = self
            .remote
            .get_document(GROUPS_COLLECTION, group_id)
            .await?
            .ok_or_else(|| AppError::group(format!("Group not found: {}", group_id)))?;
        Ok(GroupDocument::parse(group_id, &data)?.into_group(group_id)?)
    }

    async fn write_group(&self, group: &Group) -> RepoResult<()> {
        let data = GroupDocument::from_group(group).to_document()?;
        self.remote.set_document(GROUPS_COLLECTION, &group.id, data).await?;
        Ok(())
    }

    /// Merge the named fields of `group` plus its timestamp into the
    /// remote document.
    async fn update_group_fields(&self, group: &Group, fields: &[&str]) -> RepoResult<()> {
        let full = GroupDocument::from_group(group).to_document()?;
        let mut data = Document::new();
        for field in fields.iter().chain(["updatedAt"].iter()) {
            if let Some(value) = full.get(*field) {
                data.insert(field.to_string(), value.clone());
            }
        }
        self.remote.update_fields(GROUPS_COLLECTION, &group.id, data).await?;
        Ok(())
    }

    // ===== Users =====

    /// Register an account document for `user_id`
    pub async fn create_user(&self, user_id: &str, email: &str) -> RepoResult<User> {
        validate_user_id(user_id)?;
        validate_email(email)?;

        if self.remote.get_document(USERS_COLLECTION, user_id).await?.is_some() {
            return Err(AppError::login(format!("An account already exists for {}", user_id)));
        }
        let user = User::new(user_id, email.trim());
        self.write_user(&user).await?;
        info!(user_id = user_id, "User created");
        Ok(user)
    }

    /// Read a user, from the cache if a real row is present, else remotely
    pub async fn get_user_by_id(&self, user_id: &str) -> RepoResult<User> {
        if let Some(row) = self.cache.get_user(user_id)? {
            if !row.is_placeholder() {
                return Ok(row.into_user());
            }
        }
        self.fetch_remote_user(user_id).await
    }

    /// Like `get_user_by_id`, but a user with no account is `None` rather
    /// than an error
    pub async fn find_user(&self, user_id: &str) -> RepoResult<Option<User>> {
        if let Some(row) = self.cache.get_user(user_id)? {
            if !row.is_placeholder() {
                return Ok(Some(row.into_user()));
            }
        }
        match self.remote.get_document(USERS_COLLECTION, user_id).await? {
            Some(data) => Ok(Some(UserDocument::parse(user_id, &data)?.into_user(user_id))),
            None => Ok(None),
        }
    }

    pub async fn update_user(&self, user: &User) -> RepoResult<()> {
        validate_email(&user.email)?;
        self.write_user(user).await
    }

    pub async fn delete_user(&self, user_id: &str) -> RepoResult<()> {
        self.remote.delete_document(USERS_COLLECTION, user_id).await?;
        info!(user_id = user_id, "User deleted");
        Ok(())
    }

    async fn fetch_remote_user(&self, user_id: &str) -> RepoResult<User> {
        let data = self
            .remote
            .get_document(USERS_COLLECTION, user_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorKind::Generic, format!("User not found: {}", user_id)))?;
        Ok(UserDocument::parse(user_id, &data)?.into_user(user_id))
    }

    async fn write_user(&self, user: &User) -> RepoResult<()> {
        let data = UserDocument::from_user(user).to_document()?;
        self.remote.set_document(USERS_COLLECTION, &user.id, data).await?;
        Ok(())
    }

    // ===== Catalogue =====

    pub async fn search_tmdb_movie_by_name(&self, query: &str, page: u32) -> RepoResult<MoviePage> {
        Ok(self.catalog.search_movies(query, page).await?)
    }

    pub async fn get_popular_movies(&self, page: u32) -> RepoResult<MoviePage> {
        Ok(self.catalog.popular_movies(page).await?)
    }

    pub async fn get_movies_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<Movie>> {
        Ok(self.catalog.movies_by_ids(ids).await?)
    }
}
