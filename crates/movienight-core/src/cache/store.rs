use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::models::{Group, MovieStatus, SelectedMovie, StatusKey};

use super::{CacheError, CachedData, GroupRow, MirroredGroup, StatusRow, UserRow};

/// Cache file name in the cache directory
const CACHE_FILE: &str = "cache.json";

#[derive(Debug, Clone, Default)]
struct Tables {
    groups: BTreeMap<String, GroupRow>,
    users: BTreeMap<String, UserRow>,
    /// group id -> member user ids, in display order
    members: BTreeMap<String, Vec<String>>,
    statuses: BTreeMap<StatusKey, MovieStatus>,
    /// user id -> groups the remote mirror wrote for that user
    mirrored: BTreeMap<String, BTreeSet<String>>,
    synced_at: Option<DateTime<Utc>>,
}

/// On-disk layout of the tables.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedTables {
    groups: Vec<GroupRow>,
    users: Vec<UserRow>,
    members: BTreeMap<String, Vec<String>>,
    statuses: Vec<StatusRow>,
    #[serde(default)]
    mirrored: BTreeMap<String, BTreeSet<String>>,
    synced_at: Option<DateTime<Utc>>,
}

impl From<&Tables> for PersistedTables {
    fn from(tables: &Tables) -> Self {
        Self {
            groups: tables.groups.values().cloned().collect(),
            users: tables.users.values().cloned().collect(),
            members: tables.members.clone(),
            statuses: tables
                .statuses
                .iter()
                .map(|(key, status)| StatusRow::new(key.clone(), *status))
                .collect(),
            mirrored: tables.mirrored.clone(),
            synced_at: tables.synced_at,
        }
    }
}

impl From<PersistedTables> for Tables {
    fn from(persisted: PersistedTables) -> Self {
        Self {
            groups: persisted.groups.into_iter().map(|g| (g.id.clone(), g)).collect(),
            users: persisted.users.into_iter().map(|u| (u.id.clone(), u)).collect(),
            members: persisted.members,
            statuses: persisted
                .statuses
                .into_iter()
                .map(|row| (row.key(), row.status))
                .collect(),
            mirrored: persisted.mirrored,
            synced_at: persisted.synced_at,
        }
    }
}

impl Tables {
    fn remove_group(&mut self, group_id: &str) -> bool {
        let removed = self.groups.remove(group_id).is_some();
        self.members.remove(group_id);
        self.statuses.retain(|key, _| key.group_id != group_id);
        removed
    }

    fn require_group(&self, group_id: &str) -> Result<(), CacheError> {
        if self.groups.contains_key(group_id) {
            Ok(())
        } else {
            Err(CacheError::ForeignKey(format!("group {} does not exist", group_id)))
        }
    }

    /// Insert a user row unless a real row is already cached. A placeholder
    /// never replaces real data but is upgraded by it.
    fn merge_user(&mut self, row: &UserRow) {
        match self.users.get(&row.id) {
            Some(existing) if !existing.is_placeholder() && row.is_placeholder() => {}
            _ => {
                if !row.is_placeholder() {
                    self.reconcile_statuses(row);
                }
                self.users.insert(row.id.clone(), row.clone());
            }
        }
    }

    /// Drop the user's own status rows that disagree with the selections
    /// in `row`, which may have been changed from another device.
    fn reconcile_statuses(&mut self, row: &UserRow) {
        let selected = |list: &[SelectedMovie], key: &StatusKey| {
            list.iter().any(|s| s.matches(&key.group_id, key.movie_id))
        };
        self.statuses.retain(|key, status| {
            if key.user_id != row.id || !status.is_own() {
                return true;
            }
            let current = if selected(&row.watched, key) {
                Some(MovieStatus::WatchedByUser)
            } else if selected(&row.to_watch, key) {
                Some(MovieStatus::ToWatchByUser)
            } else {
                None
            };
            current == Some(*status)
        });
    }

    fn build_group(&self, row: &GroupRow) -> Group {
        let members = self.members.get(&row.id).cloned().unwrap_or_default();
        row.clone().into_group(members)
    }
}

/// Owned row store with foreign-key cascade from groups to member and
/// status rows. Writes are serialized by an internal mutex.
pub struct CacheStore {
    tables: Mutex<Tables>,
    path: Option<PathBuf>,
    changes: watch::Sender<u64>,
}

impl CacheStore {
    /// A store that lives only in memory
    pub fn in_memory() -> Self {
        Self::with_tables(Tables::default(), None)
    }

    /// Open (or create) a store persisted under `cache_dir`
    pub fn open(cache_dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        let path = cache_dir.join(CACHE_FILE);
        let tables = Self::load(&path)?;
        debug!(path = %path.display(), groups = tables.groups.len(), "Cache opened");
        Ok(Self::with_tables(tables, Some(path)))
    }

    fn with_tables(tables: Tables, path: Option<PathBuf>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            tables: Mutex::new(tables),
            path,
            changes,
        }
    }

    fn load(path: &Path) -> Result<Tables, CacheError> {
        if !path.exists() {
            return Ok(Tables::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let cached: CachedData<PersistedTables> = serde_json::from_str(&contents)?;
        Ok(cached.data.into())
    }

    fn persist(&self, tables: &Tables) -> Result<(), CacheError> {
        if let Some(ref path) = self.path {
            let cached = CachedData::new(PersistedTables::from(tables));
            let contents = serde_json::to_string_pretty(&cached)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, CacheError> {
        let tables = self.tables.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(f(&tables))
    }

    /// Run a mutation. The closure reports whether anything changed; only
    /// then are the tables persisted and subscribers notified. A write that
    /// cannot be persisted is rolled back so memory never runs ahead of disk.
    fn write<R>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<(R, bool), CacheError>,
    ) -> Result<R, CacheError> {
        let mut tables = self.tables.lock().map_err(|_| CacheError::Poisoned)?;
        let previous = self.path.as_ref().map(|_| tables.clone());
        let (result, changed) = match f(&mut tables) {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Some(previous) = previous {
                    *tables = previous;
                }
                return Err(e);
            }
        };
        if changed {
            if let Err(e) = self.persist(&tables) {
                warn!(error = %e, "Failed to persist cache, change rolled back");
                if let Some(previous) = previous {
                    *tables = previous;
                }
                return Err(e);
            }
            self.changes.send_modify(|version| *version = version.wrapping_add(1));
        }
        Ok(result)
    }

    /// Receiver that observes a new version after every change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// How long ago the remote mirror last wrote a snapshot
    pub fn sync_age(&self) -> Result<Option<String>, CacheError> {
        self.read(|t| {
            t.synced_at.map(|at| {
                CachedData {
                    data: (),
                    cached_at: at,
                }
                .age_display()
            })
        })
    }

    // ===== Groups =====

    pub fn upsert_group(&self, row: GroupRow) -> Result<(), CacheError> {
        self.write(|t| {
            t.members.entry(row.id.clone()).or_default();
            t.groups.insert(row.id.clone(), row);
            Ok(((), true))
        })
    }

    pub fn get_group(&self, group_id: &str) -> Result<Option<Group>, CacheError> {
        self.read(|t| t.groups.get(group_id).map(|row| t.build_group(row)))
    }

    /// Delete a group together with its member and status rows.
    /// Returns false (and changes nothing) when the group is not cached.
    pub fn delete_group(&self, group_id: &str) -> Result<bool, CacheError> {
        self.write(|t| {
            let removed = t.remove_group(group_id);
            Ok((removed, removed))
        })
    }

    /// Groups whose member list contains `user_id`, ordered by name
    pub fn groups_for_user(&self, user_id: &str) -> Result<Vec<Group>, CacheError> {
        self.read(|t| {
            let mut groups: Vec<Group> = t
                .groups
                .values()
                .filter(|row| {
                    t.members
                        .get(&row.id)
                        .map(|m| m.iter().any(|id| id == user_id))
                        .unwrap_or(false)
                })
                .map(|row| t.build_group(row))
                .collect();
            groups.sort_by(|a, b| {
                a.name
                    .to_lowercase()
                    .cmp(&b.name.to_lowercase())
                    .then_with(|| a.id.cmp(&b.id))
            });
            groups
        })
    }

    pub fn group_ids(&self) -> Result<Vec<String>, CacheError> {
        self.read(|t| t.groups.keys().cloned().collect())
    }

    // ===== Members =====

    pub fn set_members(&self, group_id: &str, member_ids: Vec<String>) -> Result<(), CacheError> {
        self.write(|t| {
            t.require_group(group_id)?;
            t.members.insert(group_id.to_string(), member_ids);
            Ok(((), true))
        })
    }

    pub fn add_member(&self, group_id: &str, user_id: &str) -> Result<bool, CacheError> {
        self.write(|t| {
            t.require_group(group_id)?;
            let members = t.members.entry(group_id.to_string()).or_default();
            if members.iter().any(|m| m == user_id) {
                return Ok((false, false));
            }
            members.push(user_id.to_string());
            Ok((true, true))
        })
    }

    pub fn remove_member(&self, group_id: &str, user_id: &str) -> Result<bool, CacheError> {
        self.write(|t| {
            let removed = match t.members.get_mut(group_id) {
                Some(members) => {
                    let before = members.len();
                    members.retain(|m| m != user_id);
                    before != members.len()
                }
                None => false,
            };
            Ok((removed, removed))
        })
    }

    pub fn member_ids(&self, group_id: &str) -> Result<Vec<String>, CacheError> {
        self.read(|t| t.members.get(group_id).cloned().unwrap_or_default())
    }

    /// Member rows of a group; members without a cached user row are skipped
    pub fn group_members(&self, group_id: &str) -> Result<Vec<UserRow>, CacheError> {
        self.read(|t| {
            t.members
                .get(group_id)
                .map(|ids| ids.iter().filter_map(|id| t.users.get(id).cloned()).collect())
                .unwrap_or_default()
        })
    }

    // ===== Users =====

    pub fn upsert_user(&self, row: UserRow) -> Result<(), CacheError> {
        self.write(|t| {
            t.users.insert(row.id.clone(), row);
            Ok(((), true))
        })
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRow>, CacheError> {
        self.read(|t| t.users.get(user_id).cloned())
    }

    // ===== Movie Status =====

    pub fn upsert_status(&self, row: StatusRow) -> Result<(), CacheError> {
        self.write(|t| {
            t.require_group(&row.group_id)?;
            let key = row.key();
            if t.statuses.get(&key) == Some(&row.status) {
                return Ok(((), false));
            }
            t.statuses.insert(key, row.status);
            Ok(((), true))
        })
    }

    pub fn get_status(&self, key: &StatusKey) -> Result<Option<MovieStatus>, CacheError> {
        self.read(|t| t.statuses.get(key).copied())
    }

    pub fn delete_status(&self, key: &StatusKey) -> Result<bool, CacheError> {
        self.write(|t| {
            let removed = t.statuses.remove(key).is_some();
            Ok((removed, removed))
        })
    }

    pub fn statuses_for_group(&self, group_id: &str) -> Result<Vec<StatusRow>, CacheError> {
        self.read(|t| {
            t.statuses
                .iter()
                .filter(|(key, _)| key.group_id == group_id)
                .map(|(key, status)| StatusRow::new(key.clone(), *status))
                .collect()
        })
    }

    // ===== Remote Mirror =====

    /// Groups the mirror of `user_id` has written and not removed since
    pub fn mirrored_group_ids(&self, user_id: &str) -> Result<Vec<String>, CacheError> {
        self.read(|t| {
            t.mirrored
                .get(user_id)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default()
        })
    }

    /// Apply one translated remote snapshot for `user_id` in a single write.
    ///
    /// Every mirrored group is upserted with its members. Groups this
    /// user's mirror wrote earlier (in this or a previous run) whose ids are
    /// not in `present` are deleted; rows the mirror never wrote are left
    /// alone. Returns the ids of the deleted groups.
    pub fn apply_mirror_snapshot(
        &self,
        user_id: &str,
        groups: &[MirroredGroup],
        present: &[String],
    ) -> Result<Vec<String>, CacheError> {
        self.write(|t| {
            for mirrored in groups {
                for member in &mirrored.members {
                    t.merge_user(member);
                }
                t.members.insert(mirrored.group.id.clone(), mirrored.member_ids());
                t.groups.insert(mirrored.group.id.clone(), mirrored.group.clone());
            }

            let written = t.mirrored.entry(user_id.to_string()).or_default();
            let stale: Vec<String> = written
                .iter()
                .filter(|id| !present.contains(id))
                .cloned()
                .collect();
            written.retain(|id| present.contains(id));
            written.extend(groups.iter().map(|g| g.group.id.clone()));

            for group_id in &stale {
                t.remove_group(group_id);
            }
            t.synced_at = Some(Utc::now());
            Ok((stale, true))
        })
    }

    /// Upsert a user row coming from the remote user document
    pub fn apply_mirrored_user(&self, row: UserRow) -> Result<(), CacheError> {
        self.write(|t| {
            if t.users.get(&row.id) == Some(&row) {
                return Ok(((), false));
            }
            t.merge_user(&row);
            Ok(((), true))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    fn group_row(id: &str, owner: &str, name: &str) -> GroupRow {
        GroupRow::from_group(&Group::new(id, owner, name)).0
    }

    fn seed_group(store: &CacheStore, id: &str, owner: &str, name: &str, members: &[&str]) {
        store.upsert_group(group_row(id, owner, name)).expect("upsert failed");
        store
            .set_members(id, members.iter().map(|m| m.to_string()).collect())
            .expect("set members failed");
    }

    #[test]
    fn test_groups_for_user_filters_by_membership() {
        let store = CacheStore::in_memory();
        seed_group(&store, "g1", "user-1", "Movie Nights", &["user-1", "user-2"]);
        seed_group(&store, "g2", "user-3", "Horror Club", &["user-3"]);
        seed_group(&store, "g3", "user-2", "anime", &["user-2", "user-1"]);

        let groups = store.groups_for_user("user-1").expect("query failed");
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["anime", "Movie Nights"]);
        assert!(groups.iter().all(|g| g.has_member("user-1")));

        assert!(store.groups_for_user("nobody").expect("query failed").is_empty());
    }

    #[test]
    fn test_delete_group_cascades_and_is_idempotent() {
        let store = CacheStore::in_memory();
        seed_group(&store, "g1", "user-1", "Movie Nights", &["user-1", "user-2"]);
        seed_group(&store, "g2", "user-1", "Other", &["user-1"]);
        store
            .upsert_status(StatusRow::new(StatusKey::new("g1", "user-1", 10), MovieStatus::WatchedByUser))
            .expect("status failed");
        store
            .upsert_status(StatusRow::new(StatusKey::new("g1", "user-2", 10), MovieStatus::ToWatchByUser))
            .expect("status failed");
        store
            .upsert_status(StatusRow::new(StatusKey::new("g2", "user-1", 10), MovieStatus::ToWatchByUser))
            .expect("status failed");

        assert!(store.delete_group("g1").expect("delete failed"));
        assert!(store.statuses_for_group("g1").expect("query failed").is_empty());
        assert!(store.member_ids("g1").expect("query failed").is_empty());
        assert_eq!(store.statuses_for_group("g2").expect("query failed").len(), 1);

        let version = *store.subscribe().borrow();
        assert!(!store.delete_group("g1").expect("second delete failed"));
        assert_eq!(*store.subscribe().borrow(), version);
    }

    #[test]
    fn test_status_requires_existing_group() {
        let store = CacheStore::in_memory();
        let err = store
            .upsert_status(StatusRow::new(StatusKey::new("missing", "user-1", 1), MovieStatus::WatchedByUser))
            .unwrap_err();
        assert!(matches!(err, CacheError::ForeignKey(_)));

        let err = store.add_member("missing", "user-1").unwrap_err();
        assert!(matches!(err, CacheError::ForeignKey(_)));
    }

    #[test]
    fn test_status_rows_are_per_user() {
        let store = CacheStore::in_memory();
        seed_group(&store, "g1", "user-1", "Movie Nights", &["user-1", "user-2"]);
        let mine = StatusKey::new("g1", "user-1", 10);
        let theirs = StatusKey::new("g1", "user-2", 10);
        store
            .upsert_status(StatusRow::new(theirs.clone(), MovieStatus::ToWatchByUser))
            .expect("status failed");
        store
            .upsert_status(StatusRow::new(mine.clone(), MovieStatus::WatchedByUser))
            .expect("status failed");

        assert_eq!(store.get_status(&mine).expect("read failed"), Some(MovieStatus::WatchedByUser));
        assert_eq!(store.get_status(&theirs).expect("read failed"), Some(MovieStatus::ToWatchByUser));

        assert!(store.delete_status(&mine).expect("delete failed"));
        assert!(!store.delete_status(&mine).expect("delete failed"));
    }

    #[test]
    fn test_writes_notify_subscribers() {
        let store = CacheStore::in_memory();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().expect("sender dropped"));

        store.upsert_group(group_row("g1", "user-1", "Movie Nights")).expect("upsert failed");
        assert!(rx.has_changed().expect("sender dropped"));
        rx.borrow_and_update();

        assert!(!store.remove_member("g1", "nobody").expect("remove failed"));
        assert!(!rx.has_changed().expect("sender dropped"));
    }

    #[test]
    fn test_mirror_snapshot_keeps_real_users_over_placeholders() {
        let store = CacheStore::in_memory();
        store
            .upsert_user(User::new("user-2", "two@example.com").into())
            .expect("upsert failed");

        let mirrored = MirroredGroup {
            group: group_row("g1", "user-1", "Movie Nights"),
            members: vec![
                User::new("user-1", "one@example.com").into(),
                User::placeholder("user-2").into(),
            ],
        };
        store
            .apply_mirror_snapshot("user-1", &[mirrored], &["g1".to_string()])
            .expect("apply failed");

        let members = store.group_members("g1").expect("query failed");
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].email, "two@example.com");
        assert_eq!(store.sync_age().expect("read failed").as_deref(), Some("just now"));
    }

    #[test]
    fn test_persisted_store_reopens_with_rows() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        {
            let store = CacheStore::open(dir.path()).expect("open failed");
            seed_group(&store, "g1", "user-1", "Movie Nights", &["user-1"]);
            store
                .upsert_status(StatusRow::new(StatusKey::new("g1", "user-1", 5), MovieStatus::ToWatchByUser))
                .expect("status failed");
        }

        let store = CacheStore::open(dir.path()).expect("reopen failed");
        let group = store.get_group("g1").expect("read failed").expect("group missing");
        assert_eq!(group.name, "Movie Nights");
        assert_eq!(group.members, vec!["user-1".to_string()]);
        assert_eq!(
            store.get_status(&StatusKey::new("g1", "user-1", 5)).expect("read failed"),
            Some(MovieStatus::ToWatchByUser)
        );
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let store = CacheStore::open(dir.path()).expect("open failed");
        // A directory where the cache file belongs makes every write fail
        std::fs::create_dir(dir.path().join(CACHE_FILE)).expect("mkdir failed");
        let rx = store.subscribe();

        let err = store.upsert_group(group_row("g1", "user-1", "Movie Nights")).unwrap_err();
        assert!(matches!(err, CacheError::Io(_)));
        assert!(store.get_group("g1").expect("read failed").is_none());
        assert!(!rx.has_changed().expect("sender dropped"));
    }

    #[test]
    fn test_mirrored_ids_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let mirrored = MirroredGroup {
            group: group_row("g1", "user-1", "Movie Nights"),
            members: vec![User::new("user-1", "one@example.com").into()],
        };
        {
            let store = CacheStore::open(dir.path()).expect("open failed");
            store
                .apply_mirror_snapshot("user-1", &[mirrored], &["g1".to_string()])
                .expect("apply failed");
        }

        let store = CacheStore::open(dir.path()).expect("reopen failed");
        assert_eq!(store.mirrored_group_ids("user-1").expect("read failed"), vec!["g1".to_string()]);

        let removed = store.apply_mirror_snapshot("user-1", &[], &[]).expect("apply failed");
        assert_eq!(removed, vec!["g1".to_string()]);
        assert!(store.get_group("g1").expect("read failed").is_none());
        assert!(store.mirrored_group_ids("user-1").expect("read failed").is_empty());
    }

    #[test]
    fn test_snapshot_keeps_groups_it_never_wrote() {
        let store = CacheStore::in_memory();
        seed_group(&store, "local", "user-1", "Drafts", &["user-1"]);

        let removed = store.apply_mirror_snapshot("user-1", &[], &[]).expect("apply failed");
        assert!(removed.is_empty());
        assert!(store.get_group("local").expect("read failed").is_some());
    }

    #[test]
    fn test_mirrored_user_drops_outdated_status_rows() {
        let store = CacheStore::in_memory();
        seed_group(&store, "g1", "user-1", "Movie Nights", &["user-1"]);
        let mut user = User::new("user-1", "one@example.com");
        user.select_to_watch("g1", 10);
        user.select_watched("g1", 11);
        store.apply_mirrored_user(user.clone().into()).expect("apply failed");
        store
            .upsert_status(StatusRow::new(StatusKey::new("g1", "user-1", 10), MovieStatus::ToWatchByUser))
            .expect("status failed");
        store
            .upsert_status(StatusRow::new(StatusKey::new("g1", "user-1", 11), MovieStatus::WatchedByUser))
            .expect("status failed");

        // Another device moved movie 10 to watched
        user.select_watched("g1", 10);
        store.apply_mirrored_user(user.into()).expect("apply failed");

        assert_eq!(store.get_status(&StatusKey::new("g1", "user-1", 10)).expect("read failed"), None);
        assert_eq!(
            store.get_status(&StatusKey::new("g1", "user-1", 11)).expect("read failed"),
            Some(MovieStatus::WatchedByUser)
        );
    }
}
