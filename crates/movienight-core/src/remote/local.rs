//! In-process document store.
//!
//! Keeps collections in memory, fans snapshots out to live queries after
//! every write, and optionally persists all collections to a JSON file so
//! the CLI can share state between runs.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    Document, DocumentSnapshot, DocumentStore, ListenerRegistration, Query, QuerySnapshot,
    RemoteError, RemoteResult, Subscription,
};

type Collections = BTreeMap<String, BTreeMap<String, Document>>;

struct Listener {
    query: Query,
    sender: mpsc::UnboundedSender<QuerySnapshot>,
}

struct State {
    collections: Collections,
    listeners: HashMap<u64, Listener>,
    next_listener_id: u64,
    available: bool,
}

impl State {
    fn snapshot(&self, query: &Query) -> QuerySnapshot {
        let documents = self
            .collections
            .get(query.collection())
            .map(|docs| {
                docs.iter()
                    .filter(|(id, data)| query.matches(query.collection(), id, data))
                    .map(|(id, data)| DocumentSnapshot {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        QuerySnapshot { documents }
    }

    /// Push a fresh snapshot to every listener on `collection`, dropping
    /// listeners whose receiver has gone away.
    fn notify(&mut self, collection: &str) {
        let mut closed = Vec::new();
        for (id, listener) in &self.listeners {
            if listener.query.collection() != collection {
                continue;
            }
            let snapshot = self.snapshot(&listener.query);
            if listener.sender.send(snapshot).is_err() {
                closed.push(*id);
            }
        }
        for id in closed {
            debug!(listener = id, "Dropping closed listener");
            self.listeners.remove(&id);
        }
    }
}

struct Inner {
    state: Mutex<State>,
    path: Option<PathBuf>,
}

impl Inner {
    fn lock(&self) -> RemoteResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| RemoteError::Unavailable)
    }
}

#[derive(Clone)]
pub struct LocalDocumentStore {
    inner: Arc<Inner>,
}

impl Default for LocalDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalDocumentStore {
    /// A store that lives only in memory
    pub fn new() -> Self {
        Self::with_collections(Collections::new(), None)
    }

    /// Open (or create) a store persisted at `path`
    pub fn open(path: impl Into<PathBuf>) -> RemoteResult<Self> {
        let path = path.into();
        let collections = Self::load(&path)?;
        Ok(Self::with_collections(collections, Some(path)))
    }

    fn with_collections(collections: Collections, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    collections,
                    listeners: HashMap::new(),
                    next_listener_id: 0,
                    available: true,
                }),
                path,
            }),
        }
    }

    fn load(path: &Path) -> RemoteResult<Collections> {
        if !path.exists() {
            return Ok(Collections::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn persist(&self, state: &State) -> RemoteResult<()> {
        if let Some(ref path) = self.inner.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(&state.collections)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Simulate losing (or regaining) the connection. While unavailable
    /// every operation fails with `RemoteError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        match self.inner.lock() {
            Ok(mut state) => state.available = available,
            Err(e) => warn!(error = %e, "Failed to toggle store availability"),
        }
    }

    /// Number of live queries currently registered
    pub fn listener_count(&self) -> usize {
        self.inner.lock().map(|s| s.listeners.len()).unwrap_or(0)
    }

    fn connected(&self) -> RemoteResult<MutexGuard<'_, State>> {
        let state = self.inner.lock()?;
        if !state.available {
            return Err(RemoteError::Unavailable);
        }
        Ok(state)
    }

    fn commit(&self, mut state: MutexGuard<'_, State>, collection: &str) -> RemoteResult<()> {
        self.persist(&state)?;
        state.notify(collection);
        Ok(())
    }
}

struct LocalRegistration {
    id: u64,
    inner: Weak<Inner>,
}

impl ListenerRegistration for LocalRegistration {
    fn remove(&self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut state) = inner.lock() {
                state.listeners.remove(&self.id);
            }
        }
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn get_document(&self, collection: &str, id: &str) -> RemoteResult<Option<Document>> {
        let state = self.connected()?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn set_document(&self, collection: &str, id: &str, data: Document) -> RemoteResult<()> {
        let mut state = self.connected()?;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        self.commit(state, collection)
    }

    async fn update_fields(&self, collection: &str, id: &str, fields: Document) -> RemoteResult<()> {
        let mut state = self.connected()?;
        let doc = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| RemoteError::NotFound(format!("{}/{}", collection, id)))?;
        for (key, value) in fields {
            doc.insert(key, value);
        }
        self.commit(state, collection)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> RemoteResult<()> {
        let mut state = self.connected()?;
        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if !removed {
            return Ok(());
        }
        self.commit(state, collection)
    }

    async fn subscribe(&self, query: Query) -> RemoteResult<Subscription> {
        let mut state = self.connected()?;
        let (sender, receiver) = mpsc::unbounded_channel();

        // Deliver the current result before any change happens
        let _ = sender.send(state.snapshot(&query));

        let id = state.next_listener_id;
        state.next_listener_id += 1;
        state.listeners.insert(id, Listener { query, sender });

        let registration = LocalRegistration {
            id,
            inner: Arc::downgrade(&self.inner),
        };
        Ok(Subscription::new(receiver, Box::new(registration)))
    }
}
