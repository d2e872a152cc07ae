//! Remote document store boundary.
//!
//! This module defines the `DocumentStore` contract the repository and the
//! remote mirror consume: point reads, writes, deletes, and live queries.
//! Live queries hand back a `Subscription` that receives a full snapshot
//! every time a matching document changes and closes its channel when
//! cancelled or dropped.
//!
//! `LocalDocumentStore` is an in-process implementation with optional
//! JSON-file persistence.

pub mod documents;
pub mod local;
pub mod subscription;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use thiserror::Error;

pub use documents::{GroupDocument, UserDocument, MEMBERS_FIELD};
pub use local::LocalDocumentStore;
pub use subscription::{ListenerRegistration, Subscription};

/// Collection holding one document per group
pub const GROUPS_COLLECTION: &str = "groups";

/// Collection holding one document per user
pub const USERS_COLLECTION: &str = "users";

/// Length of generated document ids
const DOCUMENT_ID_LENGTH: usize = 20;

/// A document in the store's native shape: a JSON object.
pub type Document = serde_json::Map<String, Value>;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote store unavailable")]
    Unavailable,

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Malformed document {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("Remote store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A convenience type alias for `Result<T, RemoteError>`.
pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub data: Document,
}

/// Every document matching a query at one point in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySnapshot {
    pub documents: Vec<DocumentSnapshot>,
}

impl QuerySnapshot {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// A single document by id
    Document { collection: String, id: String },
    /// Documents of a collection whose array `field` contains `value`
    ArrayContains {
        collection: String,
        field: String,
        value: Value,
    },
}

impl Query {
    pub fn document(collection: &str, id: &str) -> Self {
        Query::Document {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn array_contains(collection: &str, field: &str, value: impl Into<Value>) -> Self {
        Query::ArrayContains {
            collection: collection.to_string(),
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Query::Document { collection, .. } | Query::ArrayContains { collection, .. } => collection,
        }
    }

    pub fn matches(&self, collection: &str, id: &str, data: &Document) -> bool {
        if collection != self.collection() {
            return false;
        }
        match self {
            Query::Document { id: wanted, .. } => wanted == id,
            Query::ArrayContains { field, value, .. } => data
                .get(field)
                .and_then(Value::as_array)
                .map(|items| items.contains(value))
                .unwrap_or(false),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: &str, id: &str) -> RemoteResult<Option<Document>>;

    /// Create or fully replace a document
    async fn set_document(&self, collection: &str, id: &str, data: Document) -> RemoteResult<()>;

    /// Merge `fields` into an existing document; `NotFound` if it is missing
    async fn update_fields(&self, collection: &str, id: &str, fields: Document) -> RemoteResult<()>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete_document(&self, collection: &str, id: &str) -> RemoteResult<()>;

    /// Start a live query. The current result is delivered immediately.
    async fn subscribe(&self, query: Query) -> RemoteResult<Subscription>;
}

/// Generate an id for a new document.
pub fn new_document_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DOCUMENT_ID_LENGTH)
        .map(char::from)
        .collect()
}
