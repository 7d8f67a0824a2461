//! The record-store capability: the persistence seam the gateway talks to.
//!
//! Every backend stores asset records in the `upload_file` collection and
//! an opaque settings blob per key. Backends differ in query dialect; the
//! search strategy paired with a backend produces a `SearchQuery` it
//! understands.

use crate::{
    models::{
        file::{AssetRecord, FileUpdate, NewFile},
        query::FindParams,
    },
    services::search::SearchQuery,
};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Logical collection holding asset records.
pub const FILE_COLLECTION: &str = "upload_file";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{store} store cannot execute a {query} query")]
    DialectMismatch {
        store: &'static str,
        query: &'static str,
    },
    #[error("malformed query: {0}")]
    MalformedQuery(String),
    #[error(transparent)]
    Regex(#[from] regex::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short dialect name for logs and readiness output.
    fn dialect(&self) -> &'static str;

    async fn create(&self, file: &NewFile) -> StoreResult<AssetRecord>;

    /// Apply `update` to the record; `None` if no record has that id.
    async fn update(&self, id: Uuid, update: &FileUpdate) -> StoreResult<Option<AssetRecord>>;

    async fn find_one(&self, id: Uuid) -> StoreResult<Option<AssetRecord>>;

    async fn find(&self, params: &FindParams) -> StoreResult<Vec<AssetRecord>>;

    async fn count(&self, params: &FindParams) -> StoreResult<u64>;

    /// Remove the record; returns what was removed.
    async fn delete(&self, id: Uuid) -> StoreResult<Option<AssetRecord>>;

    async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<AssetRecord>>;

    async fn count_search(&self, query: &SearchQuery) -> StoreResult<u64>;

    /// Cheap round-trip used by readiness checks.
    async fn ping(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    async fn set(&self, key: &str, value: &Value) -> StoreResult<()>;
}
