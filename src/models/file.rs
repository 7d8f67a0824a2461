//! Represents an uploaded media asset and the shapes it passes through
//! on its way into the record store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storage backend tag written on every record this service persists.
pub const PROVIDER: &str = "S3";

/// Link between an asset and the entity that owns it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelatedLink {
    #[serde(rename = "refId")]
    pub ref_id: String,
    #[serde(rename = "ref")]
    pub ref_: String,
    pub source: Option<String>,
    pub field: String,
}

/// A persisted asset record.
///
/// The record describes an object that lives in the bucket; it never holds
/// the object bytes. `url` is always derived server-side from the storage
/// coordinates and is never taken from client input.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AssetRecord {
    /// Identifier assigned by the record store.
    pub id: Uuid,

    pub name: Option<String>,

    #[serde(rename = "alternativeText")]
    pub alternative_text: Option<String>,

    pub caption: Option<String>,

    /// Content hash supplied by the client.
    pub hash: String,

    /// Extension of the original filename, including the leading dot.
    pub ext: String,

    pub mime: String,

    /// Size in kilobytes, rounded to two decimals.
    pub size: f64,

    #[serde(rename = "Bucket")]
    pub bucket: String,

    #[serde(rename = "Key")]
    pub key: String,

    pub url: String,

    pub provider: String,

    #[serde(default)]
    pub related: Vec<RelatedLink>,

    pub path: Option<String>,

    pub created_by: Option<String>,

    pub updated_by: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl AssetRecord {
    /// Public-safe projection used for events and public responses.
    pub fn sanitized(&self) -> SanitizedMedia {
        SanitizedMedia {
            id: self.id,
            name: self.name.clone(),
            alternative_text: self.alternative_text.clone(),
            caption: self.caption.clone(),
            hash: self.hash.clone(),
            ext: self.ext.clone(),
            mime: self.mime.clone(),
            size: self.size,
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            url: self.url.clone(),
            provider: self.provider.clone(),
            related: self.related.clone(),
            path: self.path.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// An asset record without audit identities.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SanitizedMedia {
    pub id: Uuid,
    pub name: Option<String>,
    #[serde(rename = "alternativeText")]
    pub alternative_text: Option<String>,
    pub caption: Option<String>,
    pub hash: String,
    pub ext: String,
    pub mime: String,
    pub size: f64,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    pub url: String,
    pub provider: String,
    pub related: Vec<RelatedLink>,
    pub path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a controller hands back for a record, depending on who asked.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MediaView {
    Full(AssetRecord),
    Public(SanitizedMedia),
}

/// Client-supplied description of an object already written (or about to
/// be written) to the bucket through an issued credential.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct FileInfo {
    pub name: Option<String>,
    pub filename: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: f64,
    pub hash: String,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "alternativeText")]
    pub alternative_text: Option<String>,
    pub caption: Option<String>,
}

/// Linkage metadata sent alongside `fileInfo`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct UploadMetas {
    #[serde(rename = "refId")]
    pub ref_id: Option<String>,
    #[serde(rename = "ref")]
    pub ref_: Option<String>,
    pub source: Option<String>,
    pub field: Option<String>,
    pub path: Option<String>,
}

/// Output of the metadata formatter; not yet addressable.
#[derive(Clone, Debug, PartialEq)]
pub struct FileDraft {
    pub name: Option<String>,
    pub alternative_text: Option<String>,
    pub caption: Option<String>,
    pub hash: String,
    pub ext: String,
    pub mime: String,
    pub size: f64,
    pub bucket: String,
    pub key: String,
    pub related: Vec<RelatedLink>,
    pub path: Option<String>,
}

impl FileDraft {
    pub fn into_new_file(self, url: String, provider: &str) -> NewFile {
        NewFile {
            name: self.name,
            alternative_text: self.alternative_text,
            caption: self.caption,
            hash: self.hash,
            ext: self.ext,
            mime: self.mime,
            size: self.size,
            bucket: self.bucket,
            key: self.key,
            url,
            provider: provider.to_string(),
            related: self.related,
            path: self.path,
            created_by: None,
            updated_by: None,
        }
    }
}

/// Everything the record store needs to insert a record.
#[derive(Clone, Debug, PartialEq)]
pub struct NewFile {
    pub name: Option<String>,
    pub alternative_text: Option<String>,
    pub caption: Option<String>,
    pub hash: String,
    pub ext: String,
    pub mime: String,
    pub size: f64,
    pub bucket: String,
    pub key: String,
    pub url: String,
    pub provider: String,
    pub related: Vec<RelatedLink>,
    pub path: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

/// Field replacement applied by `update`. `None` leaves a field untouched.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct FileUpdate {
    pub name: Option<String>,
    pub alternative_text: Option<String>,
    pub caption: Option<String>,
    pub updated_by: Option<String>,
}

/// The three descriptive fields a client may edit after upload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct FileInfoUpdate {
    pub name: Option<String>,
    #[serde(rename = "alternativeText")]
    pub alternative_text: Option<String>,
    pub caption: Option<String>,
}
