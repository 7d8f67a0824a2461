//! UploadService: turns confirmed upload intents into persisted asset
//! records, and owns the record lifecycle after that (describe, remove,
//! attach to an owning entity).

use crate::{
    config::UploadConfig,
    errors::UploadError,
    models::{
        actor::Actor,
        file::{AssetRecord, FileInfo, FileInfoUpdate, FileUpdate, PROVIDER, UploadMetas},
    },
    services::{
        events::MediaEventKind,
        formatter::{enhance_file, is_image},
        gateway::PersistenceGateway,
    },
};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Owning entity for inline attachments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityRef {
    pub id: String,
    pub model: String,
    pub field: String,
}

impl EntityRef {
    /// Linkage named by upload metas; `refId`, `ref` and `field` are all
    /// required.
    pub fn from_metas(metas: &UploadMetas) -> Result<Self, UploadError> {
        let required = |value: &Option<String>, key: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| UploadError::InvalidRequest(format!("{} is required", key)))
        };
        Ok(Self {
            id: required(&metas.ref_id, "refId")?,
            model: required(&metas.ref_, "ref")?,
            field: required(&metas.field, "field")?,
        })
    }
}

/// Public locator for an object. Images get a browser-resolvable S3 URL;
/// anything else gets an `S3://` locator.
pub fn derive_url(bucket: &str, key: &str, image: bool, region: Option<&str>) -> String {
    match (image, region) {
        (true, Some(region)) => format!("https://{}.s3-{}.amazonaws.com/{}", bucket, region, key),
        (true, None) => format!("https://{}.s3.amazonaws.com/{}", bucket, key),
        (false, _) => format!("S3://{}/{}", bucket, key),
    }
}

#[derive(Clone)]
pub struct UploadService {
    config: Arc<UploadConfig>,
    gateway: PersistenceGateway,
}

impl UploadService {
    pub fn new(config: Arc<UploadConfig>, gateway: PersistenceGateway) -> Self {
        Self { config, gateway }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn gateway(&self) -> &PersistenceGateway {
        &self.gateway
    }

    /// Persist every intent concurrently and return records in input order.
    ///
    /// All intents run to completion. If any failed, the batch fails with
    /// the first failing index and the ids that were persisted anyway.
    #[instrument(skip_all, fields(files = files.len()))]
    pub async fn upload(
        &self,
        files: Vec<FileInfo>,
        metas: &UploadMetas,
        actor: Option<&Actor>,
    ) -> Result<Vec<AssetRecord>, UploadError> {
        let results = self.upload_each(files, metas, actor).await;

        let succeeded: Vec<Uuid> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|record| record.id))
            .collect();

        let mut records = Vec::with_capacity(results.len());
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(record) => records.push(record),
                Err(source) => {
                    warn!(index, persisted = succeeded.len(), "batch upload failed");
                    return Err(UploadError::BatchFailed {
                        index,
                        source: Box::new(source),
                        succeeded,
                    });
                }
            }
        }

        info!(count = records.len(), "files uploaded");
        Ok(records)
    }

    /// Per-intent outcome, positionally matched to `files`.
    pub async fn upload_each(
        &self,
        files: Vec<FileInfo>,
        metas: &UploadMetas,
        actor: Option<&Actor>,
    ) -> Vec<Result<AssetRecord, UploadError>> {
        join_all(
            files
                .iter()
                .map(|info| self.upload_file_and_persist(info, metas, actor)),
        )
        .await
    }

    async fn upload_file_and_persist(
        &self,
        info: &FileInfo,
        metas: &UploadMetas,
        actor: Option<&Actor>,
    ) -> Result<AssetRecord, UploadError> {
        let draft = enhance_file(info, metas);
        let image = draft.name.as_deref().is_some_and(is_image);
        let url = derive_url(
            &draft.bucket,
            &draft.key,
            image,
            self.config.aws_region.as_deref(),
        );
        self.gateway
            .create(draft.into_new_file(url, PROVIDER), actor)
            .await
    }

    /// Replace `name`, `alternativeText` and `caption`. Absent values keep
    /// what is stored.
    #[instrument(skip(self, info, actor))]
    pub async fn update_file_info(
        &self,
        id: Uuid,
        info: FileInfoUpdate,
        actor: Option<&Actor>,
    ) -> Result<AssetRecord, UploadError> {
        let existing = self
            .gateway
            .find_one(id)
            .await?
            .ok_or_else(|| UploadError::NotFound("file not found".into()))?;

        let update = FileUpdate {
            name: info.name.or(existing.name),
            alternative_text: info.alternative_text.or(existing.alternative_text),
            caption: info.caption.or(existing.caption),
            updated_by: None,
        };
        self.gateway.update(id, update, actor).await
    }

    /// Replacing the bytes behind a record needs the client-side flow to
    /// re-issue a credential first.
    pub async fn replace(
        &self,
        _id: Uuid,
        _info: FileInfoUpdate,
        _actor: Option<&Actor>,
    ) -> Result<AssetRecord, UploadError> {
        Err(UploadError::Unimplemented("file replacement"))
    }

    /// Emit a delete event with the stored snapshot, then drop the record.
    /// The object itself stays in the bucket.
    #[instrument(skip_all, fields(id = %file.id))]
    pub async fn remove(&self, file: &AssetRecord) -> Result<AssetRecord, UploadError> {
        if let Err(err) = self.delete_object(file).await {
            warn!(key = %file.key, "object left in bucket: {}", err);
        }

        let snapshot = self
            .gateway
            .find_one(file.id)
            .await?
            .ok_or_else(|| UploadError::NotFound("file not found".into()))?;
        self.gateway
            .events()
            .emit(MediaEventKind::Delete, snapshot.sanitized());

        self.gateway
            .delete(file.id)
            .await?
            .ok_or_else(|| UploadError::NotFound("file not found".into()))
    }

    async fn delete_object(&self, _file: &AssetRecord) -> Result<(), UploadError> {
        Err(UploadError::Unimplemented("provider object deletion"))
    }

    /// Persist attachments submitted inline with an entity's edit form,
    /// linking each to the entity.
    #[instrument(skip(self, files))]
    pub async fn upload_to_entity(
        &self,
        entity: &EntityRef,
        files: Vec<FileInfo>,
        source: Option<&str>,
    ) -> Result<Vec<AssetRecord>, UploadError> {
        let metas = UploadMetas {
            ref_id: Some(entity.id.clone()),
            ref_: Some(entity.model.clone()),
            source: source.map(str::to_string),
            field: Some(entity.field.clone()),
            path: None,
        };
        self.upload(files, &metas, None).await
    }
}
