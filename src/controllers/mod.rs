//! Caller-facing operations, in two flavours selected per request:
//! privileged callers get full records and settings access, public callers
//! get sanitized records and no settings.

pub mod admin;
pub mod api;

use crate::{
    errors::UploadError,
    models::{
        actor::{Actor, RequestContext},
        file::{AssetRecord, MediaView, SanitizedMedia},
        query::FindParams,
        settings::UploadSettings,
    },
    services::{
        upload_service::{EntityRef, UploadService},
        validation::{validate_update_body, validate_upload_body},
    },
};
use admin::AdminController;
use api::ApiController;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::{str::FromStr, sync::Arc};
use tracing::debug;
use uuid::Uuid;

/// Operations addressable by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Find,
    FindOne,
    Count,
    Destroy,
    UpdateSettings,
    GetSettings,
    UploadFiles,
    UpdateFileInfo,
    ReplaceFile,
    Search,
    CountSearch,
    UploadToEntity,
}

impl FromStr for Operation {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "find" => Self::Find,
            "findOne" => Self::FindOne,
            "count" => Self::Count,
            "destroy" => Self::Destroy,
            "updateSettings" => Self::UpdateSettings,
            "getSettings" => Self::GetSettings,
            "uploadFiles" => Self::UploadFiles,
            "updateFileInfo" => Self::UpdateFileInfo,
            "replaceFile" => Self::ReplaceFile,
            "search" => Self::Search,
            "countSearch" => Self::CountSearch,
            "uploadToEntity" => Self::UploadToEntity,
            other => {
                return Err(UploadError::NotFound(format!(
                    "unknown operation `{}`",
                    other
                )));
            }
        };
        Ok(op)
    }
}

/// Everything a by-name call may carry.
#[derive(Clone, Debug, Default)]
pub struct OperationRequest {
    pub id: Option<String>,
    pub query: Vec<(String, String)>,
    pub body: Value,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum OperationOutput {
    Records(Vec<MediaView>),
    Record(MediaView),
    Count { count: u64 },
    Settings { data: UploadSettings },
    Search(Vec<SanitizedMedia>),
}

/// The operation set shared by both controller flavours.
#[async_trait]
pub trait UploadController: Send + Sync {
    fn service(&self) -> &UploadService;

    /// Projection of a record returned to this kind of caller.
    fn view(&self, record: AssetRecord) -> MediaView;

    /// Identity stamped on writes made through this controller.
    fn author<'a>(&self, ctx: &'a RequestContext) -> Option<&'a Actor>;

    async fn find(&self, params: FindParams) -> Result<Vec<MediaView>, UploadError> {
        let records = self.service().gateway().find(params).await?;
        Ok(records.into_iter().map(|r| self.view(r)).collect())
    }

    async fn find_one(&self, id: Uuid) -> Result<MediaView, UploadError> {
        let record = self
            .service()
            .gateway()
            .find_one(id)
            .await?
            .ok_or_else(|| UploadError::NotFound("file not found".into()))?;
        Ok(self.view(record))
    }

    async fn count(&self, params: FindParams) -> Result<u64, UploadError> {
        Ok(self.service().gateway().count(params).await?)
    }

    async fn destroy(&self, id: Uuid) -> Result<MediaView, UploadError> {
        let record = self
            .service()
            .gateway()
            .find_one(id)
            .await?
            .ok_or_else(|| UploadError::NotFound("file not found".into()))?;
        let removed = self.service().remove(&record).await?;
        Ok(self.view(removed))
    }

    async fn get_settings(&self) -> Result<UploadSettings, UploadError> {
        Err(UploadError::NotFound("getSettings".into()))
    }

    async fn update_settings(&self, _body: Value) -> Result<UploadSettings, UploadError> {
        Err(UploadError::NotFound("updateSettings".into()))
    }

    async fn upload_files(
        &self,
        ctx: &RequestContext,
        body: &Value,
    ) -> Result<Vec<MediaView>, UploadError> {
        let body = validate_upload_body(body)?;
        let records = self
            .service()
            .upload(body.files, &body.metas, self.author(ctx))
            .await?;
        Ok(records.into_iter().map(|r| self.view(r)).collect())
    }

    async fn update_file_info(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        body: &Value,
    ) -> Result<MediaView, UploadError> {
        let info = validate_update_body(body)?;
        let record = self
            .service()
            .update_file_info(id, info, self.author(ctx))
            .await?;
        Ok(self.view(record))
    }

    async fn replace_file(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        body: &Value,
    ) -> Result<MediaView, UploadError> {
        let info = validate_update_body(body)?;
        let record = self.service().replace(id, info, self.author(ctx)).await?;
        Ok(self.view(record))
    }

    /// Search results are sanitized for every caller.
    async fn search(&self, term: &str) -> Result<Vec<SanitizedMedia>, UploadError> {
        let records = self.service().gateway().search(term).await?;
        Ok(records.iter().map(AssetRecord::sanitized).collect())
    }

    async fn count_search(&self, term: &str) -> Result<u64, UploadError> {
        Ok(self.service().gateway().count_search(term).await?)
    }

    /// Attachments submitted inline with an entity's edit form. The body
    /// carries the usual `fileInfo` plus `refId`, `ref`, `field` and an
    /// optional `source`.
    async fn upload_to_entity(&self, body: &Value) -> Result<Vec<MediaView>, UploadError> {
        let body = validate_upload_body(body)?;
        let entity = EntityRef::from_metas(&body.metas)?;
        let records = self
            .service()
            .upload_to_entity(&entity, body.files, body.metas.source.as_deref())
            .await?;
        Ok(records.into_iter().map(|r| self.view(r)).collect())
    }
}

/// Both controller flavours, resolved per request.
#[derive(Clone)]
pub struct Controllers {
    admin: Arc<AdminController>,
    api: Arc<ApiController>,
}

impl Controllers {
    pub fn new(service: UploadService) -> Self {
        Self {
            admin: Arc::new(AdminController::new(service.clone())),
            api: Arc::new(ApiController::new(service)),
        }
    }

    pub fn service(&self) -> &UploadService {
        self.api.service()
    }

    /// Privileged controller iff the caller is privileged.
    pub fn resolve(&self, ctx: &RequestContext) -> &dyn UploadController {
        if ctx.is_privileged() {
            self.admin.as_ref()
        } else {
            self.api.as_ref()
        }
    }

    /// Run `operation` on the controller resolved for `ctx`.
    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        operation: &str,
        req: OperationRequest,
    ) -> Result<OperationOutput, UploadError> {
        let op = operation.parse::<Operation>()?;
        let controller = self.resolve(ctx);
        debug!(?op, role = ?ctx.role, "dispatching upload operation");

        let out = match op {
            Operation::Find => {
                let params = FindParams::from_pairs(&req.query)?;
                OperationOutput::Records(controller.find(params).await?)
            }
            Operation::FindOne => {
                let id = parse_id(req.id.as_deref())?;
                OperationOutput::Record(controller.find_one(id).await?)
            }
            Operation::Count => OperationOutput::Count {
                count: controller.count(FindParams::from_pairs(&req.query)?).await?,
            },
            Operation::Destroy => {
                let id = parse_id(req.id.as_deref())?;
                OperationOutput::Record(controller.destroy(id).await?)
            }
            Operation::GetSettings => OperationOutput::Settings {
                data: controller.get_settings().await?,
            },
            Operation::UpdateSettings => OperationOutput::Settings {
                data: controller.update_settings(req.body).await?,
            },
            Operation::UploadFiles => {
                OperationOutput::Records(controller.upload_files(ctx, &req.body).await?)
            }
            Operation::UpdateFileInfo => {
                let id = parse_id(req.id.as_deref())?;
                OperationOutput::Record(controller.update_file_info(ctx, id, &req.body).await?)
            }
            Operation::ReplaceFile => {
                let id = parse_id(req.id.as_deref())?;
                OperationOutput::Record(controller.replace_file(ctx, id, &req.body).await?)
            }
            Operation::Search => {
                OperationOutput::Search(controller.search(search_term(&req)?).await?)
            }
            Operation::CountSearch => OperationOutput::Count {
                count: controller.count_search(search_term(&req)?).await?,
            },
            Operation::UploadToEntity => {
                OperationOutput::Records(controller.upload_to_entity(&req.body).await?)
            }
        };
        Ok(out)
    }

    /// `POST /upload`: describe an existing record when `id` is given,
    /// otherwise persist the submitted intents.
    pub async fn upload(
        &self,
        ctx: &RequestContext,
        id: Option<&str>,
        body: &Value,
    ) -> Result<OperationOutput, UploadError> {
        if !self.service().config().enabled {
            return Err(UploadError::Disabled);
        }

        let controller = self.resolve(ctx);
        match id {
            Some(id) => {
                let id = parse_id(Some(id))?;
                Ok(OperationOutput::Record(
                    controller.update_file_info(ctx, id, body).await?,
                ))
            }
            None => Ok(OperationOutput::Records(
                controller.upload_files(ctx, body).await?,
            )),
        }
    }
}

fn search_term(req: &OperationRequest) -> Result<&str, UploadError> {
    req.id
        .as_deref()
        .ok_or_else(|| UploadError::InvalidRequest("search term is required".into()))
}

/// Record ids are UUIDs; anything else cannot name a record.
pub fn parse_id(id: Option<&str>) -> Result<Uuid, UploadError> {
    let id = id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| UploadError::InvalidRequest("id is required".into()))?;
    Uuid::parse_str(id).map_err(|_| UploadError::NotFound("file not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::UploadConfig,
        models::actor::ActorRole,
        services::{
            document_store::DocumentRecordStore,
            events::{EventHub, testing::RecordingTelemetry},
            gateway::PersistenceGateway,
            search::DocumentSearch,
        },
    };
    use serde_json::json;

    fn controllers_with(config: UploadConfig) -> Controllers {
        let store = Arc::new(DocumentRecordStore::new());
        let gateway = PersistenceGateway::new(
            store.clone(),
            Arc::new(DocumentSearch),
            store,
            EventHub::new(16),
            Arc::new(RecordingTelemetry::default()),
        );
        Controllers::new(UploadService::new(Arc::new(config), gateway))
    }

    fn controllers() -> Controllers {
        controllers_with(UploadConfig::default())
    }

    fn admin() -> RequestContext {
        RequestContext::privileged(Actor { id: "1".into() })
    }

    fn upload_body(filename: &str) -> Value {
        json!({
            "fileInfo": {
                "filename": filename,
                "type": "image/png",
                "size": 1024,
                "hash": format!("{}_hash", filename),
                "Bucket": "b",
                "Key": format!("images/{}", filename),
            }
        })
    }

    fn record_id(out: &OperationOutput) -> Uuid {
        match out {
            OperationOutput::Records(views) => match &views[0] {
                MediaView::Full(r) => r.id,
                MediaView::Public(m) => m.id,
            },
            OperationOutput::Record(MediaView::Full(r)) => r.id,
            OperationOutput::Record(MediaView::Public(m)) => m.id,
            other => panic!("no record in {:?}", other),
        }
    }

    #[test]
    fn unknown_operation_is_not_found() {
        assert!(matches!(
            "explode".parse::<Operation>(),
            Err(UploadError::NotFound(_))
        ));
        assert_eq!("findOne".parse::<Operation>().unwrap(), Operation::FindOne);
    }

    #[tokio::test]
    async fn resolve_follows_privilege_flag() {
        let controllers = controllers();
        let out = controllers
            .upload(&admin(), None, &upload_body("a.png"))
            .await
            .unwrap();
        let id = record_id(&out);

        let privileged = controllers.resolve(&admin()).find_one(id).await.unwrap();
        assert!(matches!(privileged, MediaView::Full(_)));

        let anonymous = RequestContext::public(None);
        assert_eq!(anonymous.role, ActorRole::Public);
        let public = controllers.resolve(&anonymous).find_one(id).await.unwrap();
        assert!(matches!(public, MediaView::Public(_)));

        let serialized = serde_json::to_value(&public).unwrap();
        assert!(serialized.get("created_by").is_none());
    }

    #[tokio::test]
    async fn admin_writes_are_stamped_public_writes_are_not() {
        let controllers = controllers();

        let out = controllers
            .upload(&admin(), None, &upload_body("a.png"))
            .await
            .unwrap();
        let OperationOutput::Records(views) = out else {
            panic!("expected records");
        };
        let MediaView::Full(record) = &views[0] else {
            panic!("expected full record");
        };
        assert_eq!(record.created_by.as_deref(), Some("1"));

        let public = RequestContext::public(Some(Actor { id: "9".into() }));
        let id = record_id(
            &controllers
                .upload(&public, None, &upload_body("b.png"))
                .await
                .unwrap(),
        );
        let stored = controllers
            .service()
            .gateway()
            .find_one(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.created_by, None);
    }

    #[tokio::test]
    async fn settings_are_absent_from_public_controller() {
        let controllers = controllers();
        let public = RequestContext::public(None);

        for op in ["getSettings", "updateSettings"] {
            let err = controllers
                .dispatch(&public, op, OperationRequest::default())
                .await
                .unwrap_err();
            assert!(matches!(err, UploadError::NotFound(_)), "{}", op);
        }

        let req = OperationRequest {
            body: json!({ "responsiveDimensions": true }),
            ..Default::default()
        };
        controllers
            .dispatch(&admin(), "updateSettings", req)
            .await
            .unwrap();
        let out = controllers
            .dispatch(&admin(), "getSettings", OperationRequest::default())
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(out).unwrap(),
            json!({ "data": { "responsiveDimensions": true } })
        );
    }

    #[tokio::test]
    async fn upload_with_id_updates_file_info() {
        let controllers = controllers();
        let id = record_id(
            &controllers
                .upload(&admin(), None, &upload_body("a.png"))
                .await
                .unwrap(),
        );

        let out = controllers
            .upload(
                &admin(),
                Some(&id.to_string()),
                &json!({ "fileInfo": { "caption": "hello" } }),
            )
            .await
            .unwrap();
        let OperationOutput::Record(MediaView::Full(record)) = out else {
            panic!("expected full record");
        };
        assert_eq!(record.caption.as_deref(), Some("hello"));
        assert_eq!(record.name.as_deref(), Some("a.png"));

        assert!(matches!(
            controllers
                .upload(&admin(), Some(&Uuid::new_v4().to_string()), &json!({}))
                .await,
            Err(UploadError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn disabled_upload_and_empty_payloads_are_rejected() {
        let disabled = controllers_with(UploadConfig {
            enabled: false,
            ..Default::default()
        });
        assert!(matches!(
            disabled.upload(&admin(), None, &upload_body("a.png")).await,
            Err(UploadError::Disabled)
        ));

        let controllers = controllers();
        assert!(matches!(
            controllers
                .upload(&admin(), None, &json!({ "fileInfo": {} }))
                .await,
            Err(UploadError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn dispatch_by_name_covers_listing_and_destroy() {
        let controllers = controllers();
        for name in ["a.png", "b.png"] {
            controllers
                .upload(&admin(), None, &upload_body(name))
                .await
                .unwrap();
        }

        let count = controllers
            .dispatch(
                &admin(),
                "count",
                OperationRequest {
                    query: vec![("name_contains".into(), "a.".into())],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(count, OperationOutput::Count { count: 1 });

        let found = controllers
            .dispatch(
                &RequestContext::public(None),
                "search",
                OperationRequest {
                    id: Some("B.PNG".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let OperationOutput::Search(hits) = found else {
            panic!("expected search results");
        };
        assert_eq!(hits.len(), 1);

        let destroyed = controllers
            .dispatch(
                &admin(),
                "destroy",
                OperationRequest {
                    id: Some(hits[0].id.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(record_id(&destroyed), hits[0].id);

        let req = OperationRequest {
            id: Some(hits[0].id.to_string()),
            ..Default::default()
        };
        let err = controllers
            .dispatch(&admin(), "replaceFile", req)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Unimplemented(_)));
    }

    #[tokio::test]
    async fn count_search_by_name() {
        let controllers = controllers();
        for name in ["sun.png", "Sunset.png", "moon.png"] {
            controllers
                .upload(&admin(), None, &upload_body(name))
                .await
                .unwrap();
        }

        let req = OperationRequest {
            id: Some("SUN".into()),
            ..Default::default()
        };
        let out = controllers
            .dispatch(&RequestContext::public(None), "countSearch", req)
            .await
            .unwrap();
        assert_eq!(out, OperationOutput::Count { count: 2 });

        let err = controllers
            .dispatch(&admin(), "countSearch", OperationRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn upload_to_entity_by_name_links_records() {
        let controllers = controllers();
        let mut body = upload_body("cover.png");
        body["refId"] = json!(12);
        body["ref"] = json!("article");
        body["field"] = json!("cover");
        body["source"] = json!("content-manager");

        let out = controllers
            .dispatch(
                &admin(),
                "uploadToEntity",
                OperationRequest {
                    body,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let OperationOutput::Records(views) = out else {
            panic!("expected records");
        };
        let MediaView::Full(record) = &views[0] else {
            panic!("expected full record");
        };
        assert_eq!(record.related.len(), 1);
        assert_eq!(record.related[0].ref_id, "12");
        assert_eq!(record.related[0].ref_, "article");
        assert_eq!(record.related[0].field, "cover");
        assert_eq!(record.related[0].source.as_deref(), Some("content-manager"));

        let err = controllers
            .dispatch(
                &admin(),
                "uploadToEntity",
                OperationRequest {
                    body: upload_body("loose.png"),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidRequest(_)));
    }

    #[test]
    fn ids_must_be_present_and_well_formed() {
        assert!(matches!(parse_id(None), Err(UploadError::InvalidRequest(_))));
        assert!(matches!(parse_id(Some("")), Err(UploadError::InvalidRequest(_))));
        assert!(matches!(parse_id(Some("42")), Err(UploadError::NotFound(_))));
    }
}
