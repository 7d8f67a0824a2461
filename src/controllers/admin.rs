//! Controller for authenticated administrators.

use super::UploadController;
use crate::{
    errors::UploadError,
    models::{
        actor::{Actor, RequestContext},
        file::{AssetRecord, MediaView},
        settings::UploadSettings,
    },
    services::upload_service::UploadService,
};
use async_trait::async_trait;
use serde_json::Value;

/// Full records, audit stamping and settings access.
pub struct AdminController {
    service: UploadService,
}

impl AdminController {
    pub fn new(service: UploadService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl UploadController for AdminController {
    fn service(&self) -> &UploadService {
        &self.service
    }

    fn view(&self, record: AssetRecord) -> MediaView {
        MediaView::Full(record)
    }

    fn author<'a>(&self, ctx: &'a RequestContext) -> Option<&'a Actor> {
        ctx.actor.as_ref()
    }

    async fn get_settings(&self) -> Result<UploadSettings, UploadError> {
        self.service.gateway().get_settings().await
    }

    async fn update_settings(&self, body: Value) -> Result<UploadSettings, UploadError> {
        let settings: UploadSettings = serde_json::from_value(body)
            .map_err(|e| UploadError::InvalidRequest(format!("invalid settings: {}", e)))?;
        self.service.gateway().set_settings(settings).await
    }
}
