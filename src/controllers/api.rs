//! Controller for content-API callers (anonymous or end users).

use super::UploadController;
use crate::{
    models::{
        actor::{Actor, RequestContext},
        file::{AssetRecord, MediaView},
    },
    services::upload_service::UploadService,
};

/// Sanitized records only; writes carry no audit identity.
pub struct ApiController {
    service: UploadService,
}

impl ApiController {
    pub fn new(service: UploadService) -> Self {
        Self { service }
    }
}

impl UploadController for ApiController {
    fn service(&self) -> &UploadService {
        &self.service
    }

    fn view(&self, record: AssetRecord) -> MediaView {
        MediaView::Public(record.sanitized())
    }

    fn author<'a>(&self, _ctx: &'a RequestContext) -> Option<&'a Actor> {
        None
    }
}
