//! Shared state handed to every handler.

use crate::{
    controllers::Controllers,
    services::{credentials::CredentialIssuer, record_store::RecordStore},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub controllers: Controllers,
    pub credentials: CredentialIssuer,
    pub store: Arc<dyn RecordStore>,
}
