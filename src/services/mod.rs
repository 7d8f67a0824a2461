pub mod credentials;
pub mod document_store;
pub mod events;
pub mod formatter;
pub mod gateway;
pub mod record_store;
pub mod search;
pub mod sqlite_store;
pub mod upload_service;
pub mod validation;

#[cfg(test)]
pub mod fixtures;
