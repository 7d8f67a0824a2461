//! Core data models for the media upload service.
//!
//! These types describe asset records as they move from client intent to
//! persisted metadata, and the settings blob kept alongside them. They
//! serialize with the field names clients already use (`Bucket`, `Key`,
//! `alternativeText`).

pub mod actor;
pub mod file;
pub mod query;
pub mod settings;
