//! Builders shared by unit tests.

use crate::{
    models::file::{FileInfo, NewFile, PROVIDER},
    services::formatter::{extname, is_image},
};

pub fn file_info(filename: &str, size: f64) -> FileInfo {
    let prefix = if is_image(filename) { "images" } else { "files" };
    FileInfo {
        name: None,
        filename: filename.to_string(),
        mime_type: if is_image(filename) {
            "image/png".into()
        } else {
            "application/octet-stream".into()
        },
        size,
        hash: format!("{}_hash", filename.replace('.', "_")),
        bucket: "b".into(),
        key: format!("{}/{}", prefix, filename),
        alternative_text: None,
        caption: None,
    }
}

pub fn new_file(name: &str, hash: &str, mime: &str) -> NewFile {
    let prefix = if is_image(name) { "images" } else { "files" };
    NewFile {
        name: Some(name.to_string()),
        alternative_text: None,
        caption: None,
        hash: hash.to_string(),
        ext: extname(name).to_string(),
        mime: mime.to_string(),
        size: 1.0,
        bucket: "b".into(),
        key: format!("{}/{}", prefix, name),
        url: format!("S3://b/{}/{}", prefix, name),
        provider: PROVIDER.into(),
        related: Vec::new(),
        path: None,
        created_by: None,
        updated_by: None,
    }
}
