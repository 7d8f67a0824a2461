//! Shape checks for upload request bodies. Every violation is collected
//! before failing so clients can fix a form in one round trip.

use crate::{
    errors::{FieldError, UploadError},
    models::file::{FileInfo, FileInfoUpdate, UploadMetas},
};
use serde_json::{Map, Value};

const REQUIRED_STRINGS: [&str; 5] = ["filename", "type", "hash", "Bucket", "Key"];
const NULLABLE_STRINGS: [&str; 3] = ["name", "alternativeText", "caption"];
const METAS: [&str; 5] = ["refId", "ref", "source", "field", "path"];

/// A validated upload body: intents in submission order plus linkage metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadBody {
    pub files: Vec<FileInfo>,
    pub metas: UploadMetas,
}

/// Whether the `fileInfo` payload carries nothing to create.
pub fn is_empty_file_info(body: &Value) -> bool {
    match body.get("fileInfo") {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(fields)) => {
            fields.is_empty() || fields.get("size").and_then(Value::as_f64) == Some(0.0)
        }
        Some(_) => false,
    }
}

pub fn validate_upload_body(body: &Value) -> Result<UploadBody, UploadError> {
    if is_empty_file_info(body) {
        return Err(UploadError::InvalidRequest("FileInfos are empty".into()));
    }

    let mut errors = Vec::new();
    let metas = read_metas(body, &mut errors);

    let files = match body.get("fileInfo") {
        Some(Value::Object(fields)) => check_file_info("fileInfo", fields, &mut errors)
            .into_iter()
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let path = format!("fileInfo[{}]", i);
                match item {
                    Value::Object(fields) => check_file_info(&path, fields, &mut errors),
                    _ => {
                        errors.push(FieldError::new(path, "must be an object"));
                        None
                    }
                }
            })
            .collect(),
        _ => {
            errors.push(FieldError::new(
                "fileInfo",
                "must be an object or an array of objects",
            ));
            Vec::new()
        }
    };

    if !errors.is_empty() {
        return Err(UploadError::Validation(errors));
    }
    Ok(UploadBody { files, metas })
}

/// `fileInfo` for an update: only the three descriptive fields, each nullable.
pub fn validate_update_body(body: &Value) -> Result<FileInfoUpdate, UploadError> {
    let mut errors = Vec::new();
    let update = match body.get("fileInfo") {
        None | Some(Value::Null) => FileInfoUpdate::default(),
        Some(Value::Object(fields)) => FileInfoUpdate {
            name: nullable_string("fileInfo", fields, "name", &mut errors),
            alternative_text: nullable_string("fileInfo", fields, "alternativeText", &mut errors),
            caption: nullable_string("fileInfo", fields, "caption", &mut errors),
        },
        Some(_) => {
            errors.push(FieldError::new("fileInfo", "must be an object"));
            FileInfoUpdate::default()
        }
    };

    if !errors.is_empty() {
        return Err(UploadError::Validation(errors));
    }
    Ok(update)
}

fn check_file_info(
    path: &str,
    fields: &Map<String, Value>,
    errors: &mut Vec<FieldError>,
) -> Option<FileInfo> {
    let before = errors.len();

    let [filename, mime_type, hash, bucket, key] =
        REQUIRED_STRINGS.map(|key| required_string(path, fields, key, errors));

    let size = match fields.get("size") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(Value::Null) | None => {
            errors.push(FieldError::new(
                format!("{}.size", path),
                "size is a required field",
            ));
            0.0
        }
        Some(_) => {
            errors.push(FieldError::new(
                format!("{}.size", path),
                "size must be a number",
            ));
            0.0
        }
    };

    let [name, alternative_text, caption] =
        NULLABLE_STRINGS.map(|key| nullable_string(path, fields, key, errors));

    (errors.len() == before).then_some(FileInfo {
        name,
        filename,
        mime_type,
        size,
        hash,
        bucket,
        key,
        alternative_text,
        caption,
    })
}

fn required_string(
    path: &str,
    fields: &Map<String, Value>,
    key: &str,
    errors: &mut Vec<FieldError>,
) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => {
            errors.push(FieldError::new(
                format!("{}.{}", path, key),
                format!("{} is a required field", key),
            ));
            String::new()
        }
        Some(_) => {
            errors.push(FieldError::new(
                format!("{}.{}", path, key),
                format!("{} must be a string", key),
            ));
            String::new()
        }
    }
}

fn nullable_string(
    path: &str,
    fields: &Map<String, Value>,
    key: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(FieldError::new(
                format!("{}.{}", path, key),
                format!("{} must be a string", key),
            ));
            None
        }
    }
}

/// Linkage metadata; ids may arrive as numbers from form posts.
fn read_metas(body: &Value, errors: &mut Vec<FieldError>) -> UploadMetas {
    let [ref_id, ref_, source, field, path] = METAS.map(|key| match body.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(FieldError::new(key, format!("{} must be a string", key)));
            None
        }
    });
    UploadMetas {
        ref_id,
        ref_,
        source,
        field,
        path,
    }
}
