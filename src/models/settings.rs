//! Upload plugin settings, stored as an opaque blob.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which settings live in the settings store.
pub const SETTINGS_KEY: &str = "plugin_upload_settings";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct UploadSettings {
    #[serde(
        rename = "responsiveDimensions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub responsive_dimensions: Option<bool>,

    /// Any other keys the admin UI stores; passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
