//! Pure transformation from a client upload intent into a record draft.

use crate::{
    errors::UploadError,
    models::file::{FileDraft, FileInfo, RelatedLink, UploadMetas},
};

/// Extensions treated as images for key prefixes, ACLs and public URLs,
/// kept sorted for binary search.
const IMAGE_EXTENSIONS: &[&str] = &[
    "3dv", "ai", "amf", "apng", "art", "ase", "avif", "awg", "blp", "bmp", "bw", "cd5", "cdr",
    "cgm", "cit", "cmx", "cpt", "cr2", "cur", "cut", "dds", "dib", "djvu", "dxf", "e2d", "ecw",
    "egt", "emf", "eps", "exif", "fs", "gbr", "gif", "gpl", "grf", "hdp", "heic", "heif", "icns",
    "ico", "iff", "int", "inta", "jfif", "jng", "jp2", "jpe", "jpeg", "jpg", "jps", "jxl", "jxr",
    "lbm", "liff", "max", "miff", "mng", "msp", "nef", "nitf", "nrrd", "odg", "ota", "pam", "pbm",
    "pc1", "pc2", "pc3", "pcf", "pct", "pcx", "pdd", "pdn", "pgf", "pgm", "pi1", "pi2", "pi3",
    "pict", "pjpeg", "png", "pnm", "pns", "ppm", "psb", "psd", "psp", "px", "pxm", "pxr", "qfx",
    "ras", "raw", "rgb", "rgba", "rle", "sct", "sgi", "sid", "stl", "sun", "svg", "sxd", "tga",
    "tif", "tiff", "v2d", "vnd", "vrml", "vtf", "wdp", "webp", "wmf", "x3d", "xar", "xbm", "xcf",
    "xpm",
];

/// Whether `name` looks like an image file, judged by its extension.
pub fn is_image(name: &str) -> bool {
    let ext = extname(name);
    ext.len() > 1
        && IMAGE_EXTENSIONS
            .binary_search(&ext[1..].to_ascii_lowercase().as_str())
            .is_ok()
}

/// Extension of the last path segment, including the dot (`".png"`).
/// Dotfiles and names without a dot yield `""`.
pub fn extname(filename: &str) -> &str {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    match base.rfind('.') {
        Some(idx) if idx > 0 => &base[idx..],
        _ => "",
    }
}

/// Bytes to kilobytes, rounded to two decimals.
pub fn bytes_to_kbytes(bytes: f64) -> f64 {
    (bytes / 1024.0 * 100.0).round() / 100.0
}

/// Build the canonical draft for one intent.
pub fn format_file_info(info: &FileInfo, metas: &UploadMetas) -> FileDraft {
    let name = info
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| info.filename.clone());

    let related = match (&metas.ref_id, &metas.ref_, &metas.field) {
        (Some(ref_id), Some(ref_), Some(field)) => vec![RelatedLink {
            ref_id: ref_id.clone(),
            ref_: ref_.clone(),
            source: metas.source.clone(),
            field: field.clone(),
        }],
        _ => Vec::new(),
    };

    FileDraft {
        name: Some(name),
        alternative_text: info.alternative_text.clone(),
        caption: info.caption.clone(),
        hash: info.hash.clone(),
        ext: extname(&info.filename).to_string(),
        mime: info.mime_type.clone(),
        size: bytes_to_kbytes(info.size),
        bucket: info.bucket.clone(),
        key: info.key.clone(),
        related,
        path: metas.path.clone().filter(|p| !p.is_empty()),
    }
}

/// Pixel dimensions of an image object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Reading dimensions would require fetching the object from the bucket,
/// which this service never does.
pub fn image_dimensions(_draft: &FileDraft) -> Result<Dimensions, UploadError> {
    Err(UploadError::Unimplemented("image dimension enrichment"))
}

/// Format an intent and run enrichment. Enrichment is currently
/// unavailable, so the draft is returned as formatted.
pub fn enhance_file(info: &FileInfo, metas: &UploadMetas) -> FileDraft {
    let draft = format_file_info(info, metas);
    if let Err(err) = image_dimensions(&draft) {
        tracing::trace!(key = %draft.key, "skipping enrichment: {}", err);
    }
    draft
}
