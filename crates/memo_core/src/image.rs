use thiserror::Error;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub const ALLOWED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageRejection {
    #[error("only JPEG, PNG, GIF or WebP images can be uploaded (got '{0}')")]
    UnsupportedType(String),
    #[error("image is {size} bytes; the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("image is empty")]
    Empty,
}

/// Strips MIME parameters and lowercases, `"Image/PNG; q=1"` -> `"image/png"`.
pub fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn validate_image(mime_type: &str, size: usize) -> Result<(), ImageRejection> {
    let mime = normalize_mime(mime_type);
    if !ALLOWED_IMAGE_TYPES.contains(&mime.as_str()) {
        return Err(ImageRejection::UnsupportedType(mime));
    }
    if size == 0 {
        return Err(ImageRejection::Empty);
    }
    if size > MAX_IMAGE_BYTES {
        return Err(ImageRejection::TooLarge {
            size,
            limit: MAX_IMAGE_BYTES,
        });
    }
    Ok(())
}

impl ImageUpload {
    pub fn validate(&self) -> Result<(), ImageRejection> {
        validate_image(&self.mime_type, self.bytes.len())
    }
}
