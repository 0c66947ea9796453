use serde::{Deserialize, Serialize};

pub const REMOVE_BACKGROUND_ROUTE: &str = "/api/remove-background";
pub const HEALTH_ROUTE: &str = "/api/health";

/// Multipart field carrying the uploaded file.
pub const IMAGE_FIELD: &str = "image";

pub const DOWNLOAD_FILE_NAME: &str = "background-removed.png";
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to remove background";
pub const TIMEOUT_FAILURE_MESSAGE: &str = "Request timed out while removing background";

/// Upload limit advertised to users ("MAX. 10MB").
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub const NO_IMAGE_PROVIDED: &str = "No image file provided";
pub const NO_FILE_SELECTED: &str = "No file selected";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}
