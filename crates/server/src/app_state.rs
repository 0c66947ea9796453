use std::sync::Arc;

use crate::remover::BackgroundRemover;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) remover: Arc<dyn BackgroundRemover>,
    pub(crate) max_upload_bytes: usize,
}
