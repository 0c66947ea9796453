//! Lifecycle of a single image: selection, submit, result or error, reset.
//!
//! The state machine is synchronous. Submitting hands out a [`SubmitTicket`];
//! whoever performs the upload reports back through
//! [`ImageWorkflow::complete`] with the ticket's generation. Every select,
//! submit and reset draws a fresh generation from a process-wide counter, so an
//! outcome that arrives after the user moved on is discarded instead of
//! applied, even when the workflow it was issued by has since been replaced.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use shared::{
    domain::{FailureKind, WorkflowStatus},
    protocol::{DOWNLOAD_FILE_NAME, MAX_IMAGE_BYTES},
};
use tracing::{debug, info, warn};

use crate::{
    error::{ProcessError, WorkflowError},
    processor::RemoteProcessor,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    file_name: String,
    mime_type: String,
    bytes: Bytes,
}

impl SelectedImage {
    /// Validates and wraps a user-selected file.
    ///
    /// The type is guessed from the file name and must be `image/*`; the
    /// payload must be non-empty and at most [`MAX_IMAGE_BYTES`].
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Result<Self, WorkflowError> {
        let file_name = file_name.into();
        let bytes = bytes.into();

        if file_name.trim().is_empty() {
            return Err(WorkflowError::InvalidImage("file name is empty".to_string()));
        }
        let mime = mime_guess::from_path(&file_name)
            .first()
            .filter(|mime| mime.type_().as_str() == "image")
            .ok_or_else(|| {
                WorkflowError::InvalidImage(format!("'{file_name}' is not an image file"))
            })?;
        if bytes.is_empty() {
            return Err(WorkflowError::InvalidImage(format!("'{file_name}' is empty")));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(WorkflowError::InvalidImage(format!(
                "'{file_name}' is {} bytes; the limit is {MAX_IMAGE_BYTES} bytes",
                bytes.len()
            )));
        }

        Ok(Self {
            file_name,
            mime_type: mime.essence_str().to_string(),
            bytes,
        })
    }

    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = fs::read(path).map_err(|err| {
            WorkflowError::InvalidImage(format!("failed to read '{}': {err}", path.display()))
        })?;
        Self::new(file_name, bytes)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    bytes: Bytes,
    content_type: Option<String>,
}

impl ProcessedImage {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ProcessError> for WorkflowFailure {
    fn from(value: &ProcessError) -> Self {
        Self {
            kind: value.kind(),
            message: value.user_message(),
        }
    }
}

/// Permission to issue exactly one upload for the current selection.
#[derive(Debug, Clone)]
pub struct SubmitTicket {
    pub generation: u64,
    pub image: SelectedImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied(WorkflowStatus),
    /// The outcome belonged to a superseded submit.
    Discarded,
}

/// Processed bytes ready to be saved under [`DOWNLOAD_FILE_NAME`].
#[derive(Debug, Clone, Copy)]
pub struct Download<'a> {
    pub file_name: &'static str,
    pub bytes: &'a [u8],
}

impl Download<'_> {
    /// Writes the image into `dir` under the fixed download name.
    pub fn save_into(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(self.file_name);
        fs::write(&path, self.bytes)?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Default)]
enum State {
    #[default]
    Idle,
    Selected(SelectedImage),
    Processing(SelectedImage),
    Succeeded {
        image: SelectedImage,
        result: ProcessedImage,
    },
    Failed {
        image: SelectedImage,
        failure: WorkflowFailure,
    },
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Generations are unique across every workflow in the process.
fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct ImageWorkflow {
    state: State,
    generation: u64,
}

impl Default for ImageWorkflow {
    fn default() -> Self {
        Self {
            state: State::Idle,
            generation: next_generation(),
        }
    }
}

impl ImageWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> WorkflowStatus {
        match self.state {
            State::Idle => WorkflowStatus::Idle,
            State::Selected(_) => WorkflowStatus::ImageSelected,
            State::Processing(_) => WorkflowStatus::Processing,
            State::Succeeded { .. } => WorkflowStatus::Succeeded,
            State::Failed { .. } => WorkflowStatus::Failed,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn selected(&self) -> Option<&SelectedImage> {
        match &self.state {
            State::Idle => None,
            State::Selected(image)
            | State::Processing(image)
            | State::Succeeded { image, .. }
            | State::Failed { image, .. } => Some(image),
        }
    }

    pub fn processed(&self) -> Option<&ProcessedImage> {
        match &self.state {
            State::Succeeded { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&WorkflowFailure> {
        match &self.state {
            State::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure().map(|failure| failure.message.as_str())
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.state, State::Processing(_))
    }

    pub fn can_submit(&self) -> bool {
        self.selected().is_some() && !self.is_processing()
    }

    /// Replaces the selection, dropping any previous result or error. Allowed
    /// from every state; an in-flight submit becomes stale.
    pub fn select(&mut self, image: SelectedImage) {
        self.generation = next_generation();
        debug!(
            file_name = image.file_name(),
            size_bytes = image.bytes().len(),
            generation = self.generation,
            "image selected"
        );
        self.state = State::Selected(image);
    }

    /// Moves to `Processing` and hands out the ticket for the single upload.
    /// A second submit before the first completes is rejected.
    pub fn submit(&mut self) -> Result<SubmitTicket, WorkflowError> {
        let image = match &self.state {
            State::Idle => return Err(WorkflowError::NoImageSelected),
            State::Processing(_) => return Err(WorkflowError::AlreadyProcessing),
            State::Selected(image)
            | State::Succeeded { image, .. }
            | State::Failed { image, .. } => image.clone(),
        };

        self.generation = next_generation();
        self.state = State::Processing(image.clone());
        info!(
            file_name = image.file_name(),
            generation = self.generation,
            "submitting image for background removal"
        );
        Ok(SubmitTicket {
            generation: self.generation,
            image,
        })
    }

    /// Applies the outcome of the submit identified by `generation`.
    pub fn complete(
        &mut self,
        generation: u64,
        outcome: Result<ProcessedImage, ProcessError>,
    ) -> Completion {
        if generation != self.generation || !self.is_processing() {
            debug!(
                generation,
                current_generation = self.generation,
                "discarding stale background removal outcome"
            );
            return Completion::Discarded;
        }

        let State::Processing(image) = std::mem::take(&mut self.state) else {
            return Completion::Discarded;
        };
        self.state = match outcome {
            Ok(result) => {
                info!(
                    generation,
                    size_bytes = result.bytes().len(),
                    "background removed"
                );
                State::Succeeded { image, result }
            }
            Err(err) => {
                warn!(generation, error = %err, "background removal failed");
                State::Failed {
                    image,
                    failure: WorkflowFailure::from(&err),
                }
            }
        };
        Completion::Applied(self.status())
    }

    pub fn download(&self) -> Result<Download<'_>, WorkflowError> {
        let result = self.processed().ok_or(WorkflowError::NothingToDownload)?;
        Ok(Download {
            file_name: DOWNLOAD_FILE_NAME,
            bytes: result.bytes(),
        })
    }

    /// Clears everything and returns to `Idle`. Always allowed.
    pub fn reset(&mut self) {
        self.generation = next_generation();
        self.state = State::Idle;
    }

    /// Runs one submit to completion against `processor`.
    pub async fn process_with<P>(&mut self, processor: &P) -> Result<Completion, WorkflowError>
    where
        P: RemoteProcessor + ?Sized,
    {
        let ticket = self.submit()?;
        let outcome = processor.remove_background(&ticket.image).await;
        Ok(self.complete(ticket.generation, outcome))
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
