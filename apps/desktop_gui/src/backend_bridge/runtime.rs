//! Runtime bridge between UI command queue and backend event intake.

use std::{
    path::Path,
    sync::Arc,
    thread::{self, JoinHandle},
};

use client_core::{AuthProvider, RemoteProcessor, SelectedImage, WorkflowError};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use shared::protocol::MAX_IMAGE_BYTES;
use tracing::{debug, error, info, warn};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

/// Executes backend commands against the auth provider and remote processor.
pub struct BackendWorker {
    provider: Arc<dyn AuthProvider>,
    processor: Arc<dyn RemoteProcessor>,
    ui_tx: Sender<UiEvent>,
}

impl BackendWorker {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        processor: Arc<dyn RemoteProcessor>,
        ui_tx: Sender<UiEvent>,
    ) -> Self {
        Self {
            provider,
            processor,
            ui_tx,
        }
    }

    pub async fn handle(&self, cmd: BackendCommand) {
        debug!(command = cmd.name(), "backend command received");
        match cmd {
            BackendCommand::FetchSession => {
                let session = self.provider.current_session().await;
                self.emit(UiEvent::SessionFetched(session));
            }
            BackendCommand::SignIn { email, password } => {
                let result = self
                    .provider
                    .sign_in_with_password(&email, &password)
                    .await
                    .map(|_| ());
                self.emit(UiEvent::SignInFinished(result));
            }
            BackendCommand::SignOut => {
                let result = self.provider.sign_out().await;
                self.emit(UiEvent::SignOutFinished(result));
            }
            BackendCommand::LoadImage { path, token } => {
                let result = load_image(&path).await;
                self.emit(UiEvent::ImageLoaded { token, result });
            }
            BackendCommand::RemoveBackground { ticket } => {
                info!(
                    generation = ticket.generation,
                    file_name = ticket.image.file_name(),
                    "removing background"
                );
                let outcome = self.processor.remove_background(&ticket.image).await;
                if let Err(err) = &outcome {
                    warn!(generation = ticket.generation, %err, "background removal failed");
                }
                self.emit(UiEvent::ProcessingFinished {
                    generation: ticket.generation,
                    outcome,
                });
            }
            BackendCommand::SaveResult { path, bytes } => {
                match tokio::fs::write(&path, bytes).await {
                    Ok(()) => {
                        info!(path = %path.display(), "saved processed image");
                        self.emit(UiEvent::ResultSaved(path));
                    }
                    Err(err) => {
                        error!(path = %path.display(), %err, "failed to save processed image");
                        self.emit(UiEvent::Error(UiError::from_message(
                            UiErrorContext::SaveResult,
                            format!("Failed to save image: {err}"),
                        )));
                    }
                }
            }
            BackendCommand::CheckHealth => {
                self.emit(UiEvent::HealthChecked(self.processor.health().await));
            }
        }
    }

    fn emit(&self, event: UiEvent) {
        match self.ui_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("ui event queue full; dropping backend event"),
            Err(TrySendError::Disconnected(_)) => debug!("ui event queue closed"),
        }
    }
}

async fn load_image(path: &Path) -> Result<SelectedImage, WorkflowError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let metadata = tokio::fs::metadata(path).await.map_err(|err| {
        WorkflowError::InvalidImage(format!("failed to read '{}': {err}", path.display()))
    })?;
    if metadata.len() > MAX_IMAGE_BYTES as u64 {
        return Err(WorkflowError::InvalidImage(format!(
            "'{file_name}' is {} bytes; the limit is {MAX_IMAGE_BYTES} bytes",
            metadata.len()
        )));
    }
    let bytes = tokio::fs::read(path).await.map_err(|err| {
        WorkflowError::InvalidImage(format!("failed to read '{}': {err}", path.display()))
    })?;
    SelectedImage::new(file_name, bytes)
}

/// Spawns the backend thread. Each command runs as its own task so a slow
/// upload never blocks sign-out.
pub fn launch(cmd_rx: Receiver<BackendCommand>, worker: BackendWorker) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("backend-worker".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    worker.emit(UiEvent::Error(UiError::from_message(
                        UiErrorContext::BackendStartup,
                        format!("backend worker startup failure: failed to build runtime: {err}"),
                    )));
                    error!("failed to build backend runtime: {err}");
                    return;
                }
            };

            let worker = Arc::new(worker);
            runtime.block_on(async move {
                info!("backend worker ready");
                while let Ok(cmd) = cmd_rx.recv() {
                    let worker = Arc::clone(&worker);
                    tokio::spawn(async move { worker.handle(cmd).await });
                }
                info!("ui command queue closed; backend worker exiting");
            });
        })
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
