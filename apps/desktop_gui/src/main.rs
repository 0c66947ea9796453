use std::{path::PathBuf, sync::Arc, time::Duration};

mod backend_bridge;
mod controller;
mod ui;

use anyhow::Context;
use clap::Parser;
use client_core::{
    AuthProvider, GoTrueAuthProvider, HttpRemoteProcessor, InMemoryAuthProvider, SessionFileStore,
};
use crossbeam_channel::bounded;
use eframe::egui;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backend_bridge::{
    commands::BackendCommand,
    runtime::{launch, BackendWorker},
};
use controller::events::UiEvent;
use ui::{app::StartupConfig, BgRemoverApp};

#[derive(Debug, Parser)]
#[command(name = "bg-remover", about = "Remove image backgrounds with a remote processor")]
struct Args {
    /// Base URL of the remove-background service.
    #[arg(long, env = "BG_REMOVER_PROCESSOR_URL", default_value = "http://127.0.0.1:5001")]
    processor_url: String,
    /// GoTrue/Supabase project URL. Without it a local in-memory provider is used.
    #[arg(long, env = "SUPABASE_URL")]
    auth_url: Option<String>,
    #[arg(long, env = "SUPABASE_ANON_KEY", default_value = "")]
    auth_anon_key: String,
    #[arg(long, default_value_t = 60)]
    request_timeout_secs: u64,
}

fn session_file_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".bg_remover").join("session.json"))
}

fn build_auth_provider(args: &Args) -> anyhow::Result<(Arc<dyn AuthProvider>, String)> {
    let Some(auth_url) = args.auth_url.as_deref().filter(|url| !url.trim().is_empty()) else {
        warn!("no auth url configured; using in-memory auth provider");
        return Ok((
            Arc::new(InMemoryAuthProvider::new()),
            "local accounts (in-memory)".to_string(),
        ));
    };

    let mut provider = GoTrueAuthProvider::new(auth_url, args.auth_anon_key.clone())
        .context("failed to configure auth provider")?;
    match session_file_path() {
        Some(path) => {
            info!(path = %path.display(), "persisting session");
            provider = provider.with_store(SessionFileStore::new(path));
        }
        None => warn!("home directory unavailable; session will not persist across restarts"),
    }
    Ok((Arc::new(provider), auth_url.to_string()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let (provider, auth_label) = build_auth_provider(&args)?;
    let processor = HttpRemoteProcessor::with_timeout(
        &args.processor_url,
        Duration::from_secs(args.request_timeout_secs.max(1)),
    )?;

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(64);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(256);
    let worker = BackendWorker::new(Arc::clone(&provider), Arc::new(processor), ui_tx);
    launch(cmd_rx, worker).context("failed to spawn backend worker thread")?;

    let startup = StartupConfig {
        processor_url: args.processor_url.clone(),
        auth_label,
    };
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Background Remover")
            .with_inner_size([1100.0, 720.0])
            .with_min_inner_size([720.0, 480.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };
    eframe::run_native(
        "Background Remover",
        options,
        Box::new(move |_cc| Ok(Box::new(BgRemoverApp::new(cmd_tx, ui_rx, provider, startup)))),
    )
    .map_err(|err| anyhow::anyhow!("desktop ui failed: {err}"))
}
