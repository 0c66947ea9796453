use std::{fs, net::SocketAddr};

use anyhow::Context;
use serde::Deserialize;

use crate::remover::DEFAULT_TOLERANCE;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub max_upload_bytes: usize,
    pub remover_tolerance: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "0.0.0.0:5001".into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            remover_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Settings {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server_bind
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.server_bind))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    max_upload_bytes: Option<usize>,
    remover_tolerance: Option<u8>,
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let raw = fs::read_to_string("server.toml").ok();
    load_settings_from(raw.as_deref(), |key| std::env::var(key).ok())
}

/// Layers `server.toml` contents and then environment overrides on top of the defaults.
pub fn load_settings_from(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Some(raw) = file_contents {
        let file_cfg: FileSettings = toml::from_str(raw).context("failed to parse server.toml")?;
        if let Some(v) = file_cfg.bind_addr {
            settings.server_bind = v;
        }
        if let Some(v) = file_cfg.max_upload_bytes {
            settings.max_upload_bytes = v;
        }
        if let Some(v) = file_cfg.remover_tolerance {
            settings.remover_tolerance = v;
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(port) = env("PORT") {
        let port: u16 = port
            .trim()
            .parse()
            .with_context(|| format!("invalid PORT '{port}'"))?;
        settings.server_bind = with_port(&settings.server_bind, port);
    }

    if let Some(v) = env("APP__MAX_UPLOAD_BYTES") {
        settings.max_upload_bytes = v
            .trim()
            .parse()
            .with_context(|| format!("invalid APP__MAX_UPLOAD_BYTES '{v}'"))?;
    }
    if let Some(v) = env("APP__REMOVER_TOLERANCE") {
        settings.remover_tolerance = v
            .trim()
            .parse()
            .with_context(|| format!("invalid APP__REMOVER_TOLERANCE '{v}'"))?;
    }

    Ok(settings)
}

fn with_port(bind: &str, port: u16) -> String {
    match bind.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("{bind}:{port}"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
