//! Backend commands queued from UI to backend worker.

use std::path::PathBuf;

use client_core::SubmitTicket;

use crate::controller::selection::LoadToken;

pub enum BackendCommand {
    FetchSession,
    SignIn { email: String, password: String },
    SignOut,
    LoadImage { path: PathBuf, token: LoadToken },
    RemoveBackground { ticket: SubmitTicket },
    SaveResult { path: PathBuf, bytes: Vec<u8> },
    CheckHealth,
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchSession => "fetch_session",
            Self::SignIn { .. } => "sign_in",
            Self::SignOut => "sign_out",
            Self::LoadImage { .. } => "load_image",
            Self::RemoveBackground { .. } => "remove_background",
            Self::SaveResult { .. } => "save_result",
            Self::CheckHealth => "check_health",
        }
    }
}
