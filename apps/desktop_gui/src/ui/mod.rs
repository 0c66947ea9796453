//! UI layer for desktop GUI: app shell, screens, and image previews.

pub mod app;
pub mod preview;

pub use app::BgRemoverApp;
