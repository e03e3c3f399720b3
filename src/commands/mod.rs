//! Tauri command handlers
//!
//! IPC handlers the frontend calls via Tauri's invoke system. Each session
//! action returns the status it produced, or an `ErrorResponse` whose
//! message matches the error status already broadcast.

pub mod session;
