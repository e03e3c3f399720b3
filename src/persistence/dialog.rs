//! Persistence through the host save dialog

use super::{PersistenceError, PersistenceSink, SaveMethod, SaveRequest};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tauri::AppHandle;
use tauri_plugin_dialog::DialogExt;

/// Asks the user where to save, then writes the file
pub struct DialogSink {
    app: AppHandle,
    default_dir: Option<PathBuf>,
}

impl DialogSink {
    pub fn new(app: AppHandle, default_dir: Option<PathBuf>) -> Self {
        Self { app, default_dir }
    }
}

#[async_trait]
impl PersistenceSink for DialogSink {
    fn method(&self) -> SaveMethod {
        SaveMethod::Dialog
    }

    async fn save(&self, request: &SaveRequest, bytes: Arc<[u8]>) -> Result<PathBuf, PersistenceError> {
        let app = self.app.clone();
        let request = request.clone();
        let default_dir = self.default_dir.clone();

        // The blocking dialog must stay off the async runtime
        let picked = tokio::task::spawn_blocking(move || {
            let mut builder = app
                .dialog()
                .file()
                .set_title(&request.title)
                .set_file_name(&request.file_name);
            if let Some(dir) = default_dir {
                builder = builder.set_directory(dir);
            }
            for filter in &request.filters {
                let extensions: Vec<&str> = filter.extensions.iter().map(String::as_str).collect();
                builder = builder.add_filter(&filter.name, &extensions);
            }
            builder.blocking_save_file()
        })
        .await
        .map_err(|e| PersistenceError::Failed(format!("Save dialog failed: {}", e)))?;

        let path = picked
            .ok_or(PersistenceError::Cancelled)?
            .into_path()
            .map_err(|e| PersistenceError::Failed(e.to_string()))?;

        tokio::fs::write(&path, &bytes[..]).await?;
        Ok(path)
    }
}
