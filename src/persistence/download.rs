//! Download-style persistence: write straight into a directory

use super::{PersistenceError, PersistenceSink, SaveMethod, SaveRequest};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes recordings into a fixed directory without asking
#[derive(Debug, Clone)]
pub struct DownloadSink {
    dir: PathBuf,
}

impl DownloadSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// `name.ext`, or `name (n).ext` for the first free n
async fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        return candidate;
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (file_name, String::new()),
    };
    let mut n = 1;
    loop {
        let candidate = dir.join(format!("{} ({}){}", stem, n, ext));
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        n += 1;
    }
}

#[async_trait]
impl PersistenceSink for DownloadSink {
    fn method(&self) -> SaveMethod {
        SaveMethod::Download
    }

    async fn save(&self, request: &SaveRequest, bytes: Arc<[u8]>) -> Result<PathBuf, PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = unique_path(&self.dir, &request.file_name).await;
        tokio::fs::write(&path, &bytes[..]).await?;
        tracing::debug!("Downloaded {} bytes to {:?}", bytes.len(), path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_download_writes_file() {
        let dir = tempdir().unwrap();
        let sink = DownloadSink::new(dir.path().join("Downloads"));
        let request = SaveRequest::for_recording(Utc::now());

        let path = sink.save(&request, Arc::from(&b"segments"[..])).await.unwrap();
        assert_eq!(path, dir.path().join("Downloads").join(&request.file_name));
        assert_eq!(std::fs::read(&path).unwrap(), b"segments");
    }

    #[tokio::test]
    async fn test_download_does_not_overwrite() {
        let dir = tempdir().unwrap();
        let sink = DownloadSink::new(dir.path());
        let mut request = SaveRequest::for_recording(Utc::now());
        request.file_name = "recording-1.webm".to_string();

        let first = sink.save(&request, Arc::from(&b"a"[..])).await.unwrap();
        let second = sink.save(&request, Arc::from(&b"b"[..])).await.unwrap();

        assert_eq!(second, dir.path().join("recording-1 (1).webm"));
        assert_eq!(std::fs::read(first).unwrap(), b"a");
        assert_eq!(std::fs::read(second).unwrap(), b"b");
    }
}
