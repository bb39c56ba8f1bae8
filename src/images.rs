//! Lead image download into the scratch directory.
//!
//! Each capture is one streamed GET with no retry. Failures of any kind are
//! logged and reported as `None`; they never affect the article or the run.
//! Every file written is remembered so the caller can sweep them afterwards.

use crate::api::{FetchError, status_error};
use crate::models::ScratchImage;
use futures::StreamExt;
use rand::{Rng, rng};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Extension given to every captured image.
pub const IMAGE_EXTENSION: &str = "jpeg";
/// Media type declared for captured images.
pub const IMAGE_MEDIA_TYPE: &str = "image/jpeg";
/// Length of the random part of a scratch file name.
pub const SCRATCH_NAME_LEN: usize = 10;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Source of scratch file names (without extension).
pub trait NameGenerator {
    fn next_name(&self) -> String;
}

/// Ten random ASCII letters per name.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNames;

impl NameGenerator for RandomNames {
    fn next_name(&self) -> String {
        let mut rng = rng();
        (0..SCRATCH_NAME_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("could not write scratch file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ImageError {
    fn from(e: reqwest::Error) -> Self {
        ImageError::Fetch(FetchError::Network(e))
    }
}

/// Downloads lead images into a scratch directory.
pub struct ImageCapture {
    client: Client,
    scratch_dir: PathBuf,
    names: Box<dyn NameGenerator>,
    created: Mutex<Vec<PathBuf>>,
}

impl ImageCapture {
    pub fn new(client: Client, scratch_dir: impl Into<PathBuf>, names: Box<dyn NameGenerator>) -> Self {
        Self {
            client,
            scratch_dir: scratch_dir.into(),
            names,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Download `image_url` to a freshly named scratch file.
    #[instrument(level = "info", skip(self))]
    pub async fn capture(&self, image_url: &str) -> Option<ScratchImage> {
        let file_name = format!("{}.{}", self.names.next_name(), IMAGE_EXTENSION);
        let path = self.scratch_dir.join(&file_name);
        self.remember(&path);

        match self.download(image_url, &path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes, "Captured lead image");
                Some(ScratchImage { file_name, path })
            }
            Err(e) => {
                warn!(%image_url, error = %e, "Error downloading image; chapter will have none");
                let _ = fs::remove_file(&path).await;
                None
            }
        }
    }

    async fn download(&self, image_url: &str, path: &Path) -> Result<u64, ImageError> {
        let response = self.client.get(image_url).send().await?;
        if let Some(e) = status_error(response.status()) {
            return Err(e.into());
        }

        let mut file = File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    fn remember(&self, path: &Path) {
        if let Ok(mut created) = self.created.lock() {
            created.push(path.to_path_buf());
        }
    }

    /// Every scratch path this capture has used so far.
    pub fn scratch_files(&self) -> Vec<PathBuf> {
        self.created
            .lock()
            .map(|created| created.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Sequential(Cell<u32>);

    impl NameGenerator for Sequential {
        fn next_name(&self) -> String {
            let n = self.0.get();
            self.0.set(n + 1);
            format!("img{n:07}")
        }
    }

    #[test]
    fn test_random_names_are_ten_letters() {
        let a = RandomNames.next_name();
        let b = RandomNames.next_name();
        assert_eq!(a.len(), SCRATCH_NAME_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphabetic()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_capture_writes_file() {
        let server = MockServer::start().await;
        let body = vec![0xFFu8, 0xD8, 0xFF, 0xE0, 1, 2, 3];
        Mock::given(method("GET"))
            .and(path("/lead.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let capture = ImageCapture::new(Client::new(), dir.path(), Box::new(Sequential(Cell::new(0))));
        let image = capture
            .capture(&format!("{}/lead.jpg", server.uri()))
            .await
            .unwrap();

        assert_eq!(image.file_name, "img0000000.jpeg");
        assert_eq!(std::fs::read(&image.path).unwrap(), body);
        assert_eq!(capture.scratch_files(), vec![image.path]);
    }

    #[tokio::test]
    async fn test_capture_404_yields_none_and_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let capture = ImageCapture::new(Client::new(), dir.path(), Box::new(RandomNames));
        let image = capture.capture(&format!("{}/missing.jpg", server.uri())).await;

        assert!(image.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_capture_bad_url_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let capture = ImageCapture::new(Client::new(), dir.path(), Box::new(RandomNames));
        assert!(capture.capture("not a url").await.is_none());
    }
}
