use actix_web::web;
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ImageStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Empty upload")]
    Empty,
    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("Blocking file task failed")]
    Blocking,
}

/// Durable home for uploaded images. References returned by `save` are what
/// prediction records point at.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, data: &[u8], original_name: &str) -> Result<String, ImageStoreError>;

    async fn exists(&self, image_ref: &str) -> bool;

    async fn load(&self, image_ref: &str) -> Result<Vec<u8>, ImageStoreError>;

    async fn remove(&self, image_ref: &str) -> Result<(), ImageStoreError>;
}

#[derive(Debug, Clone)]
pub struct LocalImageStore {
    root: PathBuf,
    max_bytes: usize,
}

impl LocalImageStore {
    /// Creates `root` if it does not exist yet.
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Result<Self, ImageStoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| io_error(&root, source))?;
        Ok(Self { root, max_bytes })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn calculate_image_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    pub fn check_size(&self, data: &[u8]) -> Result<(), ImageStoreError> {
        if data.is_empty() {
            return Err(ImageStoreError::Empty);
        }
        if data.len() > self.max_bytes {
            return Err(ImageStoreError::TooLarge {
                size: data.len(),
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// `<UTC timestamp with microseconds>_<12 hex of sha256>_<sanitized name>`.
    pub fn generate_file_name(data: &[u8], original_name: &str) -> String {
        let hash = Self::calculate_image_hash(data);
        let mut name = sanitize_file_name(original_name);
        if !has_image_extension(&name) {
            if let Some(ext) = detected_extension(data) {
                name = format!("{}.{}", name, ext);
            }
        }
        format!(
            "{}_{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S_%6f"),
            &hash[..12],
            name
        )
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save(&self, data: &[u8], original_name: &str) -> Result<String, ImageStoreError> {
        self.check_size(data)?;
        let target = self.root.join(Self::generate_file_name(data, original_name));
        let root = self.root.clone();
        let data = data.to_vec();

        let saved = web::block(move || -> Result<PathBuf, ImageStoreError> {
            // Write to a temp file in the same directory, then rename into place.
            let mut tmp = tempfile::NamedTempFile::new_in(&root)
                .map_err(|source| io_error(&root, source))?;
            tmp.write_all(&data)
                .and_then(|_| tmp.as_file().sync_all())
                .map_err(|source| io_error(tmp.path(), source))?;
            tmp.persist(&target)
                .map_err(|e| io_error(&target, e.error))?;
            Ok(target)
        })
        .await
        .map_err(|_| ImageStoreError::Blocking)??;

        log::info!("Saved upload to {}", saved.display());
        Ok(saved.display().to_string())
    }

    async fn exists(&self, image_ref: &str) -> bool {
        let path = PathBuf::from(image_ref);
        web::block(move || path.is_file()).await.unwrap_or(false)
    }

    async fn load(&self, image_ref: &str) -> Result<Vec<u8>, ImageStoreError> {
        let path = PathBuf::from(image_ref);
        web::block(move || std::fs::read(&path).map_err(|source| io_error(&path, source)))
            .await
            .map_err(|_| ImageStoreError::Blocking)?
    }

    async fn remove(&self, image_ref: &str) -> Result<(), ImageStoreError> {
        let path = PathBuf::from(image_ref);
        web::block(move || std::fs::remove_file(&path).map_err(|source| io_error(&path, source)))
            .await
            .map_err(|_| ImageStoreError::Blocking)?
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ImageStoreError {
    ImageStoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Keeps ASCII alphanumerics, `.`, `-` and `_`; anything else becomes `_`.
fn sanitize_file_name(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

fn has_image_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(image::ImageFormat::from_extension)
        .is_some()
}

fn detected_extension(data: &[u8]) -> Option<&'static str> {
    image::guess_format(data)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
}
