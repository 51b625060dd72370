//! Image upload pipeline
//!
//! Linear flow used by the admin image fields:
//!
//! ```text
//! idle ─select─▶ selected ─open editor─▶ editing ─confirm─▶ confirming ─▶ uploading ─▶ saved
//!                    │                                                      │
//!                    └────────────confirm original──────────────────────────┴──▶ error ─retry─▶ uploading
//! ```
//!
//! Nothing reaches the [`ImageStore`] before an explicit confirm. The image
//! editor itself is external; it only hands back an edited image as a data
//! URL or bare base64.

use crate::error::PipelineError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Storage folder of an uploaded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageCategory {
    Hero,
    Atelier,
    Gallery,
    Blog,
    Portraits,
}

impl ImageCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hero => "hero",
            Self::Atelier => "atelier",
            Self::Gallery => "gallery",
            Self::Blog => "blog",
            Self::Portraits => "portraits",
        }
    }
}

impl fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique storage path: `{category}/{millis}_{file name}`
///
/// Characters other than ASCII letters, digits and `.` become `_`.
#[must_use]
pub fn generate_image_path(category: ImageCategory, file_name: &str, now: DateTime<Utc>) -> String {
    let clean: String = file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect();
    format!("{category}/{}_{clean}", now.timestamp_millis())
}

/// Path for an AI-edited version of an uploaded image
///
/// A trailing extension (a `.` followed by at least one character, none of
/// them `/`) is replaced; dotfile names lose everything after the dot.
#[must_use]
pub fn ai_image_path(original: &str, version: u32) -> String {
    let base = match original.rfind('.') {
        Some(dot) if dot + 1 < original.len() && !original[dot + 1..].contains('/') => &original[..dot],
        _ => original,
    };
    format!("{base}_ai_v{version}.png")
}

/// Decode an edited image handed back as a data URL or bare base64
///
/// # Errors
/// - `PipelineError::Decode` if the payload is not valid base64
pub fn decode_image_data(data: &str) -> Result<Vec<u8>, PipelineError> {
    let payload = data.split_once(',').map_or(data, |(_, body)| body);
    STANDARD
        .decode(payload.trim())
        .map_err(|e| PipelineError::Decode(e.to_string()))
}

/// Progress callback, percent in `0..=100`
pub type ProgressFn = dyn Fn(u8) + Send + Sync;

/// Blob storage for images
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    /// Upload bytes to `path`, returning the public download URL
    async fn upload(&self, bytes: Vec<u8>, path: &str, progress: &ProgressFn) -> Result<String, PipelineError>;
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    #[default]
    Idle,
    Selected,
    Editing,
    Confirming,
    Uploading,
    Saved,
    Error,
}

impl PipelineStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Selected => "selected",
            Self::Editing => "editing",
            Self::Confirming => "confirming",
            Self::Uploading => "uploading",
            Self::Saved => "saved",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
struct SelectedImage {
    file_name: String,
    bytes: Vec<u8>,
}

/// Select → edit → confirm → upload flow for one image field
pub struct ImagePipeline {
    store: Arc<dyn ImageStore>,
    category: ImageCategory,
    status: PipelineStatus,
    progress: Arc<AtomicU8>,
    original: Option<SelectedImage>,
    edited: Option<String>,
    error: Option<PipelineError>,
    url: Option<String>,
    on_persist: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl ImagePipeline {
    #[must_use]
    pub fn new(store: Arc<dyn ImageStore>, category: ImageCategory) -> Self {
        Self {
            store,
            category,
            status: PipelineStatus::Idle,
            progress: Arc::new(AtomicU8::new(0)),
            original: None,
            edited: None,
            error: None,
            url: None,
            on_persist: None,
        }
    }

    /// Called with the download URL after every successful upload
    #[must_use]
    pub fn on_persist(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_persist = Some(Box::new(callback));
        self
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    /// Upload progress in percent
    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.original.as_ref().map(|o| o.file_name.as_str())
    }

    #[must_use]
    pub fn edited(&self) -> Option<&str> {
        self.edited.as_deref()
    }

    /// URL of the last successful upload
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Hold a local file; nothing is uploaded
    pub fn select_file(&mut self, file_name: impl Into<String>, bytes: Vec<u8>) {
        self.original = Some(SelectedImage {
            file_name: file_name.into(),
            bytes,
        });
        self.edited = None;
        self.error = None;
        self.progress.store(0, Ordering::Relaxed);
        self.status = PipelineStatus::Selected;
    }

    /// Hand the selected image to the external editor
    ///
    /// # Errors
    /// - `PipelineError::InvalidState` if nothing is selected
    pub fn open_editor(&mut self) -> Result<(), PipelineError> {
        if self.original.is_none() {
            return Err(PipelineError::InvalidState {
                action: "open editor",
                state: self.status.as_str(),
            });
        }
        self.status = PipelineStatus::Editing;
        Ok(())
    }

    /// Store the image returned by the editor
    pub fn set_edited(&mut self, data: impl Into<String>) {
        self.edited = Some(data.into());
        self.status = PipelineStatus::Editing;
    }

    /// Upload the originally selected file
    ///
    /// # Errors
    /// - `PipelineError::NothingToUpload` if no file was selected
    /// - the store's error, also retained in [`error`](Self::error)
    pub async fn confirm_original(&mut self) -> Result<String, PipelineError> {
        let Some(original) = self.original.clone() else {
            tracing::error!("no original image to upload");
            return Err(PipelineError::NothingToUpload("original"));
        };
        self.status = PipelineStatus::Confirming;
        self.upload(original.bytes, &original.file_name).await
    }

    /// Upload the edited image
    ///
    /// # Errors
    /// - `PipelineError::NothingToUpload` if the editor returned nothing
    /// - `PipelineError::Decode` if the edited payload is not base64
    /// - the store's error, also retained in [`error`](Self::error)
    pub async fn confirm_edited(&mut self) -> Result<String, PipelineError> {
        let Some(edited) = self.edited.clone() else {
            tracing::error!("no edited image to upload");
            return Err(PipelineError::NothingToUpload("edited"));
        };
        self.status = PipelineStatus::Confirming;
        let bytes = match decode_image_data(&edited) {
            Ok(bytes) => bytes,
            Err(err) => return Err(self.fail(err)),
        };
        let file_name = self
            .file_name()
            .map_or_else(|| format!("image_{}.png", Utc::now().timestamp_millis()), str::to_string);
        self.upload(bytes, &file_name).await
    }

    /// Repeat the last confirm: the edited image if there is one, else the original
    ///
    /// # Errors
    /// Same as the confirm being repeated.
    pub async fn retry(&mut self) -> Result<String, PipelineError> {
        if self.edited.is_some() {
            self.confirm_edited().await
        } else {
            self.confirm_original().await
        }
    }

    /// Drop local images and return to idle
    pub fn cancel(&mut self) {
        self.original = None;
        self.edited = None;
        self.error = None;
        self.progress.store(0, Ordering::Relaxed);
        self.status = PipelineStatus::Idle;
    }

    /// Full reset, including the last uploaded URL
    pub fn reset(&mut self) {
        self.cancel();
        self.url = None;
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        tracing::warn!(category = %self.category, error = %err, "image upload failed");
        self.status = PipelineStatus::Error;
        self.error = Some(err.clone());
        err
    }

    async fn upload(&mut self, bytes: Vec<u8>, file_name: &str) -> Result<String, PipelineError> {
        let path = generate_image_path(self.category, file_name, Utc::now());
        self.status = PipelineStatus::Uploading;
        self.progress.store(0, Ordering::Relaxed);

        let progress = Arc::clone(&self.progress);
        let report = move |pct: u8| progress.store(pct.min(100), Ordering::Relaxed);

        let result = self.store.upload(bytes, &path, &report).await;
        match result {
            Ok(url) => {
                tracing::info!(category = %self.category, %path, "image uploaded");
                self.status = PipelineStatus::Saved;
                self.progress.store(100, Ordering::Relaxed);
                self.error = None;
                if let Some(callback) = &self.on_persist {
                    callback(&url);
                }
                self.original = None;
                self.edited = None;
                self.url = Some(url.clone());
                Ok(url)
            }
            Err(err) => Err(self.fail(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeStore {
        uploads: Mutex<Vec<(String, Vec<u8>)>>,
        fail: Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl ImageStore for FakeStore {
        async fn upload(&self, bytes: Vec<u8>, path: &str, progress: &ProgressFn) -> Result<String, PipelineError> {
            progress(50);
            if *self.fail.lock() {
                return Err(PipelineError::Upload("quota".to_string()));
            }
            self.uploads.lock().push((path.to_string(), bytes));
            Ok(format!("https://cdn.example/{path}"))
        }
    }

    fn pipeline(store: &Arc<FakeStore>) -> ImagePipeline {
        let store: Arc<dyn ImageStore> = store.clone();
        ImagePipeline::new(store, ImageCategory::Gallery)
    }

    #[test]
    fn image_paths() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        assert_eq!(
            generate_image_path(ImageCategory::Hero, "my photo (1).jpg", now),
            "hero/1700000000000_my_photo__1_.jpg"
        );
        assert_eq!(ai_image_path("gallery/1_a.jpg", 2), "gallery/1_a_ai_v2.png");
        assert_eq!(ai_image_path("gallery.v1/photo", 1), "gallery.v1/photo_ai_v1.png");
    }

    #[test]
    fn ai_path_extension_edge_cases() {
        assert_eq!(ai_image_path("photo.", 1), "photo._ai_v1.png");
        assert_eq!(ai_image_path("dir/.hidden", 1), "dir/_ai_v1.png");
        assert_eq!(ai_image_path("noext", 3), "noext_ai_v3.png");
        assert_eq!(ai_image_path("a.b.jpeg", 1), "a.b_ai_v1.png");
    }

    #[test]
    fn decode_data_url_and_bare_base64() {
        assert_eq!(decode_image_data("data:image/png;base64,aGk=").unwrap(), b"hi");
        assert_eq!(decode_image_data("aGk=").unwrap(), b"hi");
        assert!(matches!(decode_image_data("%%%"), Err(PipelineError::Decode(_))));
    }

    #[tokio::test]
    async fn nothing_uploads_before_confirm() {
        let store = Arc::new(FakeStore::default());
        let mut pipeline = pipeline(&store);
        assert!(pipeline.open_editor().is_err());

        pipeline.select_file("dress.png", vec![1, 2, 3]);
        assert_eq!(pipeline.status(), PipelineStatus::Selected);
        pipeline.open_editor().unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Editing);
        assert!(store.uploads.lock().is_empty());

        pipeline.cancel();
        assert_eq!(pipeline.status(), PipelineStatus::Idle);
        assert!(pipeline.confirm_original().await.is_err());
        assert!(store.uploads.lock().is_empty());
    }

    #[tokio::test]
    async fn confirm_edited_uploads_decoded_bytes() {
        let store = Arc::new(FakeStore::default());
        let persisted = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&persisted);
        let mut pipeline =
            pipeline(&store).on_persist(move |url| *sink.lock() = Some(url.to_string()));

        pipeline.select_file("dress.png", vec![9]);
        pipeline.set_edited("data:image/png;base64,aGk=");
        let url = pipeline.confirm_edited().await.unwrap();

        assert_eq!(pipeline.status(), PipelineStatus::Saved);
        assert_eq!(pipeline.progress(), 100);
        assert_eq!(persisted.lock().as_deref(), Some(url.as_str()));
        let uploads = store.uploads.lock();
        assert_eq!(uploads[0].1, b"hi");
        assert!(uploads[0].0.starts_with("gallery/"));
        assert!(uploads[0].0.ends_with("_dress.png"));
    }

    #[tokio::test]
    async fn failed_upload_keeps_image_for_retry() {
        let store = Arc::new(FakeStore::default());
        *store.fail.lock() = true;
        let mut pipeline = pipeline(&store);
        pipeline.select_file("a.jpg", vec![7]);

        assert!(pipeline.confirm_original().await.is_err());
        assert_eq!(pipeline.status(), PipelineStatus::Error);
        assert_eq!(pipeline.progress(), 50);
        assert!(pipeline.error().is_some());

        *store.fail.lock() = false;
        pipeline.retry().await.unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Saved);
        assert_eq!(store.uploads.lock()[0].1, vec![7]);
        assert!(pipeline.file_name().is_none());
    }
}
