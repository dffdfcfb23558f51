//! Transient staging area for captured photos
//!
//! Each photo is written to a local scratch file, uploaded to an encrypted
//! S3-compatible bucket under a unique key, verified by listing, handed to the
//! inference call as a presigned URL, and removed again right after.

pub mod client;
pub mod mock;
pub mod staged;
pub mod token;

pub use client::S3StageClient;
pub use mock::MockStageClient;
pub use staged::{StagedImage, Stager};
pub use token::TokenGenerator;

use crate::Result;
use async_trait::async_trait;
use std::path::Path;

pub const OBJECT_PREFIX: &str = "age_photo";
pub const OBJECT_EXTENSION: &str = "jpg";

/// Remote storage operations the staging flow needs.
#[async_trait]
pub trait StageService: Send + Sync {
    /// Name of the storage area (bucket).
    fn area(&self) -> &str;
    /// Create the area with server-side encryption if it does not exist yet.
    async fn ensure_area(&self) -> Result<()>;
    async fn put(&self, local_path: &Path, key: &str) -> Result<()>;
    /// Keys in the area that start with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    /// A URL the inference provider can fetch the object from.
    async fn locate(&self, key: &str) -> Result<String>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Reference to a staged object, valid until the owning guard is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub area: String,
    pub key: String,
    pub url: String,
}

/// Outcome of an upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staging {
    Ready(StagedFile),
    /// The object did not show up in the listing after upload.
    UploadFailed,
}

/// Folder name for a token, e.g. `age_photo_abc12345.jpg`.
pub fn folder_name(token: &str) -> String {
    format!("{}_{}.{}", OBJECT_PREFIX, token, OBJECT_EXTENSION)
}
