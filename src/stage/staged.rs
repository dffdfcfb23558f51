use super::{
    folder_name, StageService, StagedFile, Staging, TokenGenerator, OBJECT_EXTENSION,
    OBJECT_PREFIX,
};
use crate::image::EncodedPayload;
use crate::{Error, Result};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempPath;

/// Stages payloads and guarantees their release.
pub struct Stager {
    stage: Arc<dyn StageService>,
    tokens: TokenGenerator,
}

impl Stager {
    pub fn new(stage: Arc<dyn StageService>) -> Self {
        Self::with_tokens(stage, TokenGenerator::new())
    }

    pub fn with_tokens(stage: Arc<dyn StageService>, tokens: TokenGenerator) -> Self {
        Self { stage, tokens }
    }

    /// Ensure the area exists and write the payload to a scratch file.
    ///
    /// Nothing is uploaded yet; the returned guard owns both the scratch file
    /// and the remote key it will use.
    pub async fn acquire(&self, payload: &EncodedPayload) -> Result<StagedImage> {
        self.stage.ensure_area().await?;

        let bytes = payload.decode()?;
        let token = self.tokens.next_token();

        let mut scratch = tempfile::Builder::new()
            .prefix(&format!("{}_", OBJECT_PREFIX))
            .suffix(&format!(".{}", OBJECT_EXTENSION))
            .tempfile()?;
        scratch.write_all(&bytes)?;
        scratch.flush()?;
        let scratch = scratch.into_temp_path();

        let scratch_name = scratch
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::Invariant(format!("Invalid scratch file path: {}", scratch.display()))
            })?
            .to_string();

        let key = format!("{}/{}", folder_name(&token), scratch_name);
        tracing::debug!("Wrote {} bytes to scratch file for {}", bytes.len(), key);

        Ok(StagedImage {
            stage: Arc::clone(&self.stage),
            key,
            scratch: Some(scratch),
            released: false,
        })
    }

    /// Stage `payload`, run `body` against the outcome, then release.
    ///
    /// Release runs on every exit of `body`. A failure deleting the local
    /// scratch file is returned in place of the body's value; a failure
    /// deleting the remote object is dropped.
    pub async fn scoped<T, F, Fut>(&self, payload: &EncodedPayload, body: F) -> Result<T>
    where
        F: FnOnce(Staging) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let staged = self.acquire(payload).await?;

        let value = match staged.upload().await {
            Ok(staging) => body(staging).await,
            Err(e) => Err(e),
        };

        staged.release().await?;
        value
    }
}

/// Guard over one staged photo: the local scratch file plus its remote key.
///
/// Call [`StagedImage::release`] to clean up. If the guard is dropped without
/// it (panic, cancelled future), the scratch file is removed synchronously and
/// the remote delete is spawned onto the current runtime.
pub struct StagedImage {
    stage: Arc<dyn StageService>,
    key: String,
    scratch: Option<TempPath>,
    released: bool,
}

impl StagedImage {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Upload the scratch file and confirm the object is listed.
    pub async fn upload(&self) -> Result<Staging> {
        let scratch = self
            .scratch
            .as_ref()
            .ok_or_else(|| Error::Invariant("Scratch file already released".to_string()))?;

        self.stage.put(scratch, &self.key).await?;

        let listing = self.stage.list(&self.key).await?;
        if listing.is_empty() {
            tracing::warn!("Staged object {} missing from listing after upload", self.key);
            return Ok(Staging::UploadFailed);
        }

        let url = self.stage.locate(&self.key).await?;
        tracing::info!("Staged {} in {}", self.key, self.stage.area());

        Ok(Staging::Ready(StagedFile {
            area: self.stage.area().to_string(),
            key: self.key.clone(),
            url,
        }))
    }

    /// Delete the scratch file, then attempt the remote delete once.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;

        let local = match self.scratch.take() {
            Some(scratch) => scratch.close(),
            None => Ok(()),
        };

        if let Err(e) = self.stage.remove(&self.key).await {
            tracing::debug!("Ignoring failure to remove staged {}: {}", self.key, e);
        }

        Ok(local?)
    }
}

impl Drop for StagedImage {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        tracing::warn!("Staged {} dropped without release", self.key);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let stage = Arc::clone(&self.stage);
            let key = std::mem::take(&mut self.key);
            handle.spawn(async move {
                if let Err(e) = stage.remove(&key).await {
                    tracing::debug!("Ignoring failure to remove staged {}: {}", key, e);
                }
            });
        }
    }
}
