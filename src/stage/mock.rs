use super::StageService;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// In-memory stage used by tests and `DRY_RUN`.
#[derive(Clone)]
pub struct MockStageClient {
    area: String,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    last_put_path: Arc<Mutex<Option<PathBuf>>>,
    ensure_count: Arc<Mutex<usize>>,
    put_count: Arc<Mutex<usize>>,
    list_count: Arc<Mutex<usize>>,
    remove_count: Arc<Mutex<usize>>,
    empty_listing: bool,
    fail_put: bool,
    fail_remove: bool,
}

impl MockStageClient {
    pub fn new() -> Self {
        Self {
            area: "mock-stage".to_string(),
            files: Arc::new(Mutex::new(HashMap::new())),
            last_put_path: Arc::new(Mutex::new(None)),
            ensure_count: Arc::new(Mutex::new(0)),
            put_count: Arc::new(Mutex::new(0)),
            list_count: Arc::new(Mutex::new(0)),
            remove_count: Arc::new(Mutex::new(0)),
            empty_listing: false,
            fail_put: false,
            fail_remove: false,
        }
    }

    pub fn with_area(mut self, area: String) -> Self {
        self.area = area;
        self
    }

    /// Accept uploads but never report them in listings.
    pub fn with_empty_listing(mut self) -> Self {
        self.empty_listing = true;
        self
    }

    pub fn with_put_failure(mut self) -> Self {
        self.fail_put = true;
        self
    }

    pub fn with_remove_failure(mut self) -> Self {
        self.fail_remove = true;
        self
    }

    pub fn get_ensure_count(&self) -> usize {
        *self.ensure_count.lock().unwrap()
    }

    pub fn get_put_count(&self) -> usize {
        *self.put_count.lock().unwrap()
    }

    pub fn get_list_count(&self) -> usize {
        *self.list_count.lock().unwrap()
    }

    pub fn get_remove_count(&self) -> usize {
        *self.remove_count.lock().unwrap()
    }

    pub fn get_files(&self) -> HashMap<String, Vec<u8>> {
        self.files.lock().unwrap().clone()
    }

    /// Local path handed to the most recent `put`.
    pub fn get_last_put_path(&self) -> Option<PathBuf> {
        self.last_put_path.lock().unwrap().clone()
    }
}

impl Default for MockStageClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageService for MockStageClient {
    fn area(&self) -> &str {
        &self.area
    }

    async fn ensure_area(&self) -> Result<()> {
        *self.ensure_count.lock().unwrap() += 1;
        Ok(())
    }

    async fn put(&self, local_path: &Path, key: &str) -> Result<()> {
        *self.put_count.lock().unwrap() += 1;
        *self.last_put_path.lock().unwrap() = Some(local_path.to_path_buf());

        if self.fail_put {
            return Err(Error::Stage("Mock put failure".to_string()));
        }

        let data = tokio::fs::read(local_path).await?;
        self.files.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        *self.list_count.lock().unwrap() += 1;

        if self.empty_listing {
            return Ok(Vec::new());
        }

        let mut keys: Vec<String> = self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn locate(&self, key: &str) -> Result<String> {
        Ok(format!("mock://{}/{}", self.area, key))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        *self.remove_count.lock().unwrap() += 1;

        if self.fail_remove {
            return Err(Error::Stage("Mock remove failure".to_string()));
        }

        self.files.lock().unwrap().remove(key);
        Ok(())
    }
}
