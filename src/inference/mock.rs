use super::InferenceService;
use crate::models::DRY_RUN_MODEL;
use crate::stage::StagedFile;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Scripted inference client for tests and `DRY_RUN`.
///
/// Answers cycle through the configured responses; with none configured a
/// fixed estimate is returned.
#[derive(Clone)]
pub struct MockInferenceClient {
    model: String,
    responses: Arc<Mutex<Vec<String>>>,
    no_rows: bool,
    failure: Option<String>,
    call_count: Arc<Mutex<usize>>,
    requests: Arc<Mutex<Vec<(String, StagedFile)>>>,
}

impl MockInferenceClient {
    pub fn new() -> Self {
        Self {
            model: DRY_RUN_MODEL.to_string(),
            responses: Arc::new(Mutex::new(Vec::new())),
            no_rows: false,
            failure: None,
            call_count: Arc::new(Mutex::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_response(self, response: String) -> Self {
        self.responses.lock().unwrap().push(response);
        self
    }

    /// Succeed with an empty row set.
    pub fn with_no_rows(mut self) -> Self {
        self.no_rows = true;
        self
    }

    pub fn with_failure(mut self, message: String) -> Self {
        self.failure = Some(message);
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// `(prompt, file)` for every call, oldest first.
    pub fn get_requests(&self) -> Vec<(String, StagedFile)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockInferenceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceService for MockInferenceClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, file: &StagedFile) -> Result<Option<String>> {
        let mut count = self.call_count.lock().unwrap();
        *count += 1;
        self.requests
            .lock()
            .unwrap()
            .push((prompt.to_string(), file.clone()));

        if let Some(message) = &self.failure {
            return Err(Error::Inference(message.clone()));
        }
        if self.no_rows {
            return Ok(None);
        }

        let responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Some(
                "Estimated age: 30-35 years, based on skin texture and facial features."
                    .to_string(),
            ))
        } else {
            let index = (*count - 1) % responses.len();
            Ok(Some(responses[index].clone()))
        }
    }
}
