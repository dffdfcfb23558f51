//! Data models and structures
//!
//! Defines the prediction result shown to the user and the environment-driven
//! configuration for the staging bucket and inference endpoint.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Returned verbatim when the staged object cannot be found after upload.
pub const UPLOAD_FAILED_MESSAGE: &str = "Error: Failed to upload image to stage";

/// Returned when the inference call succeeds but yields no rows.
pub const NO_RESULT_MESSAGE: &str = "Unable to analyze the image";

/// Text answer of one analysis, success or failure alike.
///
/// `error` is only set when the inference call itself failed, so the page can
/// raise a banner above the (error-prefixed) text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Prediction {
    pub fn answer(text: String) -> Self {
        Self { text, error: None }
    }

    pub fn no_result() -> Self {
        Self::answer(NO_RESULT_MESSAGE.to_string())
    }

    pub fn upload_failed() -> Self {
        Self::answer(UPLOAD_FAILED_MESSAGE.to_string())
    }

    pub fn failed(err: &Error) -> Self {
        Self {
            text: format!("Error analyzing image: {}", err),
            error: Some(format!("Error calling the inference endpoint: {}", err)),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.text.starts_with("Error")
    }
}

/// Model id reported by the canned client when `INFERENCE_MODEL` is unset in dry run.
pub const DRY_RUN_MODEL: &str = "mock-vision";

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub inference_api_key: Option<String>,
    pub inference_base_url: String,
    pub inference_model: String,
    pub stage_bucket: String,
    pub stage_region: String,
    pub stage_endpoint: Option<String>,
    pub stage_access_key_id: Option<String>,
    pub stage_secret_access_key: Option<String>,
    pub stage_url_ttl_secs: u64,
    pub session_idle_secs: u64,
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
    pub dry_run: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; `from_env` feeds it the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dry_run = lookup("DRY_RUN")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let inference_api_key = lookup("INFERENCE_API_KEY").filter(|v| !v.trim().is_empty());
        if inference_api_key.is_none() && !dry_run {
            return Err(Error::Config(
                "INFERENCE_API_KEY not set (set DRY_RUN=true to run without one)".to_string(),
            ));
        }

        let inference_model = match lookup("INFERENCE_MODEL").filter(|v| !v.trim().is_empty()) {
            Some(model) => model,
            None if dry_run => DRY_RUN_MODEL.to_string(),
            None => {
                return Err(Error::Config(
                    "INFERENCE_MODEL not set (e.g. the vision model id your endpoint serves)"
                        .to_string(),
                ))
            }
        };

        let stage_access_key_id = lookup("STAGE_ACCESS_KEY_ID");
        let stage_secret_access_key = lookup("STAGE_SECRET_ACCESS_KEY");
        if stage_access_key_id.is_some() != stage_secret_access_key.is_some() {
            return Err(Error::Config(
                "STAGE_ACCESS_KEY_ID and STAGE_SECRET_ACCESS_KEY must be set together".to_string(),
            ));
        }

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| Error::Config(format!("Invalid BIND_ADDR: {}", e)))?;

        Ok(Self {
            inference_api_key,
            inference_base_url: lookup("INFERENCE_BASE_URL")
                .unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            inference_model,
            stage_bucket: lookup("STAGE_BUCKET").unwrap_or_else(|| "temp-images-stage".to_string()),
            stage_region: lookup("STAGE_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            stage_endpoint: lookup("STAGE_ENDPOINT"),
            stage_access_key_id,
            stage_secret_access_key,
            stage_url_ttl_secs: parse_number(&lookup, "STAGE_URL_TTL_SECS", 300)?,
            session_idle_secs: parse_number(&lookup, "SESSION_IDLE_SECS", 900)?,
            bind_addr,
            max_upload_bytes: parse_number(&lookup, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            dry_run,
        })
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
