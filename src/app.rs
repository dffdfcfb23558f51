//! Application orchestration: staging, inference, and the web server.

use crate::image::EncodedPayload;
use crate::inference::{CompletionClient, InferenceService, MockInferenceClient};
use crate::models::{Config, Prediction};
use crate::stage::client::S3StageSettings;
use crate::stage::{MockStageClient, S3StageClient, StageService, Stager, Staging, TokenGenerator};
use crate::web::{self, SessionStore};
use crate::{prompts, Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Runs the capture → stage → infer → cleanup pipeline for each request.
pub struct App {
    stager: Stager,
    inference: Arc<dyn InferenceService>,
    prompt: String,
    bind_addr: SocketAddr,
    max_upload_bytes: usize,
    session_idle: Duration,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub stage: Arc<dyn StageService>,
    pub inference: Arc<dyn InferenceService>,
    pub tokens: TokenGenerator,
}

impl App {
    /// Build an app from concrete service dependencies.
    pub fn with_services(services: AppServices, config: &Config) -> Self {
        Self {
            stager: Stager::with_tokens(services.stage, services.tokens),
            inference: services.inference,
            prompt: prompts::sanitize(prompts::AGE_ESTIMATE),
            bind_addr: config.bind_addr,
            max_upload_bytes: config.max_upload_bytes,
            session_idle: Duration::from_secs(config.session_idle_secs),
        }
    }

    /// Construct an app from environment-driven configuration.
    pub async fn new(config: Config) -> Result<Self> {
        let (stage, inference): (Arc<dyn StageService>, Arc<dyn InferenceService>) =
            if config.dry_run {
                info!("DRY_RUN enabled; using in-memory stage and canned inference");
                (
                    Arc::new(MockStageClient::new().with_area(config.stage_bucket.clone())),
                    Arc::new(MockInferenceClient::new().with_model(config.inference_model.clone())),
                )
            } else {
                let api_key = config.inference_api_key.clone().ok_or_else(|| {
                    Error::Config("INFERENCE_API_KEY is required outside dry run".to_string())
                })?;

                let stage = S3StageClient::new(S3StageSettings {
                    bucket: config.stage_bucket.clone(),
                    region: config.stage_region.clone(),
                    endpoint: config.stage_endpoint.clone(),
                    credentials: config
                        .stage_access_key_id
                        .clone()
                        .zip(config.stage_secret_access_key.clone()),
                    url_ttl: Duration::from_secs(config.stage_url_ttl_secs),
                })
                .await?;

                let inference = CompletionClient::new(api_key, config.inference_model.clone())
                    .with_base_url(config.inference_base_url.clone());

                (Arc::new(stage), Arc::new(inference))
            };

        info!("Staging area: {}, model: {}", stage.area(), inference.model());

        Ok(Self::with_services(
            AppServices {
                stage,
                inference,
                tokens: TokenGenerator::new(),
            },
            &config,
        ))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Stage the payload, ask the model, and clean up.
    ///
    /// Never fails: every error becomes the text of the returned prediction.
    pub async fn guess_age(&self, payload: &EncodedPayload) -> Prediction {
        let run = self
            .stager
            .scoped(payload, |staging| self.infer(staging))
            .await;

        match run {
            Ok(prediction) => prediction,
            Err(e) => {
                error!("Age analysis failed: {}", e);
                Prediction::failed(&e)
            }
        }
    }

    async fn infer(&self, staging: Staging) -> Result<Prediction> {
        let file = match staging {
            Staging::Ready(file) => file,
            Staging::UploadFailed => return Ok(Prediction::upload_failed()),
        };

        info!("Analyzing {} with {}", file.key, self.inference.model());

        match self.inference.complete(&self.prompt, &file).await? {
            Some(text) => {
                info!("Received prediction ({} chars)", text.len());
                Ok(Prediction::answer(text))
            }
            None => Ok(Prediction::no_result()),
        }
    }

    /// Serve the page and API until the process is stopped.
    pub async fn serve(self) -> Result<()> {
        let bind_addr = self.bind_addr;
        let sessions = SessionStore::with_idle_ttl(self.session_idle);
        let sweeper = sessions.spawn_sweeper();
        let router = web::router(Arc::new(self), sessions);

        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        info!("Listening on http://{}", listener.local_addr()?);

        let served = axum::serve(listener, router).await;
        sweeper.abort();
        served?;
        Ok(())
    }
}
