use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatMessageContent, MessagePart,
};
use super::InferenceService;
use crate::stage::StagedFile;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const MAX_COMPLETION_TOKENS: u32 = 1000;

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct CompletionClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl CompletionClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to inference endpoint: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Inference API error (status {}): {}", status, error_text);
            return Err(Error::Inference(format!("status {}: {}", status, error_text)));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse inference response: {}\nBody: {}", e, body);
            Error::Inference(format!("Failed to parse response: {}", e))
        })
    }
}

#[async_trait]
impl InferenceService for CompletionClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, file: &StagedFile) -> Result<Option<String>> {
        tracing::debug!("Requesting completion from {} for {}", self.model, file.key);

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(ChatMessageContent::Parts(vec![
                    MessagePart::text(prompt.to_string()),
                    MessagePart::image_url(file.url.clone()),
                ])),
            }],
            max_completion_tokens: MAX_COMPLETION_TOKENS,
        };

        let response: ChatCompletionResponse = self.post(CHAT_COMPLETIONS_PATH, &request).await?;
        Ok(response.first_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_MODEL: &str = "vision-1";

    fn make_client(server: &MockServer) -> CompletionClient {
        CompletionClient::new("test-key".to_string(), TEST_MODEL.to_string())
            .with_base_url(server.uri())
    }

    fn staged_file() -> StagedFile {
        StagedFile {
            area: "temp-images-stage".to_string(),
            key: "age_photo_abc12345.jpg/age_photo_x.jpg".to_string(),
            url: "https://stage.test/age_photo_abc12345.jpg/age_photo_x.jpg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(CHAT_COMPLETIONS_PATH))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": TEST_MODEL,
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "How old?"},
                        {
                            "type": "image_url",
                            "image_url": {"url": "https://stage.test/age_photo_abc12345.jpg/age_photo_x.jpg"}
                        }
                    ]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    {
                        "message": {"role": "assistant", "content": "Estimated age: 35-40 years"},
                        "finish_reason": "stop"
                    },
                    {
                        "message": {"role": "assistant", "content": "ignored"},
                        "finish_reason": "stop"
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = make_client(&server)
            .complete("How old?", &staged_file())
            .await
            .unwrap();
        assert_eq!(answer.as_deref(), Some("Estimated age: 35-40 years"));
    }

    #[tokio::test]
    async fn test_complete_without_choices_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(CHAT_COMPLETIONS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let answer = make_client(&server)
            .complete("How old?", &staged_file())
            .await
            .unwrap();
        assert!(answer.is_none());
    }

    #[tokio::test]
    async fn test_complete_api_error_is_inference_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(CHAT_COMPLETIONS_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let err = make_client(&server)
            .complete("How old?", &staged_file())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
        assert!(err.to_string().contains("internal error"));
    }

    #[tokio::test]
    async fn test_complete_rejects_malformed_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(CHAT_COMPLETIONS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = make_client(&server)
            .complete("How old?", &staged_file())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn test_with_base_url_trims_trailing_slash() {
        let client = CompletionClient::new("k".to_string(), "m".to_string())
            .with_base_url("http://localhost:9000/".to_string());
        assert_eq!(client.base_url, "http://localhost:9000");
        assert_eq!(client.model(), "m");
    }
}
