//! OpenRouter text generation and model catalog.

use std::time::Duration;

use async_trait::async_trait;
use reel_models::{
    clamp_duration, ModelCapability, ModelInfo, ModelProvider, SceneDraft,
    DEFAULT_SCENE_DURATION_SECS,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    send_json, strip_code_fence, AdapterError, AdapterResult, GeneratedScript, ModelCatalog,
    SceneRequest, SceneWriter, ScriptGenerator, ScriptRequest,
};
use crate::config::{env_duration_secs, validated_base_url};
use crate::prompts::{
    build_scene_prompt, build_script_prompt, SCENE_SYSTEM_PROMPT, SCRIPT_SYSTEM_PROMPT,
};

const PROVIDER: &str = "openrouter";
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter client configuration.
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    /// Sent as `X-Title` for OpenRouter's app attribution.
    pub app_name: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
            app_name: "Reel".to_string(),
        }
    }
}

impl OpenRouterConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("OPENROUTER_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            base_url: validated_base_url("OPENROUTER_BASE_URL", DEFAULT_BASE_URL),
            timeout: env_duration_secs("OPENROUTER_TIMEOUT_SECS", defaults.timeout),
            app_name: std::env::var("OPENROUTER_APP_NAME").unwrap_or(defaults.app_name),
        }
    }
}

/// OpenRouter chat-completions client.
pub struct OpenRouterClient {
    config: OpenRouterConfig,
    http: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Script JSON as returned by the model.
#[derive(Debug, Deserialize)]
struct RawScript {
    #[serde(default)]
    synopsis: Option<String>,
    #[serde(default)]
    scenes: Vec<RawScene>,
}

#[derive(Debug, Deserialize)]
struct RawScene {
    #[serde(default)]
    narration: String,
    #[serde(default, alias = "visualDescription")]
    visual_description: String,
    #[serde(default, alias = "visualPrompt")]
    visual_prompt: Option<String>,
    #[serde(default, alias = "negativePrompt")]
    negative_prompt: Option<String>,
    #[serde(default, alias = "duration", alias = "durationSecs")]
    duration_secs: Option<f64>,
}

impl RawScene {
    fn into_draft(self) -> SceneDraft {
        let duration = self
            .duration_secs
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.round() as u32)
            .unwrap_or(DEFAULT_SCENE_DURATION_SECS);
        SceneDraft {
            narration: self.narration.trim().to_string(),
            visual_description: self.visual_description.trim().to_string(),
            visual_prompt: self.visual_prompt.filter(|p| !p.trim().is_empty()),
            negative_prompt: self.negative_prompt.filter(|p| !p.trim().is_empty()),
            duration_secs: clamp_duration(duration),
        }
    }

    fn is_blank(&self) -> bool {
        self.narration.trim().is_empty() && self.visual_description.trim().is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<RawModel>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    context_length: Option<u32>,
    #[serde(default)]
    architecture: Option<Architecture>,
}

#[derive(Debug, Deserialize)]
struct Architecture {
    #[serde(default)]
    output_modalities: Vec<String>,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> AdapterResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AdapterError::provider(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> AdapterResult<Self> {
        Self::new(OpenRouterConfig::from_env())
    }

    fn api_key(&self) -> AdapterResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| AdapterError::not_configured("OPENROUTER_API_KEY is not set"))
    }

    /// Run one JSON-mode chat completion and return the message text.
    async fn complete(
        &self,
        operation: &str,
        model_id: &str,
        system: &str,
        user: &str,
    ) -> AdapterResult<String> {
        let api_key = self.api_key()?;
        let body = ChatRequest {
            model: model_id,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!(model = model_id, operation = operation, "Calling OpenRouter");
        let request = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(api_key)
            .header("X-Title", &self.config.app_name)
            .json(&body);

        let response: ChatResponse = send_json(PROVIDER, operation, request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AdapterError::invalid_response("No content in OpenRouter response"))
    }
}

/// Parse the model's script JSON. Blank scenes are dropped.
fn parse_script(text: &str) -> AdapterResult<GeneratedScript> {
    let raw: RawScript = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| AdapterError::invalid_response(format!("Failed to parse script JSON: {}", e)))?;

    let scenes: Vec<SceneDraft> = raw
        .scenes
        .into_iter()
        .filter(|s| !s.is_blank())
        .map(RawScene::into_draft)
        .collect();
    if scenes.is_empty() {
        return Err(AdapterError::invalid_response("Script contained no scenes"));
    }

    Ok(GeneratedScript {
        synopsis: raw.synopsis.filter(|s| !s.trim().is_empty()),
        scenes,
    })
}

fn parse_scene(text: &str) -> AdapterResult<SceneDraft> {
    let raw: RawScene = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| AdapterError::invalid_response(format!("Failed to parse scene JSON: {}", e)))?;
    if raw.is_blank() {
        return Err(AdapterError::invalid_response("Scene has no narration or visuals"));
    }
    Ok(raw.into_draft())
}

fn model_capabilities(model: &RawModel) -> Vec<ModelCapability> {
    let mut capabilities = vec![ModelCapability::Text];
    let outputs_images = model
        .architecture
        .as_ref()
        .is_some_and(|a| a.output_modalities.iter().any(|m| m == "image"));
    if outputs_images {
        capabilities.push(ModelCapability::Image);
    }
    capabilities
}

#[async_trait]
impl ScriptGenerator for OpenRouterClient {
    async fn generate_script(
        &self,
        model_id: &str,
        request: &ScriptRequest,
    ) -> AdapterResult<GeneratedScript> {
        let prompt = build_script_prompt(request);
        let text = self
            .complete("generate_script", model_id, SCRIPT_SYSTEM_PROMPT, &prompt)
            .await?;
        let script = parse_script(&text)?;
        info!(model = model_id, scenes = script.scenes.len(), "Generated script");
        Ok(script)
    }
}

#[async_trait]
impl SceneWriter for OpenRouterClient {
    async fn write_scene(
        &self,
        model_id: &str,
        request: &SceneRequest,
    ) -> AdapterResult<SceneDraft> {
        let prompt = build_scene_prompt(request);
        let text = self
            .complete("write_scene", model_id, SCENE_SYSTEM_PROMPT, &prompt)
            .await?;
        parse_scene(&text)
    }
}

#[async_trait]
impl ModelCatalog for OpenRouterClient {
    fn provider(&self) -> ModelProvider {
        ModelProvider::OpenRouter
    }

    async fn list_models(&self) -> AdapterResult<Vec<ModelInfo>> {
        let mut request = self.http.get(format!("{}/models", self.config.base_url));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response: ModelsResponse = send_json(PROVIDER, "list_models", request).await?;

        Ok(response
            .data
            .into_iter()
            .map(|m| {
                let capabilities = model_capabilities(&m);
                ModelInfo {
                    name: m.name.unwrap_or_else(|| m.id.clone()),
                    id: m.id,
                    provider: ModelProvider::OpenRouter,
                    capabilities,
                    description: m.description,
                    context_length: m.context_length,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterErrorKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, api_key: Option<&str>) -> OpenRouterClient {
        OpenRouterClient::new(OpenRouterConfig {
            api_key: api_key.map(String::from),
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            app_name: "Reel".into(),
        })
        .unwrap()
    }

    fn script_request() -> ScriptRequest {
        ScriptRequest {
            title: "Night Market".into(),
            theme: "A vendor's last night".into(),
            synopsis: None,
            style_id: None,
            tone_id: None,
            target_duration_secs: 20,
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
    }

    #[test]
    fn test_parse_script_fenced() {
        let text = r#"```json
{"synopsis": "s", "scenes": [
  {"narration": "one", "visualDescription": "stall at dusk", "duration": 4.6},
  {"narration": "", "visual_description": ""},
  {"narration": "two", "visual_description": "empty street", "duration_secs": 90}
]}
```"#;
        let script = parse_script(text).unwrap();
        assert_eq!(script.scenes.len(), 2);
        assert_eq!(script.scenes[0].visual_description, "stall at dusk");
        assert_eq!(script.scenes[0].duration_secs, 5);
        assert_eq!(script.scenes[1].duration_secs, 30);
        assert_eq!(script.synopsis.as_deref(), Some("s"));
    }

    #[test]
    fn test_parse_script_without_scenes_is_invalid() {
        let err = parse_script(r#"{"scenes": []}"#).unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::InvalidResponse);
        let err = parse_script("not json").unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn test_generate_script_posts_json_mode_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "google/gemini-2.5-flash",
                "response_format": { "type": "json_object" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"scenes":[{"narration":"Lanterns flicker.","visual_description":"rows of stalls"}]}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-test"));
        let script = client
            .generate_script("google/gemini-2.5-flash", &script_request())
            .await
            .unwrap();
        assert_eq!(script.scenes.len(), 1);
        assert_eq!(script.scenes[0].narration, "Lanterns flicker.");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let server = MockServer::start().await;
        let client = client_for(&server, None);
        let err = client
            .generate_script("google/gemini-2.5-flash", &script_request())
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::NotConfigured);
    }

    #[tokio::test]
    async fn test_provider_error_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-test"));
        let err = client
            .generate_script("google/gemini-2.5-flash", &script_request())
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Provider);
        assert!(err.message.contains("503"));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("{}"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(OpenRouterConfig {
            api_key: Some("sk-test".into()),
            base_url: server.uri(),
            timeout: Duration::from_millis(50),
            app_name: "Reel".into(),
        })
        .unwrap();
        let err = client
            .generate_script("google/gemini-2.5-flash", &script_request())
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_list_models_maps_capabilities() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "meta-llama/llama-3.3-70b-instruct:free", "name": "Llama 3.3 70B", "context_length": 131072 },
                    { "id": "google/gemini-2.5-flash-image", "architecture": { "output_modalities": ["image", "text"] } }
                ]
            })))
            .mount(&server)
            .await;

        let models = client_for(&server, None).list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "Llama 3.3 70B");
        assert!(!models[0].supports(ModelCapability::Image));
        assert!(models[1].supports(ModelCapability::Image));
        assert_eq!(models[1].name, "google/gemini-2.5-flash-image");
    }
}
