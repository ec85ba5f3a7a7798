//! fal.ai image and video generation.

use std::time::Duration;

use async_trait::async_trait;
use reel_models::{ModelCapability, ModelInfo, ModelProvider};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    send_json, AdapterError, AdapterResult, GeneratedImage, GeneratedVideo, ImageGenerator,
    ImageRequest, ModelCatalog, VideoGenerator, VideoRequest,
};
use crate::config::{env_duration_secs, validated_base_url};

const PROVIDER: &str = "fal";
const DEFAULT_BASE_URL: &str = "https://fal.run";
const DEFAULT_CATALOG_URL: &str = "https://api.fal.ai/v1/models";

/// Vertical frame for shorts.
const IMAGE_SIZE: &str = "portrait_16_9";

#[derive(Debug, Clone)]
pub struct FalConfig {
    pub api_key: Option<String>,
    /// Synchronous run endpoint; the model id is appended as a path.
    pub base_url: String,
    pub catalog_url: String,
    pub timeout: Duration,
}

impl Default for FalConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            // Video models routinely take minutes.
            timeout: Duration::from_secs(600),
        }
    }
}

impl FalConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("FAL_KEY").ok().filter(|k| !k.is_empty()),
            base_url: validated_base_url("FAL_BASE_URL", DEFAULT_BASE_URL),
            catalog_url: validated_base_url("FAL_CATALOG_URL", DEFAULT_CATALOG_URL),
            timeout: env_duration_secs("FAL_TIMEOUT_SECS", defaults.timeout),
        }
    }
}

/// fal.ai client for image and video models.
pub struct FalClient {
    config: FalConfig,
    http: Client,
}

#[derive(Debug, Serialize)]
struct ImageInput<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    image_size: &'static str,
    num_images: u32,
}

#[derive(Debug, Serialize)]
struct VideoInput<'a> {
    prompt: &'a str,
    image_url: &'a str,
    duration: &'static str,
}

#[derive(Debug, Deserialize)]
struct ImageOutput {
    #[serde(default)]
    images: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
struct VideoOutput {
    video: Option<FileRef>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    models: Vec<CatalogModel>,
}

#[derive(Debug, Deserialize)]
struct CatalogModel {
    endpoint_id: String,
    #[serde(default)]
    metadata: CatalogMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogMetadata {
    display_name: Option<String>,
    category: Option<String>,
    description: Option<String>,
}

/// Clip lengths the video endpoints accept.
fn clip_duration(duration_secs: u32) -> &'static str {
    if duration_secs <= 5 {
        "5"
    } else {
        "10"
    }
}

fn category_capability(category: &str) -> Option<ModelCapability> {
    match category {
        "text-to-image" | "image-to-image" => Some(ModelCapability::Image),
        "text-to-video" | "image-to-video" | "video-to-video" => Some(ModelCapability::Video),
        _ => None,
    }
}

impl FalClient {
    pub fn new(config: FalConfig) -> AdapterResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AdapterError::provider(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> AdapterResult<Self> {
        Self::new(FalConfig::from_env())
    }

    fn run_request(&self, model_id: &str) -> AdapterResult<reqwest::RequestBuilder> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| AdapterError::not_configured("FAL_KEY is not set"))?;
        Ok(self
            .http
            .post(format!("{}/{}", self.config.base_url, model_id))
            .header("Authorization", format!("Key {}", key)))
    }
}

#[async_trait]
impl ImageGenerator for FalClient {
    async fn generate_image(
        &self,
        model_id: &str,
        request: &ImageRequest,
    ) -> AdapterResult<GeneratedImage> {
        let body = ImageInput {
            prompt: &request.prompt,
            negative_prompt: request.negative_prompt.as_deref(),
            image_size: IMAGE_SIZE,
            num_images: 1,
        };
        debug!(model = model_id, "Requesting image from fal");
        let output: ImageOutput =
            send_json(PROVIDER, "generate_image", self.run_request(model_id)?.json(&body)).await?;

        let url = output
            .images
            .into_iter()
            .next()
            .map(|f| f.url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AdapterError::invalid_response("fal returned no images"))?;
        info!(model = model_id, "Generated image");
        Ok(GeneratedImage { url })
    }
}

#[async_trait]
impl VideoGenerator for FalClient {
    async fn generate_video(
        &self,
        model_id: &str,
        request: &VideoRequest,
    ) -> AdapterResult<GeneratedVideo> {
        let body = VideoInput {
            prompt: &request.prompt,
            image_url: &request.image_url,
            duration: clip_duration(request.duration_secs),
        };
        debug!(model = model_id, duration = body.duration, "Requesting video from fal");
        let output: VideoOutput =
            send_json(PROVIDER, "generate_video", self.run_request(model_id)?.json(&body)).await?;

        let url = output
            .video
            .map(|f| f.url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AdapterError::invalid_response("fal returned no video"))?;
        info!(model = model_id, "Generated video");
        Ok(GeneratedVideo { url })
    }
}

#[async_trait]
impl ModelCatalog for FalClient {
    fn provider(&self) -> ModelProvider {
        ModelProvider::Fal
    }

    /// Image and video models only; other categories are skipped.
    async fn list_models(&self) -> AdapterResult<Vec<ModelInfo>> {
        let mut request = self.http.get(&self.config.catalog_url);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Key {}", key));
        }
        let response: CatalogResponse = send_json(PROVIDER, "list_models", request).await?;

        Ok(response
            .models
            .into_iter()
            .filter_map(|m| {
                let capability = m
                    .metadata
                    .category
                    .as_deref()
                    .and_then(category_capability)?;
                Some(ModelInfo {
                    name: m
                        .metadata
                        .display_name
                        .unwrap_or_else(|| m.endpoint_id.clone()),
                    id: m.endpoint_id,
                    provider: ModelProvider::Fal,
                    capabilities: vec![capability],
                    description: m.metadata.description,
                    context_length: None,
                })
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

    fn client_for(server: &MockServer) -> FalClient {
        FalClient::new(FalConfig {
            api_key: Some("fal-test".into()),
            base_url: server.uri(),
            catalog_url: format!("{}/v1/models", server.uri()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_clip_duration() {
        assert_eq!(clip_duration(1), "5");
        assert_eq!(clip_duration(5), "5");
        assert_eq!(clip_duration(6), "10");
        assert_eq!(clip_duration(30), "10");
    }

    #[tokio::test]
    async fn test_generate_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fal-ai/flux/schnell"))
            .and(header("authorization", "Key fal-test"))
            .and(body_partial_json(json!({
                "prompt": "lantern-lit stall",
                "negative_prompt": "blurry",
                "num_images": 1
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "images": [{ "url": "https://cdn.fal.media/a.png", "width": 576, "height": 1024 }],
                "seed": 42
            })))
            .expect(1)
            .mount(&server)
            .await;

        let image = client_for(&server)
            .generate_image(
                "fal-ai/flux/schnell",
                &ImageRequest {
                    prompt: "lantern-lit stall".into(),
                    negative_prompt: Some("blurry".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(image.url, "https://cdn.fal.media/a.png");
    }

    #[tokio::test]
    async fn test_empty_image_list_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "images": [] })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate_image(
                "fal-ai/flux/schnell",
                &ImageRequest {
                    prompt: "p".into(),
                    negative_prompt: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn test_generate_video_sends_source_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fal-ai/kling-video/v2.1/standard/image-to-video"))
            .and(body_partial_json(json!({
                "image_url": "https://cdn.fal.media/a.png",
                "duration": "10"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "video": { "url": "https://cdn.fal.media/a.mp4" }
            })))
            .mount(&server)
            .await;

        let video = client_for(&server)
            .generate_video(
                "fal-ai/kling-video/v2.1/standard/image-to-video",
                &VideoRequest {
                    image_url: "https://cdn.fal.media/a.png".into(),
                    prompt: "slow push in".into(),
                    duration_secs: 8,
                },
            )
            .await
            .unwrap();
        assert_eq!(video.url, "https://cdn.fal.media/a.mp4");
    }

    #[tokio::test]
    async fn test_content_policy_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string(r#"{"detail":"content policy"}"#),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate_image(
                "fal-ai/flux/schnell",
                &ImageRequest {
                    prompt: "p".into(),
                    negative_prompt: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Rejected);
    }

    #[tokio::test]
    async fn test_catalog_keeps_media_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    { "endpoint_id": "fal-ai/flux/schnell", "metadata": { "display_name": "FLUX.1 [schnell]", "category": "text-to-image" } },
                    { "endpoint_id": "fal-ai/kling-video/v2.1/standard/image-to-video", "metadata": { "category": "image-to-video" } },
                    { "endpoint_id": "fal-ai/whisper", "metadata": { "category": "speech-to-text" } }
                ]
            })))
            .mount(&server)
            .await;

        let models = client_for(&server).list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "FLUX.1 [schnell]");
        assert!(models[0].supports(ModelCapability::Image));
        assert!(models[1].supports(ModelCapability::Video));
    }
}
