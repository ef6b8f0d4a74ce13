//! Per-endpoint AI backend adapter (C5). Speaks either the native chat
//! protocol (`/api/chat`, `/api/tags`, `/api/version`) or an
//! OpenAI-compatible one (`/v1/chat/completions`, `/v1/models`), detected
//! once per base URL and cached for the adapter's lifetime.

use super::{
    build_folder_advice_prompt, build_system_prompt, build_user_message, parse_reply, Classifier, ClassifyRequest,
    ClassifyResponse, FolderAdviceRequest, FolderAdviceResponse,
};
use crate::categories::Categories;
use crate::config::EndpointSpec;
use crate::models::folder_action::FolderAction;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell, Semaphore};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a file classification assistant. Given a file's name, path, MIME \
type, optional rule hint, metadata, and a content sample, choose the single best category from the provided \
catalog. Respond with `Answer: <category path>` on its own line. You may add `Thought:` or `Reasoning:` lines \
before it, but the category must appear on an `Answer:` line and nowhere else.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Native,
    OpenAiCompatible,
}

pub struct AiAdapter {
    base_url: String,
    model: String,
    client: Client,
    categories: Arc<Categories>,
    api_key: Option<String>,
    semaphore: Semaphore,
    last_request: Mutex<Instant>,
    throttle: Duration,
    timeout: Duration,
    retries: u32,
    backoff: f64,
    protocol: OnceCell<Protocol>,
    display_name: String,
}

impl AiAdapter {
    pub fn new(
        endpoint: EndpointSpec,
        categories: Arc<Categories>,
        api_key: Option<String>,
        timeout: Duration,
        retries: u32,
        backoff: f64,
        throttle: Duration,
    ) -> Self {
        let client = Client::builder().timeout(timeout * (retries.max(1) + 1)).build().unwrap_or_default();
        let display_name = format!("{}::{}", endpoint.base_url, endpoint.model);
        Self {
            base_url: endpoint.base_url,
            model: endpoint.model,
            client,
            categories,
            api_key,
            semaphore: Semaphore::new(endpoint.workers.max(1)),
            last_request: Mutex::new(Instant::now() - Duration::from_secs(3600)),
            throttle,
            timeout,
            retries,
            backoff,
            protocol: OnceCell::new(),
            display_name,
        }
    }

    /// Serializes the "last request" read-modify-write behind one async
    /// mutex so concurrent callers on this adapter never burst past the
    /// configured minimum inter-request spacing.
    async fn wait_for_throttle(&self) {
        if self.throttle.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        let wait = self.throttle.saturating_sub(elapsed);
        *last = Instant::now() + wait;
        drop(last);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    async fn detect_protocol(&self) -> Protocol {
        *self
            .protocol
            .get_or_init(|| async {
                let prefer_openai = self.base_url.contains("/v1");
                if prefer_openai {
                    if self.probe_openai().await {
                        return Protocol::OpenAiCompatible;
                    }
                    if self.probe_native().await {
                        return Protocol::Native;
                    }
                } else {
                    if self.probe_native().await {
                        return Protocol::Native;
                    }
                    if self.probe_openai().await {
                        return Protocol::OpenAiCompatible;
                    }
                }
                Protocol::Native
            })
            .await
    }

    async fn probe_native(&self) -> bool {
        self.client.get(format!("{}/api/tags", self.base_url)).send().await.map(|r| r.status().is_success()).unwrap_or(false)
            && self.client.get(format!("{}/api/version", self.base_url)).send().await.map(|r| r.status().is_success()).unwrap_or(false)
    }

    async fn probe_openai(&self) -> bool {
        self.authed_get(format!("{}/v1/models", self.base_url)).await.map(|r| r.status().is_success()).unwrap_or(false)
    }

    fn authed_get(&self, url: String) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        req
    }

    async fn lists_model(&self) -> bool {
        match self.detect_protocol().await {
            Protocol::Native => {
                let Ok(resp) = self.client.get(format!("{}/api/tags", self.base_url)).send().await else {
                    return false;
                };
                let Ok(tags) = resp.json::<NativeTagsResponse>().await else {
                    return false;
                };
                tags.models.iter().any(|m| m.name == self.model || m.name.starts_with(&format!("{}:", self.model)))
            }
            Protocol::OpenAiCompatible => {
                let Ok(resp) = self.authed_get(format!("{}/v1/models", self.base_url)).send().await else {
                    return false;
                };
                let Ok(models) = resp.json::<OpenAiModelsResponse>().await else {
                    return false;
                };
                models.data.iter().any(|m| m.id == self.model)
            }
        }
    }

    async fn call_chat(&self, system: &str, user: &str) -> Result<String, String> {
        self.wait_for_throttle().await;
        let _permit = self.semaphore.acquire().await.map_err(|e| e.to_string())?;

        let mut last_error = String::new();
        for attempt in 0..=self.retries {
            if attempt > 0 {
                let backoff = Duration::from_secs_f64(self.backoff.powi(attempt as i32));
                tokio::time::sleep(backoff.max(self.throttle)).await;
            }
            let attempt_timeout = self.timeout * (attempt + 1);
            match self.send_once(system, user, attempt_timeout).await {
                Ok(content) => return Ok(content),
                Err(err) => last_error = err,
            }
        }
        Err(last_error)
    }

    async fn send_once(&self, system: &str, user: &str, timeout: Duration) -> Result<String, String> {
        match self.detect_protocol().await {
            Protocol::Native => {
                let body = NativeChatRequest {
                    model: self.model.clone(),
                    messages: vec![
                        NativeMessage { role: "system".to_string(), content: system.to_string() },
                        NativeMessage { role: "user".to_string(), content: user.to_string() },
                    ],
                    stream: false,
                };
                let resp = self
                    .client
                    .post(format!("{}/api/chat", self.base_url))
                    .timeout(timeout)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                if !resp.status().is_success() {
                    return Err(format!("native backend status {}", resp.status()));
                }
                let parsed: NativeChatResponse = resp.json().await.map_err(|e| e.to_string())?;
                Ok(parsed.message.content)
            }
            Protocol::OpenAiCompatible => {
                let body = OpenAiChatRequest {
                    model: self.model.clone(),
                    messages: vec![
                        OpenAiMessage { role: "system".to_string(), content: system.to_string() },
                        OpenAiMessage { role: "user".to_string(), content: user.to_string() },
                    ],
                };
                let mut req = self.client.post(format!("{}/v1/chat/completions", self.base_url)).timeout(timeout).json(&body);
                if let Some(key) = &self.api_key {
                    req = req.header("Authorization", format!("Bearer {key}"));
                }
                let resp = req.send().await.map_err(|e| e.to_string())?;
                if !resp.status().is_success() {
                    return Err(format!("openai-compatible backend status {}", resp.status()));
                }
                let parsed: OpenAiChatResponse = resp.json().await.map_err(|e| e.to_string())?;
                let content = parsed.choices.into_iter().next().map(|c| c.message.content).ok_or("empty choices")?;
                Ok(content)
            }
        }
    }
}

#[async_trait]
impl Classifier for AiAdapter {
    async fn classify(&self, request: ClassifyRequest) -> ClassifyResponse {
        let system = build_system_prompt(DEFAULT_SYSTEM_PROMPT, self.categories.compact_json());
        let user = build_user_message(&request);

        match self.call_chat(&system, &user).await {
            Ok(content) => {
                let (answer, _notes) = parse_reply(&content);
                match answer {
                    Some(text) => ClassifyResponse { category: self.categories.normalize_result(&text), worker: self.display_name.clone(), error: None },
                    None => ClassifyResponse::unknown(self.display_name.clone(), "reply had no Answer: line"),
                }
            }
            Err(err) => ClassifyResponse::unknown(self.display_name.clone(), err),
        }
    }

    async fn advise_folder_action(&self, request: FolderAdviceRequest) -> FolderAdviceResponse {
        if request.total_files == 0 {
            return FolderAdviceResponse {
                action: request.rule_hint.unwrap_or(FolderAction::Keep),
                worker: self.display_name.clone(),
                error: None,
            };
        }

        let system = build_system_prompt(DEFAULT_SYSTEM_PROMPT, self.categories.compact_json());
        let user = build_folder_advice_prompt(&request);
        let fallback = request.rule_hint.unwrap_or(FolderAction::Disaggregate);

        match self.call_chat(&system, &user).await {
            Ok(content) => {
                let action = content
                    .lines()
                    .filter_map(|line| line.trim().parse::<FolderAction>().ok())
                    .next()
                    .unwrap_or(fallback);
                FolderAdviceResponse { action, worker: self.display_name.clone(), error: None }
            }
            Err(err) => FolderAdviceResponse { action: fallback, worker: self.display_name.clone(), error: Some(err) },
        }
    }

    async fn close(&self) -> Result<(), String> {
        Ok(())
    }

    async fn ensure_available(&self) -> bool {
        if !self.lists_model().await {
            return false;
        }
        matches!(self.call_chat("Reply with strictly the word ok.", "ok?").await, Ok(content) if !content.trim().is_empty())
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn is_ai(&self) -> bool {
        true
    }
}

#[derive(Serialize)]
struct NativeChatRequest {
    model: String,
    messages: Vec<NativeMessage>,
    stream: bool,
}

#[derive(Serialize)]
struct NativeMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct NativeChatResponse {
    message: NativeReplyMessage,
}

#[derive(Deserialize)]
struct NativeReplyMessage {
    content: String,
}

#[derive(Deserialize)]
struct NativeTagsResponse {
    #[serde(default)]
    models: Vec<NativeTagEntry>,
}

#[derive(Deserialize)]
struct NativeTagEntry {
    name: String,
}

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiReplyMessage,
}

#[derive(Deserialize)]
struct OpenAiReplyMessage {
    content: String,
}

#[derive(Deserialize)]
struct OpenAiModelsResponse {
    #[serde(default)]
    data: Vec<OpenAiModelEntry>,
}

#[derive(Deserialize)]
struct OpenAiModelEntry {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_adapter() -> AiAdapter {
        let categories = Arc::new(Categories::from_source("Media/Music\n__default__,").unwrap());
        AiAdapter::new(
            EndpointSpec { base_url: "http://127.0.0.1:1".to_string(), workers: 1, model: "llama3.1".to_string() },
            categories,
            None,
            Duration::from_millis(50),
            0,
            1.5,
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn classify_degrades_to_unknown_when_backend_unreachable() {
        let adapter = test_adapter();
        let response = adapter
            .classify(ClassifyRequest {
                name: "a.txt".to_string(),
                rel_path: "/a.txt".to_string(),
                mime: "text/plain".to_string(),
                sample: None,
                hint: None,
                metadata: crate::metadata::FileMetadata::new(),
            })
            .await;
        assert!(response.error.is_some());
        assert_eq!(response.category.to_string(), "Unknown");
    }

    #[tokio::test]
    async fn empty_folder_short_circuits_without_a_network_call() {
        let adapter = test_adapter();
        let response = adapter
            .advise_folder_action(FolderAdviceRequest {
                folder_path: "/empty".to_string(),
                total_files: 0,
                sample_entries: vec![],
                rule_hint: Some(FolderAction::Keep),
            })
            .await;
        assert_eq!(response.action, FolderAction::Keep);
        assert!(response.error.is_none());
    }
}
