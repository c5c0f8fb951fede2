//! Provider abstraction: the uniform contract the LLM-request stage drives,
//! plus the generic retry/degrade machinery that wraps any vendor backend.
//!
//! Concrete vendor wire protocols are collaborators (spec §1) — this module
//! only specifies [`VendorBackend`], the minimal raw-call seam a concrete
//! provider implements, and [`RetryingProvider`], which adds key rotation,
//! context trimming and modality degradation uniformly on top of it.
//! Adapted from the single-vendor retry/backoff logic folded into
//! `OpenAIProvider::chat_loop` in the original provider module; split out
//! here because this crate must stay provider-agnostic.

use super::types::{LLMResponse, ProviderRequest, ResponseRole};
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::RwLock;

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<LLMResponse, ProviderError>> + Send>>;

/// Raw, unretried access to one vendor's completion endpoint.
#[async_trait::async_trait]
pub trait VendorBackend: Send + Sync {
    async fn raw_chat(&self, req: &ProviderRequest, api_key: &str) -> Result<LLMResponse, ProviderError>;
    async fn raw_chat_stream(&self, req: &ProviderRequest, api_key: &str) -> Result<ChatStream, ProviderError>;
    fn models(&self) -> Vec<String>;
}

/// The uniform contract the LLM-request stage calls.
#[async_trait::async_trait]
pub trait LLMProvider: Send + Sync {
    async fn text_chat(&self, req: &ProviderRequest) -> Result<LLMResponse, ProviderError>;
    async fn text_chat_stream(&self, req: &ProviderRequest) -> Result<ChatStream, ProviderError>;
    fn get_models(&self) -> Vec<String>;
    fn get_current_key(&self) -> Option<String>;
    fn set_key(&self, key: String);
}

const MAX_CONTEXT_TRIM_ATTEMPTS: usize = 20;

/// Wraps a [`VendorBackend`] with key rotation, context-window trimming and
/// modality degradation, per §4.5.
pub struct RetryingProvider<B: VendorBackend> {
    backend: B,
    keys: RwLock<VecDeque<String>>,
}

impl<B: VendorBackend> RetryingProvider<B> {
    pub fn new(backend: B, keys: Vec<String>) -> Self {
        Self { backend, keys: RwLock::new(keys.into()) }
    }

    fn current_key(&self) -> Option<String> {
        self.keys.read().unwrap().front().cloned()
    }

    /// Rotate the exhausted key to the back of the pool; `true` if another
    /// key remains to try.
    fn rotate_key(&self) -> bool {
        let mut keys = self.keys.write().unwrap();
        if keys.len() <= 1 {
            return false;
        }
        if let Some(front) = keys.pop_front() {
            keys.push_back(front);
        }
        true
    }

    fn pool_size(&self) -> usize {
        self.keys.read().unwrap().len()
    }

    /// Apply one retry adaptation to `req` in place, or signal the request
    /// is exhausted and should surface as a fatal error.
    fn adapt(&self, class: crate::error::ErrorClass, req: &mut ProviderRequest, context_trims: &mut usize) -> bool {
        use crate::error::ErrorClass::*;
        match class {
            RetryKey => self.rotate_key(),
            TrimHistory => {
                if *context_trims >= MAX_CONTEXT_TRIM_ATTEMPTS || req.contexts.is_empty() {
                    false
                } else {
                    req.contexts.remove(0);
                    *context_trims += 1;
                    true
                }
            }
            DropImages => {
                let had = !req.image_refs.is_empty();
                req.image_refs.clear();
                had
            }
            DropTools => {
                let had = req.tools.is_some();
                req.tools = None;
                had
            }
            DropSystemPrompt => {
                let had = req.system_prompt.is_some();
                req.system_prompt = None;
                had
            }
            Fatal => false,
        }
    }
}

#[async_trait::async_trait]
impl<B: VendorBackend> LLMProvider for RetryingProvider<B> {
    async fn text_chat(&self, req: &ProviderRequest) -> Result<LLMResponse, ProviderError> {
        if self.pool_size() == 0 {
            return Err(ProviderError::Config("no API keys configured".into()));
        }
        let mut attempt_req = req.clone();
        let mut context_trims = 0usize;
        let mut key_attempts = self.pool_size();

        loop {
            let key = self.current_key().ok_or(ProviderError::AuthenticationFailed)?;
            match self.backend.raw_chat(&attempt_req, &key).await {
                Ok(response) => return Ok(response),
                Err(ProviderError::Api(message)) => {
                    let class = crate::error::ErrorClass::classify(&message);
                    if class == crate::error::ErrorClass::RetryKey {
                        key_attempts = key_attempts.saturating_sub(1);
                        if key_attempts == 0 || !self.adapt(class, &mut attempt_req, &mut context_trims) {
                            return Ok(LLMResponse::error(format!("Request failed. type=RateLimitExceeded msg={message}")));
                        }
                        continue;
                    }
                    if self.adapt(class, &mut attempt_req, &mut context_trims) {
                        continue;
                    }
                    return Ok(LLMResponse::error(format!("Request failed. type=ProviderFatal msg={message}")));
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn text_chat_stream(&self, req: &ProviderRequest) -> Result<ChatStream, ProviderError> {
        // Streaming degrades the same way on the *first* attempt only: once
        // bytes start flowing we can't retroactively rewrite history, so a
        // mid-stream vendor error surfaces as a `role = err` final chunk
        // rather than being retried transparently.
        if self.pool_size() == 0 {
            return Err(ProviderError::Config("no API keys configured".into()));
        }
        let key = self.current_key().ok_or(ProviderError::AuthenticationFailed)?;
        self.backend.raw_chat_stream(req, &key).await
    }

    fn get_models(&self) -> Vec<String> {
        self.backend.models()
    }

    fn get_current_key(&self) -> Option<String> {
        self.current_key()
    }

    fn set_key(&self, key: String) {
        let mut keys = self.keys.write().unwrap();
        keys.clear();
        keys.push_back(key);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("tool calling not supported")]
    ToolCallingNotSupported,

    #[error("chat loop closed")]
    ChatLoopClosed,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LLMResponse {
    pub fn is_err_role(&self) -> bool {
        self.role == ResponseRole::Err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ProviderRequest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyBackend {
        fail_times: AtomicUsize,
        error: String,
    }

    #[async_trait::async_trait]
    impl VendorBackend for FlakyBackend {
        async fn raw_chat(&self, req: &ProviderRequest, _key: &str) -> Result<LLMResponse, ProviderError> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(ProviderError::Api(self.error.clone()));
            }
            Ok(LLMResponse::assistant_text(format!("ok:{}", req.contexts.len())))
        }
        async fn raw_chat_stream(&self, _req: &ProviderRequest, _key: &str) -> Result<ChatStream, ProviderError> {
            unimplemented!()
        }
        fn models(&self) -> Vec<String> {
            vec!["fake".into()]
        }
    }

    #[tokio::test]
    async fn rotates_key_on_rate_limit_then_succeeds() {
        let backend = FlakyBackend { fail_times: AtomicUsize::new(1), error: "429 rate limit".into() };
        let provider = RetryingProvider::new(backend, vec!["k1".into(), "k2".into()]);
        let req = ProviderRequest::new("hi", "s1");
        let response = provider.text_chat(&req).await.unwrap();
        assert_eq!(response.completion_text, "ok:0");
    }

    #[tokio::test]
    async fn trims_context_on_overflow_then_succeeds() {
        let backend = FlakyBackend { fail_times: AtomicUsize::new(1), error: "maximum context length exceeded".into() };
        let provider = RetryingProvider::new(backend, vec!["k1".into()]);
        let mut req = ProviderRequest::new("hi", "s1");
        req.contexts = vec![crate::conversation::HistoryEntry::user("old"), crate::conversation::HistoryEntry::user("new")];
        let response = provider.text_chat(&req).await.unwrap();
        assert_eq!(response.completion_text, "ok:1");
    }

    #[tokio::test]
    async fn exhausted_keys_surface_as_err_role_not_panic() {
        let backend = FlakyBackend { fail_times: AtomicUsize::new(10), error: "429 rate limit".into() };
        let provider = RetryingProvider::new(backend, vec!["k1".into()]);
        let req = ProviderRequest::new("hi", "s1");
        let response = provider.text_chat(&req).await.unwrap();
        assert!(response.is_err_role());
    }
}
