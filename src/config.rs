//! Pipeline configuration.
//!
//! Config *loading* (file formats, hot reload) is out of scope (spec §1);
//! this struct is the shape the embedding application constructs and
//! injects at lifecycle initialization — the core never reaches for a
//! process-wide config singleton.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalMethod {
    /// Delay scales with `log_base.log(word_count)`.
    Log,
    /// Delay is drawn uniformly from `[interval.0, interval.1]`.
    Random,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentedReplyConfig {
    pub enable: bool,
    pub only_llm_result: bool,
    pub interval_method: IntervalMethod,
    pub log_base: f64,
    pub interval: (f64, f64),
}

impl Default for SegmentedReplyConfig {
    fn default() -> Self {
        Self { enable: false, only_llm_result: true, interval_method: IntervalMethod::Random, log_base: 2.0, interval: (0.5, 1.5) }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Prefixes that mark a message as directed at the bot at all (e.g. a
    /// platform-level "/" command prefix).
    #[serde(default)]
    pub wake_prefixes: Vec<String>,
    /// Prefix stripped specifically before handing the remainder to the
    /// LLM-request stage as its prompt.
    #[serde(default)]
    pub llm_wake_prefix: Option<String>,
    #[serde(default)]
    pub max_context_length: Option<usize>,
    #[serde(default)]
    pub dequeue_context_length: usize,
    #[serde(default)]
    pub streaming_response: bool,
    #[serde(default)]
    pub segmented_reply: SegmentedReplyConfig,
    #[serde(default = "default_true")]
    pub reply_with_mention: bool,
    #[serde(default)]
    pub reply_with_quote: bool,
    #[serde(default)]
    pub path_mapping_rules: Vec<String>,
    /// Message prefixes (e.g. `/reload`) that only a [`crate::event::SenderRole::Admin`]
    /// sender may invoke; checked by the permission stage.
    #[serde(default)]
    pub admin_only_prefixes: Vec<String>,
    #[serde(default = "default_queue_capacity")]
    pub event_queue_capacity: usize,
    #[serde(default = "default_provider_timeout", with = "duration_secs")]
    pub provider_call_timeout: Duration,
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    32
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(120)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            wake_prefixes: Vec::new(),
            llm_wake_prefix: None,
            max_context_length: None,
            dequeue_context_length: 0,
            streaming_response: false,
            segmented_reply: SegmentedReplyConfig::default(),
            reply_with_mention: true,
            reply_with_quote: false,
            path_mapping_rules: Vec::new(),
            admin_only_prefixes: Vec::new(),
            event_queue_capacity: default_queue_capacity(),
            provider_call_timeout: default_provider_timeout(),
        }
    }
}
