//! Message components and chains.
//!
//! A [`MessageChain`] is what a platform adapter sends and receives: an
//! ordered list of [`MessageComponent`] values plus an optional
//! render-as-image hint. Each variant knows its own emptiness so the reply
//! stage can drop chains that would render as nothing.

use serde::{Deserialize, Serialize};

/// One element of a message chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageComponent {
    Plain { text: String },
    Image { source: ImageSource },
    At { target_id: String, display_name: Option<String> },
    AtAll,
    Voice { source: String },
    Video { source: String },
    File { source: String, name: Option<String> },
    Reply { reply_to: String, quoted: Option<Box<MessageChain>> },
    Forward { nodes: Vec<MessageChain> },
    /// Escape hatch for adapter-specific content this core cannot interpret.
    /// Treated as non-empty unconditionally so adapters don't lose content.
    Opaque { platform: String, payload: serde_json::Value },
}

/// Source of an image component: a remote URL, a local filesystem path, or
/// inline base64-encoded bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum ImageSource {
    Url(String),
    Path(String),
    Base64(String),
}

impl MessageComponent {
    /// Per-variant non-empty predicate, consulted by the reply stage's
    /// emptiness check. Text requires non-blank content after trimming;
    /// file-like components require a non-empty source; containers are
    /// empty only if every child is empty.
    pub fn is_empty(&self) -> bool {
        match self {
            MessageComponent::Plain { text } => text.trim().is_empty(),
            MessageComponent::Image { source } => source_is_empty(source),
            MessageComponent::At { target_id, .. } => target_id.trim().is_empty(),
            MessageComponent::AtAll => false,
            MessageComponent::Voice { source } | MessageComponent::Video { source } => {
                source.trim().is_empty()
            }
            MessageComponent::File { source, .. } => source.trim().is_empty(),
            MessageComponent::Reply { reply_to, .. } => reply_to.trim().is_empty(),
            MessageComponent::Forward { nodes } => nodes.iter().all(MessageChain::is_empty),
            MessageComponent::Opaque { .. } => false,
        }
    }

    /// Whether this component is a leading decoration extracted ahead of
    /// segmented reply (at-mention or reply-quote).
    pub fn is_decoration(&self) -> bool {
        matches!(self, MessageComponent::At { .. } | MessageComponent::Reply { .. })
    }
}

fn source_is_empty(source: &ImageSource) -> bool {
    match source {
        ImageSource::Url(s) | ImageSource::Path(s) | ImageSource::Base64(s) => s.trim().is_empty(),
    }
}

/// An ordered sequence of components plus a render-as-image hint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageChain {
    pub components: Vec<MessageComponent>,
    pub render_as_image: bool,
}

impl MessageChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            components: vec![MessageComponent::Plain { text: text.into() }],
            render_as_image: false,
        }
    }

    pub fn push(mut self, component: MessageComponent) -> Self {
        self.components.push(component);
        self
    }

    /// A chain is empty when every component fails its non-empty predicate.
    /// An empty component list is, vacuously, empty.
    pub fn is_empty(&self) -> bool {
        self.components.iter().all(MessageComponent::is_empty)
    }

    /// Flattened plain-text projection, used to build the provider prompt
    /// and the log-outline preview. Non-text components are skipped.
    pub fn as_plain_text(&self) -> String {
        self.components
            .iter()
            .filter_map(|c| match c {
                MessageComponent::Plain { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Destructively remove and return the leading at-mention and
    /// reply-quote components, in the order encountered. Per the pinned
    /// design decision, extraction mutates `self.components` in place: the
    /// decorations are gone from the chain once this returns, visible to
    /// anyone still holding the chain.
    pub fn extract_decorations(&mut self) -> Vec<MessageComponent> {
        let mut decorations = Vec::new();
        self.components.retain(|c| {
            if c.is_decoration() {
                decorations.push(c.clone());
                false
            } else {
                true
            }
        });
        decorations
    }
}
