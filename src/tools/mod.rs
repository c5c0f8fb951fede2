//! Local (in-process) tool implementations.
//!
//! A [`ToolProvider`] is this crate's trait for *locally*-implemented
//! function tools, as opposed to tools proxied through a remote tool server
//! (see [`crate::tools::remote`]). [`crate::tools::manager::FunctionToolManager`]
//! holds both kinds behind the uniform [`crate::llm::Tool`] catalog shape.

pub mod bash;
pub mod manager;
pub mod remote;

pub use bash::BashTool;
pub use manager::FunctionToolManager;

use crate::llm::ToolCall;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future alias used to keep [`ToolProvider`] object-safe despite
/// `async fn` not being directly usable in a trait object.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A locally-implemented function tool.
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &str;
    fn brief(&self) -> &str;
    fn full_description(&self) -> String {
        self.brief().to_string()
    }
    fn parameters(&self) -> serde_json::Value;
    fn execute<'a>(&'a self, call: &'a ToolCall) -> BoxFuture<'a, Result<String, String>>;
}

/// All local tools available to a freshly started manager.
pub fn all_tools() -> Vec<Arc<dyn ToolProvider>> {
    vec![Arc::new(BashTool::new())]
}
