//! Remote tool-server lifecycle.
//!
//! Grounded on `astrbot.core.provider.func_tool_manager.MCPClient` /
//! `FuncCall._init_mcp_clients`: a single control task owns every remote
//! client so connect/list-tools/teardown always happens on the task that
//! acquired the connection, never a different one. External callers never
//! touch a client directly — they post commands to this task's mailbox.

use crate::error::ToolError;
use crate::llm::{Tool, ToolCall};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

/// Transport selection: presence of a `url` field means SSE, its absence
/// means a stdio subprocess — matches `"url" in cfg` in the original.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemoteTransport {
    Sse { url: String },
    Stdio { command: String, #[serde(default)] args: Vec<String> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteServerConfig {
    #[serde(flatten)]
    pub transport: RemoteTransport,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A tool backed by a remote server, addressed for invocation as
/// `mcp:<server>:<tool>`. Only the final `:`-segment is sent over the wire.
#[derive(Debug, Clone)]
pub struct RemoteToolHandle {
    pub server_name: String,
    pub remote_tool_name: String,
}

impl RemoteToolHandle {
    pub fn qualified_name(&self) -> String {
        format!("mcp:{}:{}", self.server_name, self.remote_tool_name)
    }
}

/// Strip a qualified remote tool name down to the bare remote tool name the
/// server itself expects.
pub fn unqualify(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Stand-in for the actual client transport: connecting and invoking a
/// real MCP-style server is an external collaborator (spec §1). This trait
/// is what a concrete stdio/SSE client implements; tests use an in-memory
/// fake.
#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<Tool>, ToolError>;
    async fn call_tool(&self, call: &ToolCall) -> Result<String, ToolError>;
    async fn close(&self) -> Result<(), ToolError>;
}

pub type ClientFactory = Box<dyn Fn(&RemoteServerConfig) -> Box<dyn RemoteClient> + Send + Sync>;

enum Command {
    InitAll { configs: HashMap<String, RemoteServerConfig> },
    Init { name: String, config: RemoteServerConfig },
    TerminateAll { reply: oneshot::Sender<()> },
    Terminate { name: String, reply: oneshot::Sender<()> },
    ListRegistered { reply: oneshot::Sender<Vec<(String, Tool)>> },
    CallTool { server_name: String, call: ToolCall, reply: oneshot::Sender<Result<String, ToolError>> },
}

/// Handle for posting lifecycle commands to the control task's mailbox.
#[derive(Clone)]
pub struct RemoteToolController {
    tx: mpsc::UnboundedSender<Command>,
}

impl RemoteToolController {
    pub fn spawn(factory: ClientFactory) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        tokio::spawn(async move {
            let mut clients: HashMap<String, Box<dyn RemoteClient>> = HashMap::new();
            let mut tools: HashMap<String, Vec<(String, Tool)>> = HashMap::new();

            while let Some(command) = rx.recv().await {
                match command {
                    Command::InitAll { configs } => {
                        for (name, config) in configs {
                            if !config.active {
                                continue;
                            }
                            init_one(&factory, &mut clients, &mut tools, name, config).await;
                        }
                    }
                    Command::Init { name, config } => {
                        init_one(&factory, &mut clients, &mut tools, name, config).await;
                    }
                    Command::Terminate { name, reply } => {
                        terminate_one(&mut clients, &mut tools, &name).await;
                        let _ = reply.send(());
                    }
                    Command::TerminateAll { reply } => {
                        let names: Vec<String> = clients.keys().cloned().collect();
                        for name in names {
                            terminate_one(&mut clients, &mut tools, &name).await;
                        }
                        let _ = reply.send(());
                    }
                    Command::ListRegistered { reply } => {
                        let all = tools.values().flatten().cloned().collect();
                        let _ = reply.send(all);
                    }
                    Command::CallTool { server_name, call, reply } => {
                        let outcome = match clients.get(&server_name) {
                            Some(client) => client.call_tool(&call).await,
                            None => Err(ToolError::RemoteUnavailable(server_name)),
                        };
                        let _ = reply.send(outcome);
                    }
                }
            }

            // Channel closed (controller dropped): tear down everything
            // rather than leaking subprocess/connection handles.
            let names: Vec<String> = clients.keys().cloned().collect();
            for name in names {
                terminate_one(&mut clients, &mut tools, &name).await;
            }
        });
        Self { tx }
    }

    pub fn init_all(&self, configs: HashMap<String, RemoteServerConfig>) {
        let _ = self.tx.send(Command::InitAll { configs });
    }

    pub fn init(&self, name: impl Into<String>, config: RemoteServerConfig) {
        let _ = self.tx.send(Command::Init { name: name.into(), config });
    }

    pub async fn terminate(&self, name: impl Into<String>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::Terminate { name: name.into(), reply: reply_tx }).is_ok() {
            let _ = reply_rx.await;
        }
    }

    pub async fn terminate_all(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::TerminateAll { reply: reply_tx }).is_ok() {
            let _ = reply_rx.await;
        }
    }

    /// Invoke a tool on the named server. Needs the server name separately
    /// from the already-unqualified tool name the caller passes in `call`.
    pub async fn call_tool(&self, server_name: &str, call: &ToolCall) -> Result<String, ToolError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::CallTool { server_name: server_name.to_string(), call: call.clone(), reply: reply_tx })
            .map_err(|_| ToolError::RemoteUnavailable(server_name.to_string()))?;
        reply_rx.await.map_err(|_| ToolError::RemoteUnavailable(server_name.to_string()))?
    }

    pub async fn list_registered(&self) -> Vec<(String, Tool)> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::ListRegistered { reply: reply_tx }).is_ok() {
            reply_rx.await.unwrap_or_default()
        } else {
            Vec::new()
        }
    }
}

async fn init_one(
    factory: &ClientFactory,
    clients: &mut HashMap<String, Box<dyn RemoteClient>>,
    tools: &mut HashMap<String, Vec<(String, Tool)>>,
    name: String,
    config: RemoteServerConfig,
) {
    // Purge any prior registration for this server name before re-registering.
    terminate_one(clients, tools, &name).await;

    let client = factory(&config);
    match client.list_tools().await {
        Ok(listed) => {
            tools.insert(name.clone(), listed.into_iter().map(|t| (name.clone(), t)).collect());
            clients.insert(name, client);
        }
        Err(err) => {
            log::warn!("remote tool server {name} failed to list tools: {err}");
        }
    }
}

async fn terminate_one(
    clients: &mut HashMap<String, Box<dyn RemoteClient>>,
    tools: &mut HashMap<String, Vec<(String, Tool)>>,
    name: &str,
) {
    tools.remove(name);
    if let Some(client) = clients.remove(name) {
        if let Err(err) = client.close().await {
            log::warn!("error tearing down remote tool server {name}: {err}");
        }
    }
}
