// src/mcp/mod.rs
// MCP (Model Context Protocol) tools exposed over stdio
use crate::errors::ClassifiedError;
use async_trait::async_trait;
use serde_json::Value;

pub mod server;
pub mod tools;

pub use server::McpServer;
pub use tools::{GenerateImageTool, ListModelsTool};

/// What a successful tool call hands back: text for the model, plus the
/// structured value.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub text: String,
    pub structured: Value,
}

#[async_trait]
pub trait McpTool: Send + Sync {
    async fn execute(&self, params: Value) -> Result<ToolOutput, ClassifiedError>;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
}
