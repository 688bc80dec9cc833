// src/mcp/server.rs
use crate::errors::FalImageError;
use crate::mcp::McpTool;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

enum Incoming {
    Reply(Option<Value>),
    Call { id: Value, params: Value },
}

/// Newline-delimited JSON-RPC over a reader/writer pair.
pub struct McpServer {
    name: String,
    version: String,
    tools: Vec<Box<dyn McpTool>>,
}

impl McpServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: impl McpTool + 'static) -> Self {
        self.tools.push(Box::new(tool));
        self
    }

    /// Reads requests until the input closes, then waits for in-flight tool
    /// calls to reply. Tool calls run on their own tasks so a slow
    /// generation does not hold up `ping` or `tools/list`; their replies may
    /// arrive out of order and are matched by id.
    pub async fn serve<R, W>(self: Arc<Self>, mut reader: R, mut writer: W) -> Result<(), FalImageError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Value>();
        let mut reply_tx = Some(reply_tx);
        let mut buf = Vec::new();

        loop {
            tokio::select! {
                read = reader.read_until(b'\n', &mut buf), if reply_tx.is_some() => {
                    if read? == 0 {
                        info!("Input closed, waiting for in-flight calls");
                        reply_tx = None;
                        continue;
                    }
                    let line = std::mem::take(&mut buf);
                    let Some(tx) = reply_tx.as_ref() else { continue };

                    let incoming = match String::from_utf8(line) {
                        Ok(line) if line.trim().is_empty() => continue,
                        Ok(line) => self.route(&line),
                        Err(e) => {
                            warn!("Message is not valid UTF-8: {}", e);
                            Incoming::Reply(to_value(RpcResponse::err(
                                Value::Null,
                                PARSE_ERROR,
                                "Message is not valid UTF-8",
                            )))
                        }
                    };

                    match incoming {
                        Incoming::Reply(Some(reply)) => write_reply(&mut writer, &reply).await?,
                        Incoming::Reply(None) => {}
                        Incoming::Call { id, params } => {
                            let server = Arc::clone(&self);
                            let tx = tx.clone();
                            tokio::spawn(async move {
                                if let Some(reply) = to_value(server.call_tool(id, params).await) {
                                    let _ = tx.send(reply);
                                }
                            });
                        }
                    }
                }
                Some(reply) = reply_rx.recv() => write_reply(&mut writer, &reply).await?,
                else => break,
            }
        }
        info!("Shutting down");
        Ok(())
    }

    /// Handles one message to completion. Notifications get no reply.
    pub async fn handle_message(&self, line: &str) -> Option<Value> {
        match self.route(line) {
            Incoming::Reply(reply) => reply,
            Incoming::Call { id, params } => to_value(self.call_tool(id, params).await),
        }
    }

    fn route(&self, line: &str) -> Incoming {
        let message: Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unparseable message: {}", e);
                return Incoming::Reply(to_value(RpcResponse::err(
                    Value::Null,
                    PARSE_ERROR,
                    e.to_string(),
                )));
            }
        };

        let request = if message.is_object() {
            RpcRequest::deserialize(&message).map_err(|e| e.to_string())
        } else {
            Err("expected an object".to_string())
        };
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                warn!("Not a request: {}", e);
                let id = message.get("id").cloned().unwrap_or(Value::Null);
                return Incoming::Reply(to_value(RpcResponse::err(
                    id,
                    INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                )));
            }
        };

        debug!("<- {}", request.method);
        let Some(id) = request.id else {
            return Incoming::Reply(None);
        };

        let response = match request.method.as_str() {
            "initialize" => RpcResponse::ok(id, self.initialize(&request.params)),
            "ping" => RpcResponse::ok(id, json!({})),
            "tools/list" => RpcResponse::ok(id, self.list_tools()),
            "tools/call" => {
                return Incoming::Call {
                    id,
                    params: request.params,
                };
            }
            other => RpcResponse::err(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
        };
        Incoming::Reply(to_value(response))
    }

    fn initialize(&self, params: &Value) -> Value {
        let version = params["protocolVersion"]
            .as_str()
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);
        json!({
            "protocolVersion": version,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": self.name, "version": self.version }
        })
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema(),
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, id: Value, params: Value) -> RpcResponse {
        let Some(name) = params["name"].as_str() else {
            return RpcResponse::err(id, INVALID_PARAMS, "Missing tool name");
        };
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            return RpcResponse::err(id, INVALID_PARAMS, format!("Unknown tool: {}", name));
        };

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let result = match tool.execute(arguments).await {
            Ok(output) => json!({
                "content": [{ "type": "text", "text": output.text }],
                "structuredContent": output.structured,
                "isError": false,
            }),
            Err(err) => json!({
                "content": [{ "type": "text", "text": err.caller_text() }],
                "isError": true,
            }),
        };
        RpcResponse::ok(id, result)
    }
}

fn to_value(response: RpcResponse) -> Option<Value> {
    serde_json::to_value(response).ok()
}

async fn write_reply<W>(writer: &mut W, reply: &Value) -> Result<(), FalImageError>
where
    W: AsyncWrite + Unpin,
{
    let mut out = serde_json::to_string(reply)?;
    out.push('\n');
    writer.write_all(out.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
