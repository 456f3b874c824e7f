//! MCP tool surface over the engine, using the official rust-mcp-sdk.
//!
//! The engine is passed in explicitly; this module only translates tool
//! arguments to engine calls and engine results to structured content.

#![allow(clippy::module_name_repetitions)]

use async_trait::async_trait;
use rust_mcp_sdk::{
    error::SdkResult,
    macros::{mcp_tool, JsonSchema},
    mcp_server::{server_runtime, ServerHandler},
    schema::{
        CallToolRequest, CallToolResult, Implementation, InitializeResult, ListToolsRequest,
        ListToolsResult, RpcError, ServerCapabilities, ServerCapabilitiesTools, TextContent,
        LATEST_PROTOCOL_VERSION,
    },
    McpServer, StdioTransport, TransportOptions,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{sync::Arc, time::Duration};

use rust_mcp_sdk::schema::mcp_2025_06_18::schema_utils::CallToolError;

use crate::codec::{self, PayloadEncoding};
use crate::engine::{Engine, SendRequest, WaitPolicy};
use crate::error::EngineError;

// ------------------ Tool Definitions ------------------

#[mcp_tool(
    name = "list_ports",
    description = "List serial ports available on this system"
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ListPortsTool {}

#[mcp_tool(
    name = "configure_connection",
    description = "Open or close the serial connection (action: open|close)"
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ConfigureConnectionTool {
    pub action: String,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub baudrate: Option<u32>,
}

#[mcp_tool(
    name = "send_data",
    description = "Send bytes to the device and wait for the response per the chosen wait policy \
                   (keyword | timeout | none | at_command)"
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct SendDataTool {
    pub payload: String,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub wait_policy: Option<String>,
    #[serde(default)]
    pub stop_pattern: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[mcp_tool(
    name = "read_async_messages",
    description = "Drain unsolicited messages the device emitted while no command was waiting"
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ReadAsyncMessagesTool {}

#[mcp_tool(
    name = "status",
    description = "Report connection state, routing mode and I/O counters"
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct StatusTool {}

// ------------------ Handler ------------------

pub struct BridgeServerHandler {
    pub engine: Arc<Engine>,
}

/// Render an engine failure as the `{error_message, error_code}` envelope.
fn tool_failure(err: &EngineError) -> CallToolError {
    CallToolError::from_message(
        json!({
            "error_message": err.to_string(),
            "error_code": err.code(),
        })
        .to_string(),
    )
}

impl BridgeServerHandler {
    fn list_ports_impl(&self) -> Result<CallToolResult, CallToolError> {
        use serialport::SerialPortType;
        let ports = serialport::available_ports()
            .map_err(|e| tool_failure(&EngineError::connection(e.to_string())))?;
        let listed: Vec<_> = ports
            .into_iter()
            .map(|p| {
                let (description, hardware_id) = match p.port_type {
                    SerialPortType::UsbPort(info) => {
                        let description = info
                            .product
                            .or(info.manufacturer)
                            .unwrap_or_else(|| "USB serial device".to_string());
                        let mut hardware_id =
                            format!("USB VID:PID={:04X}:{:04X}", info.vid, info.pid);
                        if let Some(sn) = info.serial_number {
                            hardware_id.push_str(&format!(" SER={sn}"));
                        }
                        (description, hardware_id)
                    }
                    SerialPortType::BluetoothPort => {
                        ("Bluetooth serial device".to_string(), "BLUETOOTH".to_string())
                    }
                    SerialPortType::PciPort => {
                        ("PCI serial device".to_string(), "PCI".to_string())
                    }
                    SerialPortType::Unknown => ("Serial device".to_string(), "n/a".to_string()),
                };
                json!({
                    "port": p.port_name,
                    "description": description,
                    "hardware_id": hardware_id,
                })
            })
            .collect();
        let count = listed.len();
        let mut structured = serde_json::Map::new();
        structured.insert("ports".into(), serde_json::Value::Array(listed));
        Ok(CallToolResult::text_content(vec![TextContent::from(format!(
            "{count} port(s) found"
        ))])
        .with_structured_content(structured))
    }

    fn configure_connection_impl(
        &self,
        tool: ConfigureConnectionTool,
    ) -> Result<CallToolResult, CallToolError> {
        match tool.action.to_ascii_lowercase().as_str() {
            "open" => {
                let port = tool.port.ok_or_else(|| {
                    tool_failure(&EngineError::invalid_input(
                        "action 'open' requires a port",
                    ))
                })?;
                let baudrate = tool
                    .baudrate
                    .unwrap_or(self.engine.config().serial.default_baud);
                self.engine
                    .connect(&port, baudrate)
                    .map_err(|e| tool_failure(&e))?;
                let mut structured = serde_json::Map::new();
                structured.insert(
                    "message".into(),
                    json!(format!("connected to {port}@{baudrate}")),
                );
                structured.insert("port".into(), json!(port));
                structured.insert("baudrate".into(), json!(baudrate));
                Ok(CallToolResult::text_content(vec![TextContent::from(format!(
                    "connected to {port}@{baudrate}"
                ))])
                .with_structured_content(structured))
            }
            "close" => {
                let was_open = self.engine.disconnect();
                let message = if was_open {
                    "connection closed"
                } else {
                    "connection already closed"
                };
                let mut structured = serde_json::Map::new();
                structured.insert("message".into(), json!(message));
                Ok(CallToolResult::text_content(vec![TextContent::from(
                    message.to_string(),
                )])
                .with_structured_content(structured))
            }
            other => Err(tool_failure(&EngineError::invalid_input(format!(
                "unsupported action '{other}', expected open or close"
            )))),
        }
    }

    fn send_data_impl(&self, tool: SendDataTool) -> Result<CallToolResult, CallToolError> {
        let encoding: PayloadEncoding = tool
            .encoding
            .as_deref()
            .unwrap_or("utf8")
            .parse()
            .map_err(|e: EngineError| tool_failure(&e))?;
        let policy: WaitPolicy = tool
            .wait_policy
            .as_deref()
            .unwrap_or("none")
            .parse()
            .map_err(|e: EngineError| tool_failure(&e))?;

        let payload =
            codec::encode_payload(&tool.payload, encoding).map_err(|e| tool_failure(&e))?;
        // The stop pattern goes through the same encoding as the payload,
        // so hex exchanges can stop on a byte sequence.
        let stop_pattern = match &tool.stop_pattern {
            Some(p) => Some(codec::encode_payload(p, encoding).map_err(|e| tool_failure(&e))?),
            None => None,
        };
        let timeout = Duration::from_millis(
            tool.timeout_ms
                .unwrap_or(self.engine.config().engine.default_send_timeout_ms),
        );

        let outcome = self
            .engine
            .send(SendRequest {
                payload,
                policy,
                stop_pattern,
                timeout,
            })
            .map_err(|e| tool_failure(&e))?;

        let mut structured = serde_json::Map::new();
        structured.insert("data".into(), json!(outcome.data));
        structured.insert("raw_data".into(), json!(codec::format_hex(&outcome.raw)));
        structured.insert("is_hex".into(), json!(outcome.is_hex));
        if let Some(found) = outcome.found_stop_pattern {
            structured.insert("found_stop_pattern".into(), json!(found));
        }
        if let Some(matched) = &outcome.matched_stop_pattern {
            structured.insert("matched_stop_pattern".into(), json!(matched));
        }
        structured.insert("bytes_received".into(), json!(outcome.bytes_received));
        if outcome.truncated {
            structured.insert("truncated".into(), json!(true));
        }
        structured.insert(
            "pending_async_count".into(),
            json!(outcome.pending_async_count),
        );
        Ok(CallToolResult::text_content(vec![TextContent::from(format!(
            "received {} byte(s)",
            outcome.bytes_received
        ))])
        .with_structured_content(structured))
    }

    fn read_async_messages_impl(&self) -> Result<CallToolResult, CallToolError> {
        let (packets, dropped) = self.engine.drain_async();
        let count = packets.len();
        let data: Vec<_> = packets
            .into_iter()
            .map(|p| {
                json!({
                    "data": p.text,
                    "raw_data": codec::format_hex(&p.raw),
                    "is_hex": p.is_hex,
                    "timestamp": p.received_at.to_rfc3339(),
                })
            })
            .collect();
        let mut structured = serde_json::Map::new();
        structured.insert("data".into(), serde_json::Value::Array(data));
        structured.insert("count".into(), json!(count));
        if dropped > 0 {
            structured.insert("dropped".into(), json!(dropped));
        }
        Ok(CallToolResult::text_content(vec![TextContent::from(format!(
            "{count} async message(s)"
        ))])
        .with_structured_content(structured))
    }

    fn status_impl(&self) -> Result<CallToolResult, CallToolError> {
        let status = self.engine.status();
        let mut structured = serde_json::Map::new();
        structured.insert("connected".into(), json!(status.connected));
        if let Some(port) = &status.port {
            structured.insert("port".into(), json!(port));
        }
        if let Some(baudrate) = status.baudrate {
            structured.insert("baudrate".into(), json!(baudrate));
        }
        structured.insert("sync_mode".into(), json!(status.sync_mode));
        structured.insert(
            "pending_async_count".into(),
            json!(status.pending_async_count),
        );
        structured.insert("bytes_sent".into(), json!(status.bytes_sent));
        structured.insert("bytes_received".into(), json!(status.bytes_received));
        structured.insert("packets_published".into(), json!(status.packets_published));
        structured.insert("packets_dropped".into(), json!(status.packets_dropped));
        structured.insert("reader_faults".into(), json!(status.reader_faults));
        if let Some(fault) = &status.fault {
            structured.insert("fault".into(), json!(fault));
        }
        Ok(
            CallToolResult::text_content(vec![TextContent::from("status".to_string())])
                .with_structured_content(structured),
        )
    }
}

#[async_trait]
impl ServerHandler for BridgeServerHandler {
    async fn handle_list_tools_request(
        &self,
        _req: ListToolsRequest,
        _rt: &dyn McpServer,
    ) -> Result<ListToolsResult, RpcError> {
        Ok(ListToolsResult {
            tools: vec![
                ListPortsTool::tool(),
                ConfigureConnectionTool::tool(),
                SendDataTool::tool(),
                ReadAsyncMessagesTool::tool(),
                StatusTool::tool(),
            ],
            meta: None,
            next_cursor: None,
        })
    }

    async fn handle_call_tool_request(
        &self,
        req: CallToolRequest,
        _rt: &dyn McpServer,
    ) -> Result<CallToolResult, CallToolError> {
        match req.tool_name() {
            n if n == ListPortsTool::tool_name() => self.list_ports_impl(),
            n if n == ConfigureConnectionTool::tool_name() => {
                let args = req.params.arguments.clone().unwrap_or_default();
                let action = args
                    .get("action")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        CallToolError::invalid_arguments(
                            ConfigureConnectionTool::tool_name(),
                            Some("action missing".into()),
                        )
                    })?
                    .to_string();
                let port = args
                    .get("port")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                let baudrate = args
                    .get("baudrate")
                    .and_then(|v| v.as_u64())
                    .map(|b| b as u32);
                self.configure_connection_impl(ConfigureConnectionTool {
                    action,
                    port,
                    baudrate,
                })
            }
            n if n == SendDataTool::tool_name() => {
                let args = req.params.arguments.clone().unwrap_or_default();
                let payload = args
                    .get("payload")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        CallToolError::invalid_arguments(
                            SendDataTool::tool_name(),
                            Some("payload missing".into()),
                        )
                    })?
                    .to_string();
                let encoding = args
                    .get("encoding")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                let wait_policy = args
                    .get("wait_policy")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                let stop_pattern = args
                    .get("stop_pattern")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                let timeout_ms = args.get("timeout_ms").and_then(|v| v.as_u64());
                self.send_data_impl(SendDataTool {
                    payload,
                    encoding,
                    wait_policy,
                    stop_pattern,
                    timeout_ms,
                })
            }
            n if n == ReadAsyncMessagesTool::tool_name() => self.read_async_messages_impl(),
            n if n == StatusTool::tool_name() => self.status_impl(),
            other => Err(CallToolError::unknown_tool(other.to_string())),
        }
    }
}

/// Create and run the MCP server over stdio until the transport closes.
pub async fn serve_stdio(engine: Arc<Engine>) -> SdkResult<()> {
    let details = InitializeResult {
        server_info: Implementation {
            name: "serial-bridge".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            title: Some("Serial Bridge MCP Server".into()),
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools { list_changed: None }),
            ..Default::default()
        },
        meta: None,
        instructions: Some(
            "Bridge to a single serial device. Open a port with configure_connection, exchange \
             data with send_data, and drain unsolicited device messages with read_async_messages."
                .into(),
        ),
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    };
    let transport = StdioTransport::new(TransportOptions::default())?;
    let handler = BridgeServerHandler { engine };
    let server = server_runtime::create_server(details, transport, handler);
    server.start().await
}
