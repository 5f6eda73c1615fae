use crate::constants::scheduling::TRANSPORT_STARTUP_TIMEOUT_SECS;
use crate::error::{ConclaveError, Result};
use crate::transport::traits::{
    CancelHandle, Session, SessionEvent, SessionRequest, TransportClient, TransportErrorKind,
};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Streaming HTTP transport speaking an SSE message API.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    startup_timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            startup_timeout: Duration::from_secs(TRANSPORT_STARTUP_TIMEOUT_SECS),
        }
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    fn build_request_body(request: &SessionRequest) -> Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "system": request.system_prompt,
            "messages": [{"role": "user", "content": request.user_prompt}],
            "max_tokens": 8192,
            "stream": true,
        });

        if let Some(ref effort) = request.reasoning_effort {
            body["reasoning_effort"] = Value::String(effort.clone());
        }

        if !request.mcp_servers.is_empty() {
            let servers: Vec<Value> = request
                .mcp_servers
                .iter()
                .map(|s| serde_json::json!({"name": s.name, "url": s.url}))
                .collect();
            body["mcp_servers"] = Value::Array(servers);
        }

        body
    }
}

#[async_trait::async_trait]
impl TransportClient for HttpTransport {
    async fn open_session(&self, request: SessionRequest) -> Result<Session> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_request_body(&request);

        let send = self
            .client
            .post(&url)
            .header("x-api-key", request.auth_token.expose())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send();

        // Session establishment is always bounded.
        let response = match tokio::time::timeout(self.startup_timeout, send).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => return Err(ConclaveError::SessionStart(e.to_string())),
            Err(_) => {
                return Err(ConclaveError::SessionStart(format!(
                    "no response within {:?}",
                    self.startup_timeout
                )))
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            return Err(ConclaveError::Auth(format!("{status}: {text}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ConclaveError::SessionStart(format!("{status}: {text}")));
        }

        let cancel = CancelHandle::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let reader_cancel = cancel.clone();
        tokio::spawn(async move {
            use futures::StreamExt;
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            // Maps content_block index -> (tool name, accumulated arguments).
            let mut tool_blocks: HashMap<u64, (String, String)> = HashMap::new();

            loop {
                let chunk = tokio::select! {
                    _ = reader_cancel.cancelled() => {
                        let _ = tx.send(SessionEvent::Error {
                            kind: TransportErrorKind::Cancelled,
                            message: "session cancelled".to_string(),
                        });
                        return;
                    }
                    chunk = stream.next() => chunk,
                };

                let chunk = match chunk {
                    Some(Ok(c)) => c,
                    Some(Err(e)) => {
                        let _ = tx.send(SessionEvent::Error {
                            kind: TransportErrorKind::Transient,
                            message: e.to_string(),
                        });
                        return;
                    }
                    None => break,
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || !line.starts_with("data: ") {
                        continue;
                    }
                    let data = &line[6..];
                    if data == "[DONE]" {
                        let _ = tx.send(SessionEvent::Done);
                        return;
                    }

                    let Ok(event) = serde_json::from_str::<Value>(data) else {
                        continue;
                    };
                    match event.get("type").and_then(|t| t.as_str()) {
                        Some("content_block_delta") => {
                            let Some(delta) = event.get("delta") else {
                                continue;
                            };
                            match delta.get("type").and_then(|t| t.as_str()) {
                                Some("text_delta") => {
                                    if let Some(text) = delta.get("text").and_then(|t| t.as_str()) {
                                        let _ =
                                            tx.send(SessionEvent::TextChunk(text.to_string()));
                                    }
                                }
                                Some("input_json_delta") => {
                                    let index =
                                        event.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                                    if let Some(partial) =
                                        delta.get("partial_json").and_then(|t| t.as_str())
                                    {
                                        if let Some((_, args)) = tool_blocks.get_mut(&index) {
                                            args.push_str(partial);
                                        }
                                    }
                                }
                                _ => {}
                            }
                        }
                        Some("content_block_start") => {
                            let Some(cb) = event.get("content_block") else {
                                continue;
                            };
                            if cb.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                                let index =
                                    event.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                                let name = cb
                                    .get("name")
                                    .and_then(|v| v.as_str())
                                    .unwrap_or("")
                                    .to_string();
                                tool_blocks.insert(index, (name, String::new()));
                            }
                        }
                        Some("content_block_stop") => {
                            let index = event.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                            if let Some((name, arguments)) = tool_blocks.remove(&index) {
                                let _ = tx.send(SessionEvent::ToolCall { name, arguments });
                            }
                        }
                        Some("message_stop") => {
                            let _ = tx.send(SessionEvent::Done);
                            return;
                        }
                        Some("error") => {
                            let message = event
                                .get("error")
                                .and_then(|e| e.get("message"))
                                .and_then(|m| m.as_str())
                                .unwrap_or("unknown transport error")
                                .to_string();
                            let kind = match event
                                .get("error")
                                .and_then(|e| e.get("type"))
                                .and_then(|t| t.as_str())
                            {
                                Some("authentication_error") => TransportErrorKind::Auth,
                                Some("overloaded_error") | Some("rate_limit_error") => {
                                    TransportErrorKind::RateLimited
                                }
                                _ => TransportErrorKind::Transient,
                            };
                            let _ = tx.send(SessionEvent::Error { kind, message });
                            return;
                        }
                        _ => {}
                    }
                }
            }

            let _ = tx.send(SessionEvent::Done);
        });

        Ok(Session::new(rx, cancel))
    }
}
