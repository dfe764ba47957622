//! OpenAI-compatible chat-completions oracle over blocking HTTP.
//!
//! One [`Oracle::respond`] call makes at most `1 + retries` attempts, all inside
//! the request's timeout. Transport errors, HTTP 429 and 5xx are retried;
//! anything else fails immediately.

use std::env;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::agent::oracle::{Oracle, OracleError, OracleRequest, OracleResponse, ToolCall};
use crate::agent::state::Role;
use crate::io::config::OracleConfig;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

pub struct OpenAiOracle {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    retries: u32,
}

impl OpenAiOracle {
    /// Build from config, reading the API key from `cfg.api_key_env`.
    pub fn from_config(cfg: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = env::var(&cfg.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| OracleError::MissingApiKey {
                var: cfg.api_key_env.clone(),
            })?;
        Ok(Self::with_key(cfg, api_key))
    }

    fn with_key(cfg: &OracleConfig, api_key: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build();
        Self {
            agent,
            url: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            api_key,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            retries: cfg.retries,
        }
    }

    fn attempt(&self, body: &str, remaining: Duration) -> Result<Value, Attempt> {
        let response = self
            .agent
            .post(&self.url)
            .timeout(remaining)
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_string(body);
        match response {
            Ok(resp) => {
                let text = resp
                    .into_string()
                    .map_err(|err| Attempt::Fatal(OracleError::Transport(err.to_string())))?;
                serde_json::from_str(&text)
                    .map_err(|err| Attempt::Fatal(OracleError::Malformed(err.to_string())))
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                let err = OracleError::Status { code, body };
                if code == 429 || code >= 500 {
                    Err(Attempt::Retryable(err))
                } else {
                    Err(Attempt::Fatal(err))
                }
            }
            Err(ureq::Error::Transport(transport)) => Err(Attempt::Retryable(
                OracleError::Transport(transport.to_string()),
            )),
        }
    }
}

enum Attempt {
    Retryable(OracleError),
    Fatal(OracleError),
}

impl Oracle for OpenAiOracle {
    #[instrument(skip_all, fields(model = %self.model, messages = request.conversation.len()))]
    fn respond(&self, request: &OracleRequest<'_>) -> Result<OracleResponse, OracleError> {
        let body = request_body(&self.model, self.temperature, request);
        let body = serde_json::to_string(&body)
            .map_err(|err| OracleError::Malformed(format!("serialize request: {err}")))?;

        let started = Instant::now();
        let mut attempt = 0;
        loop {
            let remaining = request
                .timeout
                .checked_sub(started.elapsed())
                .filter(|left| !left.is_zero())
                .ok_or(OracleError::Timeout(request.timeout))?;
            attempt += 1;
            debug!(attempt, "sending chat completion request");
            match self.attempt(&body, remaining) {
                Ok(json) => return parse_response(&json),
                Err(Attempt::Fatal(err)) => return Err(err),
                Err(Attempt::Retryable(err)) => {
                    if started.elapsed() >= request.timeout {
                        return Err(OracleError::Timeout(request.timeout));
                    }
                    if attempt > self.retries {
                        return Err(err);
                    }
                    warn!(attempt, error = %err, "retrying oracle request");
                    std::thread::sleep(RETRY_BACKOFF);
                }
            }
        }
    }
}

/// Chat-completions request body: system prompt, conversation, tool schemas.
pub fn request_body(model: &str, temperature: f32, request: &OracleRequest<'_>) -> Value {
    let mut messages = vec![json!({"role": "system", "content": request.system})];
    for message in request.conversation {
        let mut entry = json!({
            "role": message.role.as_str(),
            "content": message.content,
        });
        if message.role == Role::Assistant && !message.tool_calls.is_empty() {
            if message.content.is_empty() {
                entry["content"] = Value::Null;
            }
            entry["tool_calls"] = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {"name": call.name, "arguments": call.arguments},
                    })
                })
                .collect();
        }
        if let Some(id) = &message.tool_call_id {
            entry["tool_call_id"] = json!(id);
        }
        messages.push(entry);
    }

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "temperature": temperature,
    });
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(request.tools.to_vec());
        body["tool_choice"] = json!("auto");
    }
    body
}

/// Extract assistant text and tool calls from a chat-completions response.
pub fn parse_response(json: &Value) -> Result<OracleResponse, OracleError> {
    let message = json
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| OracleError::Malformed("missing choices[0].message".to_string()))?;
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut calls = Vec::new();
    if let Some(raw_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for raw in raw_calls {
            let id = raw.get("id").and_then(Value::as_str);
            let function = raw.get("function");
            let name = function
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str);
            let (Some(id), Some(name)) = (id, name) else {
                return Err(OracleError::Malformed(format!(
                    "tool call without id or name: {raw}"
                )));
            };
            let arguments = function
                .and_then(|f| f.get("arguments"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            calls.push(ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            });
        }
    }
    Ok(OracleResponse::from_parts(content, calls))
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::agent::state::Message;

    #[test]
    fn request_body_replays_tool_calls_and_results() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "tree".to_string(),
            arguments: "{\"depth\":2}".to_string(),
        };
        let conversation = vec![
            Message::user("plan"),
            Message::assistant("", vec![call]),
            Message::tool("call_1", "├── src/"),
        ];
        let tools = vec![json!({"type": "function", "function": {"name": "tree"}})];
        let request = OracleRequest {
            system: "rules",
            conversation: &conversation,
            tools: &tools,
            max_tokens: 2000,
            timeout: Duration::from_secs(5),
            max_tool_calls: 5,
        };

        let body = request_body("gpt-4o", 0.1, &request);
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["content"], Value::Null);
        assert_eq!(messages[2]["tool_calls"][0]["function"]["name"], "tree");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["max_tokens"], 2000);
    }

    #[test]
    fn parse_response_reads_tool_calls() {
        let json = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "read_file", "arguments": "{\"path\":\"a.rs\"}"}
                    }]
                }
            }]
        });
        match parse_response(&json).expect("parse") {
            OracleResponse::ToolCalls { content, calls } => {
                assert!(content.is_empty());
                assert_eq!(calls[0].name, "read_file");
                assert_eq!(calls[0].arguments, "{\"path\":\"a.rs\"}");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn parse_response_without_calls_is_final() {
        let json = json!({"choices": [{"message": {"content": "All done."}}]});
        assert_eq!(
            parse_response(&json).expect("parse"),
            OracleResponse::Final {
                content: "All done.".to_string()
            }
        );
    }

    #[test]
    fn parse_response_rejects_missing_choices() {
        assert!(matches!(
            parse_response(&json!({"error": "nope"})),
            Err(OracleError::Malformed(_))
        ));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let cfg = OracleConfig {
            api_key_env: "AGENTBOX_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..OracleConfig::default()
        };
        assert!(matches!(
            OpenAiOracle::from_config(&cfg),
            Err(OracleError::MissingApiKey { .. })
        ));
    }

    fn local_oracle(addr: SocketAddr, retries: u32) -> OpenAiOracle {
        let cfg = OracleConfig {
            base_url: format!("http://{addr}/v1"),
            retries,
            ..OracleConfig::default()
        };
        OpenAiOracle::with_key(&cfg, "test-key".to_string())
    }

    fn request_with_timeout(timeout: Duration) -> OracleRequest<'static> {
        OracleRequest {
            system: "rules",
            conversation: &[],
            tools: &[],
            max_tokens: 16,
            timeout,
            max_tool_calls: 1,
        }
    }

    /// Consume one HTTP request: headers, then a `Content-Length` body.
    fn read_request(stream: &TcpStream) {
        let mut reader = BufReader::new(stream);
        let mut length = 0;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                break;
            }
            if let Some((name, value)) = line.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                length = value.trim().parse().unwrap_or(0);
            }
        }
        let mut body = vec![0; length];
        let _ = reader.read_exact(&mut body);
    }

    #[test]
    fn transient_status_is_retried_then_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                read_request(&stream);
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = stream.write_all(
                    b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy",
                );
            }
        });

        let result = local_oracle(addr, 2).respond(&request_with_timeout(Duration::from_secs(30)));

        assert_eq!(
            result,
            Err(OracleError::Status {
                code: 503,
                body: "busy".to_string()
            })
        );
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn silent_server_becomes_a_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming() {
                held.push(stream);
            }
        });
        let budget = Duration::from_secs(1);

        let started = Instant::now();
        let result = local_oracle(addr, 5).respond(&request_with_timeout(budget));

        assert_eq!(result, Err(OracleError::Timeout(budget)));
        assert!(started.elapsed() >= budget);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
