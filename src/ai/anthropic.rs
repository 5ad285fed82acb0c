//! Anthropic Messages API client

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prompt::{self, Conversation};
use super::{AiClient, AskRequest};
use crate::config::ApiSettings;
use crate::constants::api;
use crate::error::AiError;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    message: String,
}

pub struct AnthropicClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_response_length: u32,
    system: String,
    memory: Mutex<Conversation>,
}

impl AnthropicClient {
    pub fn new(settings: &ApiSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let url = format!("{}{}", settings.endpoint.trim_end_matches('/'), api::MESSAGES_PATH);
        info!(url = %url, model = %settings.model, "AI client configured");
        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            max_response_length: settings.max_response_length,
            system: prompt::system_prompt(settings.max_response_length),
            memory: Mutex::new(Conversation::new(settings.memory_window)),
        })
    }

    fn history_messages(&self) -> Vec<Message> {
        let memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        memory
            .exchanges()
            .flat_map(|exchange| {
                [
                    Message {
                        role: "user",
                        content: vec![ContentBlock::Text {
                            text: exchange.user.clone(),
                        }],
                    },
                    Message {
                        role: "assistant",
                        content: vec![ContentBlock::Text {
                            text: exchange.assistant.clone(),
                        }],
                    },
                ]
            })
            .collect()
    }

    fn build_request(&self, png: &[u8], user_text: &str) -> MessagesRequest<'_> {
        let mut messages = self.history_messages();
        messages.push(Message {
            role: "user",
            content: vec![
                ContentBlock::Image {
                    source: ImageSource {
                        kind: "base64",
                        media_type: "image/png",
                        data: BASE64.encode(png),
                    },
                },
                ContentBlock::Text {
                    text: user_text.to_string(),
                },
            ],
        });
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: &self.system,
            messages,
        }
    }

    fn remember(&self, user_text: String, reply: String) {
        let mut memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        memory.record(user_text, reply);
        debug!(exchanges = memory.len(), "Conversation memory updated");
    }

    /// Replies that arrive after cancellation leave the conversation memory untouched
    fn accept(&self, cancel: &CancellationToken, user_text: String, reply: String) -> Result<String, AiError> {
        if cancel.is_cancelled() {
            return Err(AiError::Cancelled);
        }
        self.remember(user_text, reply.clone());
        Ok(reply)
    }
}

#[async_trait]
impl AiClient for AnthropicClient {
    async fn ask(&self, request: AskRequest, cancel: CancellationToken) -> Result<String, AiError> {
        if cancel.is_cancelled() {
            debug!(request_id = %request.request_id, "Request cancelled before issue");
            return Err(AiError::Cancelled);
        }

        let user_text = prompt::user_text(request.prompt.as_deref(), self.max_response_length);
        let body = self.build_request(&request.screenshot.png, &user_text);
        debug!(
            request_id = %request.request_id,
            history = body.messages.len() - 1,
            png_bytes = request.screenshot.png.len(),
            "Sending messages request"
        );

        let send = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", api::VERSION)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AiError::Cancelled),
            result = send => result.map_err(transport_error)?,
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AiError::Cancelled),
            result = response.text() => result.map_err(transport_error)?,
        };

        if !status.is_success() {
            let err = status_error(status, retry_after.as_deref(), &text);
            warn!(request_id = %request.request_id, status = %status, error = %err, "Provider returned an error");
            return Err(err);
        }

        let reply = parse_reply(&text)?;
        self.accept(&cancel, user_text, reply)
    }
}

fn transport_error(e: reqwest::Error) -> AiError {
    if e.is_timeout() {
        AiError::Timeout
    } else if e.is_decode() {
        AiError::InvalidResponse(e.to_string())
    } else {
        AiError::Network(e.to_string())
    }
}

fn status_error(status: StatusCode, retry_after: Option<&str>, body: &str) -> AiError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return AiError::RateLimited {
            retry_after_secs: retry_after.and_then(|v| v.trim().parse().ok()),
        };
    }
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if envelope.error.kind.is_empty() => {
            AiError::ProviderError(format!("{status}: {}", envelope.error.message))
        }
        Ok(envelope) => AiError::ProviderError(format!(
            "{status}: {} ({})",
            envelope.error.message, envelope.error.kind
        )),
        Err(_) => AiError::ProviderError(status.to_string()),
    }
}

fn parse_reply(body: &str) -> Result<String, AiError> {
    let response: MessagesResponse =
        serde_json::from_str(body).map_err(|e| AiError::InvalidResponse(format!("undecodable body: {e}")))?;
    let text: Vec<String> = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(text),
            ResponseBlock::Other => None,
        })
        .collect();
    let reply = text.join("\n").trim().to_string();
    if reply.is_empty() {
        return Err(AiError::InvalidResponse("no text in reply".to_string()));
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Screenshot;
    use crate::session::RequestId;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;

    fn settings(endpoint: &str) -> ApiSettings {
        ApiSettings {
            endpoint: endpoint.to_string(),
            api_key: "sk-test".to_string(),
            memory_window: 2,
            ..ApiSettings::default()
        }
    }

    fn request(prompt: Option<&str>) -> AskRequest {
        let screenshot = Screenshot {
            captured_at: chrono::Local::now(),
            width: 1,
            height: 1,
            png: vec![1, 2, 3],
        };
        AskRequest {
            request_id: RequestId::new(1),
            screenshot: Arc::new(screenshot),
            prompt: prompt.map(str::to_string),
        }
    }

    /// Serve one HTTP response; the raw request (headers + body) is sent back on the channel
    fn serve_once(status: &'static str, headers: &'static str, body: &'static str) -> (String, std::sync::mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut raw = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
                raw.push_str(&line);
                if line == "\r\n" {
                    break;
                }
            }
            let mut body_buf = vec![0; content_length];
            reader.read_exact(&mut body_buf).unwrap();
            raw.push_str(&String::from_utf8_lossy(&body_buf));
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n{headers}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            reader.get_mut().write_all(response.as_bytes()).unwrap();
            tx.send(raw).unwrap();
        });
        (format!("http://{addr}"), rx)
    }

    #[test]
    fn test_parse_reply_joins_text_blocks() {
        let body = r#"{"content":[{"type":"text","text":"Push left."},{"type":"tool_use","id":"x"},{"type":"text","text":"Then heal."}]}"#;
        assert_eq!(parse_reply(body).unwrap(), "Push left.\nThen heal.");
    }

    #[test]
    fn test_parse_reply_without_text_is_invalid() {
        assert!(matches!(parse_reply(r#"{"content":[]}"#), Err(AiError::InvalidResponse(_))));
        assert!(matches!(parse_reply("<html>"), Err(AiError::InvalidResponse(_))));
    }

    #[test]
    fn test_status_error_mapping() {
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, Some("7"), ""),
            AiError::RateLimited {
                retry_after_secs: Some(7)
            }
        );
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, Some("soon"), ""),
            AiError::RateLimited { retry_after_secs: None }
        );

        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        match status_error(StatusCode::from_u16(529).unwrap(), None, body) {
            AiError::ProviderError(msg) => {
                assert!(msg.contains("Overloaded"));
                assert!(msg.contains("overloaded_error"));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, None, "bad gateway"),
            AiError::ProviderError(msg) if msg.contains("502")
        ));
    }

    #[test]
    fn test_build_request_shape() {
        let client = AnthropicClient::new(&settings("https://example.invalid/"), Duration::from_secs(5)).unwrap();
        client.remember("earlier question".into(), "earlier answer".into());

        let body = serde_json::to_value(client.build_request(&[0xFF, 0x00], "now what")).unwrap();
        assert_eq!(body["model"], crate::constants::defaults::MODEL);
        assert_eq!(body["max_tokens"], 300);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][0]["text"], "earlier answer");

        let current = &messages[2]["content"];
        assert_eq!(current[0]["type"], "image");
        assert_eq!(current[0]["source"]["type"], "base64");
        assert_eq!(current[0]["source"]["media_type"], "image/png");
        assert_eq!(current[0]["source"]["data"], "/wA=");
        assert_eq!(current[1]["type"], "text");
        assert_eq!(current[1]["text"], "now what");
        assert_eq!(client.url, "https://example.invalid/v1/messages");
    }

    #[tokio::test]
    async fn test_cancelled_before_issue() {
        let client = AnthropicClient::new(&settings("http://127.0.0.1:9"), Duration::from_secs(5)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(client.ask(request(None), cancel).await, Err(AiError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_response() {
        // Accepted by the kernel backlog but never answered
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let client = AnthropicClient::new(&settings(&endpoint), Duration::from_secs(30)).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let result = tokio::time::timeout(Duration::from_secs(5), client.ask(request(None), cancel)).await;
        assert_eq!(result.unwrap(), Err(AiError::Cancelled));
        drop(listener);
    }

    #[tokio::test]
    async fn test_transport_timeout_maps_to_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let client = AnthropicClient::new(&settings(&endpoint), Duration::from_millis(200)).unwrap();
        let result = client.ask(request(None), CancellationToken::new()).await;
        assert_eq!(result, Err(AiError::Timeout));
        drop(listener);
    }

    #[tokio::test]
    async fn test_successful_exchange_is_remembered() {
        let (endpoint, raw) = serve_once("200 OK", "", r#"{"content":[{"type":"text","text":"ok"}]}"#);
        let client = AnthropicClient::new(&settings(&endpoint), Duration::from_secs(5)).unwrap();

        let reply = client.ask(request(Some("status?")), CancellationToken::new()).await;
        assert_eq!(reply, Ok("ok".to_string()));

        let raw = raw.recv().unwrap().to_ascii_lowercase();
        assert!(raw.starts_with("post /v1/messages"));
        assert!(raw.contains("x-api-key: sk-test"));
        assert!(raw.contains("anthropic-version: 2023-06-01"));
        assert!(raw.contains("user message: status?"));

        let memory = client.memory.lock().unwrap();
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.exchanges().next().unwrap().assistant, "ok");
    }

    #[test]
    fn test_reply_after_cancel_is_not_remembered() {
        let client = AnthropicClient::new(&settings("http://127.0.0.1:9"), Duration::from_secs(5)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            client.accept(&cancel, "q".into(), "late".into()),
            Err(AiError::Cancelled)
        );
        assert_eq!(client.memory.lock().unwrap().len(), 0);

        let live = CancellationToken::new();
        assert_eq!(client.accept(&live, "q".into(), "ok".into()), Ok("ok".to_string()));
        assert_eq!(client.memory.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_response() {
        let (endpoint, _raw) = serve_once(
            "429 Too Many Requests",
            "Retry-After: 12\r\n",
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#,
        );
        let client = AnthropicClient::new(&settings(&endpoint), Duration::from_secs(5)).unwrap();
        let result = client.ask(request(None), CancellationToken::new()).await;
        assert_eq!(
            result,
            Err(AiError::RateLimited {
                retry_after_secs: Some(12)
            })
        );
        assert_eq!(client.memory.lock().unwrap().len(), 0);
    }
}
