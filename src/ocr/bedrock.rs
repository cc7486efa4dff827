//! Bedrock Client
//!
//! Bedrock Runtime上のAnthropicモデルを呼び出すクライアント。
//! 認証はBearerトークン（`AWS_BEARER_TOKEN_BEDROCK`）で行います。
//!
//! - 非ストリーミング: `POST /model/{id}/invoke`
//! - ストリーミング: `POST /model/{id}/invoke-with-response-stream`
//!   （応答はevent-streamフレーム、ペイロードは`{"bytes": "<base64 JSON>"}`）

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::io::Read;

use crate::api::Provider;
use crate::error::XlsxVisionError;
use crate::ocr::client::{check_status, Completion, VisionClient, VisionRequest};
use crate::ocr::config::ProviderConfig;
use crate::ocr::eventstream::EventStreamReader;

pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

pub struct BedrockClient {
    http: reqwest::blocking::Client,
    base: String,
    token: String,
    model: String,
}

impl BedrockClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, XlsxVisionError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base: format!(
                "https://bedrock-runtime.{}.amazonaws.com/model/{}",
                config.region,
                encode_model_id(&config.model)
            ),
            token: config.credential.clone(),
            model: config.model.clone(),
        })
    }

    fn send(
        &self,
        action: &str,
        accept: &str,
        request: &VisionRequest,
    ) -> Result<reqwest::blocking::Response, XlsxVisionError> {
        let url = format!("{}/{}", self.base, action);
        tracing::debug!(url = %url, "sending Bedrock request");
        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", accept)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&request_body(request))
            .send()?;
        check_status(response)
    }
}

impl VisionClient for BedrockClient {
    fn provider(&self) -> Provider {
        Provider::Bedrock
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: &VisionRequest) -> Result<Completion, XlsxVisionError> {
        let response = self.send("invoke", "application/json", request)?;
        let value: Value = response.json()?;
        Ok(parse_invoke_response(&value))
    }

    fn stream(
        &self,
        request: &VisionRequest,
        on_text: &mut dyn FnMut(&str),
    ) -> Result<Completion, XlsxVisionError> {
        let response = self.send(
            "invoke-with-response-stream",
            "application/vnd.amazon.eventstream",
            request,
        )?;
        read_event_stream(response, on_text)
    }
}

/// URLパス用にモデルIDをエンコード（`:`と`/`）
pub(crate) fn encode_model_id(model: &str) -> String {
    model.replace(':', "%3A").replace('/', "%2F")
}

/// Anthropic Messages形式のリクエストボディ
pub(crate) fn request_body(request: &VisionRequest) -> Value {
    json!({
        "anthropic_version": ANTHROPIC_VERSION,
        "max_tokens": request.max_tokens,
        "messages": [{
            "role": "user",
            "content": [
                {
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": request.image.media_type,
                        "data": request.image.data,
                    },
                },
                { "type": "text", "text": request.prompt },
            ],
        }],
    })
}

/// `invoke`の応答からテキストブロックを連結
pub(crate) fn parse_invoke_response(value: &Value) -> Completion {
    let mut completion = Completion::default();
    if let Some(blocks) = value.get("content").and_then(Value::as_array) {
        for block in blocks {
            if block.get("type").and_then(Value::as_str) == Some("text") {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    completion.text.push_str(text);
                }
            }
        }
    }
    if let Some(usage) = value.get("usage") {
        completion.usage.input_tokens = usage.get("input_tokens").and_then(Value::as_u64);
        completion.usage.output_tokens = usage.get("output_tokens").and_then(Value::as_u64);
    }
    completion
}

/// event-streamの応答を読み、テキスト片を連結する
///
/// `message_stop`を受け取るかストリームが終わった時点で終了します。
pub(crate) fn read_event_stream<R: Read>(
    reader: R,
    on_text: &mut dyn FnMut(&str),
) -> Result<Completion, XlsxVisionError> {
    let mut messages = EventStreamReader::new(reader);
    let mut completion = Completion::default();

    while let Some(message) = messages.next_message()? {
        if message.header_str(":message-type") == Some("exception") {
            let kind = message.header_str(":exception-type").unwrap_or("exception");
            let detail = serde_json::from_slice::<Value>(&message.payload)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| String::from_utf8_lossy(&message.payload).into_owned());
            return Err(XlsxVisionError::EventStream(format!("{}: {}", kind, detail)));
        }
        if message.header_str(":event-type") != Some("chunk") {
            continue;
        }

        let envelope: Value = serde_json::from_slice(&message.payload)?;
        let Some(encoded) = envelope.get("bytes").and_then(Value::as_str) else {
            continue;
        };
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| XlsxVisionError::EventStream(format!("invalid chunk encoding: {}", e)))?;
        let chunk: Value = serde_json::from_slice(&decoded)?;

        match chunk.get("type").and_then(Value::as_str) {
            Some("content_block_delta") => {
                if let Some(text) = chunk.pointer("/delta/text").and_then(Value::as_str) {
                    on_text(text);
                    completion.text.push_str(text);
                }
            }
            Some("message_start") => {
                completion.usage.input_tokens = chunk
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64);
            }
            Some("message_delta") => {
                if let Some(output) = chunk.pointer("/usage/output_tokens").and_then(Value::as_u64) {
                    completion.usage.output_tokens = Some(output);
                }
            }
            Some("message_stop") => break,
            _ => {}
        }
    }

    Ok(completion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::client::EncodedImage;
    use crate::ocr::eventstream::encode_message;
    use std::io::Cursor;
    use std::path::Path;

    fn chunk(event: Value) -> Vec<u8> {
        let payload = json!({ "bytes": STANDARD.encode(event.to_string()) }).to_string();
        encode_message(
            &[
                (":event-type", "chunk"),
                (":content-type", "application/json"),
                (":message-type", "event"),
            ],
            payload.as_bytes(),
        )
    }

    #[test]
    fn test_encode_model_id() {
        assert_eq!(
            encode_model_id("global.anthropic.claude-sonnet-4-5-20250929-v1:0"),
            "global.anthropic.claude-sonnet-4-5-20250929-v1%3A0"
        );
        assert_eq!(
            encode_model_id("arn:aws:bedrock:us-east-1:1:inference-profile/x"),
            "arn%3Aaws%3Abedrock%3Aus-east-1%3A1%3Ainference-profile%2Fx"
        );
    }

    #[test]
    fn test_request_body() {
        let request = VisionRequest {
            image: EncodedImage::from_bytes(Path::new("sheet.jpeg"), b"img"),
            prompt: "Describe".to_string(),
            max_tokens: 8192,
        };
        let body = request_body(&request);
        assert_eq!(body["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(body["max_tokens"], 8192);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[0]["source"]["data"], "aW1n");
        assert_eq!(content[1]["text"], "Describe");
    }

    #[test]
    fn test_parse_invoke_response() {
        let value = json!({
            "content": [
                { "type": "text", "text": "Part one. " },
                { "type": "tool_use", "id": "x" },
                { "type": "text", "text": "Part two." }
            ],
            "usage": { "input_tokens": 100, "output_tokens": 20 }
        });
        let completion = parse_invoke_response(&value);
        assert_eq!(completion.text, "Part one. Part two.");
        assert_eq!(completion.usage.total(), Some(120));
    }

    #[test]
    fn test_read_event_stream() {
        let mut stream = Vec::new();
        stream.extend(chunk(json!({
            "type": "message_start",
            "message": { "usage": { "input_tokens": 12 } }
        })));
        stream.extend(chunk(json!({ "type": "content_block_start", "index": 0 })));
        stream.extend(chunk(json!({
            "type": "content_block_delta",
            "delta": { "type": "text_delta", "text": "Hello" }
        })));
        stream.extend(chunk(json!({
            "type": "content_block_delta",
            "delta": { "type": "text_delta", "text": ", Excel" }
        })));
        stream.extend(chunk(json!({ "type": "message_delta", "usage": { "output_tokens": 4 } })));
        stream.extend(chunk(json!({ "type": "message_stop" })));
        stream.extend(chunk(json!({
            "type": "content_block_delta",
            "delta": { "text": "after stop" }
        })));

        let mut chunks = Vec::new();
        let completion =
            read_event_stream(Cursor::new(stream), &mut |t: &str| chunks.push(t.to_string()))
                .unwrap();
        assert_eq!(chunks, vec!["Hello", ", Excel"]);
        assert_eq!(completion.text, "Hello, Excel");
        assert_eq!(completion.usage.input_tokens, Some(12));
        assert_eq!(completion.usage.output_tokens, Some(4));
    }

    #[test]
    fn test_read_event_stream_exception() {
        let frame = encode_message(
            &[
                (":message-type", "exception"),
                (":exception-type", "throttlingException"),
            ],
            br#"{"message":"Too many requests"}"#,
        );
        match read_event_stream(Cursor::new(frame), &mut |_: &str| {}) {
            Err(XlsxVisionError::EventStream(msg)) => {
                assert_eq!(msg, "throttlingException: Too many requests");
            }
            other => panic!("Expected EventStream error, got {:?}", other),
        }
    }
}
