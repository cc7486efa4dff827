//! OpenAI Client
//!
//! Chat Completions API（`POST {base}/chat/completions`）を使用するクライアント。
//! ストリーミング応答はServer-Sent Events（`data: ...`行、`data: [DONE]`で終了）です。

use serde_json::{json, Value};
use std::io::{BufRead, BufReader};

use crate::api::Provider;
use crate::error::XlsxVisionError;
use crate::ocr::client::{check_status, Completion, Usage, VisionClient, VisionRequest};
use crate::ocr::config::ProviderConfig;

pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, XlsxVisionError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.credential.clone(),
            model: config.model.clone(),
        })
    }

    fn send(&self, body: &Value) -> Result<reqwest::blocking::Response, XlsxVisionError> {
        tracing::debug!(endpoint = %self.endpoint, model = %self.model, "sending chat completion request");
        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()?;
        check_status(response)
    }
}

impl VisionClient for OpenAiClient {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: &VisionRequest) -> Result<Completion, XlsxVisionError> {
        let response = self.send(&request_body(&self.model, request, false))?;
        let value: Value = response.json()?;
        parse_completion(&value)
    }

    fn stream(
        &self,
        request: &VisionRequest,
        on_text: &mut dyn FnMut(&str),
    ) -> Result<Completion, XlsxVisionError> {
        let response = self.send(&request_body(&self.model, request, true))?;
        read_sse(BufReader::new(response), on_text)
    }
}

/// リクエストボディを構築
pub(crate) fn request_body(model: &str, request: &VisionRequest, stream: bool) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": request.max_tokens,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": request.prompt },
                { "type": "image_url", "image_url": { "url": request.image.data_url() } },
            ],
        }],
    });
    if stream {
        body["stream"] = json!(true);
        body["stream_options"] = json!({ "include_usage": true });
    }
    body
}

fn parse_usage(value: &Value) -> Usage {
    let field = |name: &str| value.get(name).and_then(Value::as_u64);
    Usage {
        input_tokens: field("prompt_tokens"),
        output_tokens: field("completion_tokens"),
        total_tokens: field("total_tokens"),
    }
}

/// 非ストリーミング応答を解析
pub(crate) fn parse_completion(value: &Value) -> Result<Completion, XlsxVisionError> {
    let text = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| XlsxVisionError::Api {
            status: 200,
            message: "response has no choices[0].message.content".to_string(),
        })?;
    Ok(Completion {
        text: text.to_string(),
        usage: value.get("usage").map(parse_usage).unwrap_or_default(),
    })
}

/// SSEストリームを読み、テキスト片を連結する
///
/// 解析できない`data:`行はスキップします。
pub(crate) fn read_sse<R: BufRead>(
    reader: R,
    on_text: &mut dyn FnMut(&str),
) -> Result<Completion, XlsxVisionError> {
    let mut completion = Completion::default();

    for line in reader.lines() {
        let line = line?;
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            break;
        }

        let event: Value = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed SSE event");
                continue;
            }
        };
        if let Some(error) = event.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("stream error")
                .to_string();
            return Err(XlsxVisionError::Api {
                status: 200,
                message,
            });
        }

        if let Some(choices) = event.get("choices").and_then(Value::as_array) {
            for choice in choices {
                if let Some(text) = choice.pointer("/delta/content").and_then(Value::as_str) {
                    on_text(text);
                    completion.text.push_str(text);
                }
            }
        }
        if let Some(usage) = event.get("usage").filter(|u| !u.is_null()) {
            completion.usage = parse_usage(usage);
        }
    }

    Ok(completion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::client::EncodedImage;
    use std::io::Cursor;
    use std::path::Path;

    fn request() -> VisionRequest {
        VisionRequest {
            image: EncodedImage::from_bytes(Path::new("a.png"), b"img"),
            prompt: "Read this".to_string(),
            max_tokens: 4096,
        }
    }

    #[test]
    fn test_request_body() {
        let body = request_body("gpt-4o", &request(), false);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["messages"][0]["content"][0]["text"], "Read this");
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,aW1n"
        );
        assert!(body.get("stream").is_none());

        let streaming = request_body("gpt-4o", &request(), true);
        assert_eq!(streaming["stream"], true);
        assert_eq!(streaming["stream_options"]["include_usage"], true);
    }

    #[test]
    fn test_parse_completion() {
        let value = json!({
            "choices": [{ "message": { "role": "assistant", "content": "# Title" } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        });
        let completion = parse_completion(&value).unwrap();
        assert_eq!(completion.text, "# Title");
        assert_eq!(completion.usage.total(), Some(15));

        assert!(parse_completion(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn test_read_sse() {
        let stream = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n\
                      : keep-alive\n\
                      data: not json\n\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n\
                      data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2,\"total_tokens\":5}}\n\n\
                      data: [DONE]\n\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n";

        let mut chunks = Vec::new();
        let completion = read_sse(Cursor::new(stream), &mut |t: &str| chunks.push(t.to_string())).unwrap();
        assert_eq!(chunks, vec!["Hello", " world"]);
        assert_eq!(completion.text, "Hello world");
        assert_eq!(completion.usage.total(), Some(5));
    }

    #[test]
    fn test_read_sse_error_event() {
        let stream = "data: {\"error\":{\"message\":\"rate limited\"}}\n";
        match read_sse(Cursor::new(stream), &mut |_: &str| {}) {
            Err(XlsxVisionError::Api { message, .. }) => assert_eq!(message, "rate limited"),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }
}
