use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use retouch_contracts::codec::EncodedImage;
use retouch_contracts::{AspectRatio, ProviderTurn};
use serde_json::{json, Map, Value};

use crate::config::StudioConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// One generate call: an optional inline image, one instruction, and an
/// optional output aspect ratio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    pub model: String,
    pub inline_image: Option<EncodedImage>,
    pub instruction: String,
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub history: Vec<ProviderTurn>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPart {
    InlineImage(EncodedImage),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentReply {
    pub parts: Vec<ReplyPart>,
}

impl ContentReply {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ReplyPart::Text(text.into())],
        }
    }

    pub fn from_image(image: EncodedImage) -> Self {
        Self {
            parts: vec![ReplyPart::InlineImage(image)],
        }
    }

    /// First part carrying inline image bytes; later image parts are ignored.
    pub fn first_image(&self) -> Option<&EncodedImage> {
        self.parts.iter().find_map(|part| match part {
            ReplyPart::InlineImage(image) if !image.data.trim().is_empty() => Some(image),
            _ => None,
        })
    }

    /// All text parts joined; `None` when there is no non-blank text.
    pub fn text(&self) -> Option<String> {
        let joined = self
            .parts
            .iter()
            .filter_map(|part| match part {
                ReplyPart::Text(text) => Some(text.as_str()),
                ReplyPart::InlineImage(_) => None,
            })
            .collect::<Vec<&str>>()
            .join("");
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Boundary to the external generative service. Implementations issue
/// exactly one outbound call per invocation and never retry.
pub trait GenerativeService: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &ContentRequest) -> Result<ContentReply>;
    fn chat(&self, request: &ChatRequest) -> Result<ContentReply>;
}

pub struct GeminiService {
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiService {
    pub fn new(config: &StudioConfig) -> Self {
        Self {
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: config.request_timeout(),
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        let name = model.trim();
        let name = name.strip_prefix("models/").unwrap_or(name);
        format!("{}/models/{name}:generateContent", self.api_base)
    }

    fn build_generate_payload(request: &ContentRequest) -> Value {
        let mut parts = Vec::new();
        if let Some(image) = request.inline_image.as_ref() {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.media_type,
                    "data": image.data,
                }
            }));
        }
        parts.push(json!({ "text": request.instruction }));

        let mut payload = Map::new();
        payload.insert(
            "contents".to_string(),
            Value::Array(vec![json!({
                "role": "user",
                "parts": parts,
            })]),
        );
        if let Some(aspect_ratio) = request.aspect_ratio {
            payload.insert(
                "generationConfig".to_string(),
                json!({
                    "imageConfig": {
                        "aspectRatio": aspect_ratio.as_str(),
                    }
                }),
            );
        }
        Value::Object(payload)
    }

    fn build_chat_payload(request: &ChatRequest) -> Result<Value> {
        let mut contents = request
            .history
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<Value>, _>>()
            .context("chat history serialization failed")?;
        contents.push(json!({
            "role": "user",
            "parts": [{ "text": request.message }],
        }));

        let mut payload = Map::new();
        payload.insert("contents".to_string(), Value::Array(contents));
        if let Some(instruction) = request
            .system_instruction
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            payload.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": instruction }] }),
            );
        }
        Ok(Value::Object(payload))
    }

    /// The key travels in a header so it never appears in a URL, and any
    /// error text that still mentions it is scrubbed before it leaves here.
    fn post(&self, model: &str, payload: &Value) -> Result<Value> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint(model);
        tracing::debug!(%endpoint, "issuing Gemini request");
        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, api_key)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Gemini request for {} failed", model.trim()))
            .map_err(|err| redact_secret(err, api_key))?;
        let status = response.status().as_u16();
        tracing::debug!(status, "Gemini responded");
        let body = response
            .text()
            .map_err(reqwest::Error::without_url)
            .context("Gemini response body unreadable")
            .map_err(|err| redact_secret(err, api_key))?;
        interpret_reply(status, &body).map_err(|err| redact_secret(err, api_key))
    }

    fn parse_reply(payload: &Value) -> ContentReply {
        let parts = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut out = Vec::new();
        for part in parts {
            if let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            {
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let media_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                out.push(ReplyPart::InlineImage(EncodedImage {
                    data: data.to_string(),
                    media_type: media_type.to_string(),
                }));
                continue;
            }
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                out.push(ReplyPart::Text(text.to_string()));
            }
        }
        ContentReply { parts: out }
    }
}

impl GenerativeService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &ContentRequest) -> Result<ContentReply> {
        let payload = Self::build_generate_payload(request);
        let response = self.post(&request.model, &payload)?;
        Ok(Self::parse_reply(&response))
    }

    fn chat(&self, request: &ChatRequest) -> Result<ContentReply> {
        let payload = Self::build_chat_payload(request)?;
        let response = self.post(&request.model, &payload)?;
        Ok(Self::parse_reply(&response))
    }
}

/// Turns a raw HTTP reply into JSON. Non-2xx statuses become errors that
/// carry Gemini's own `error.message` when the body has one.
fn interpret_reply(status: u16, body: &str) -> Result<Value> {
    if !(200..300).contains(&status) {
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| {
                value
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| body.trim().to_string());
        bail!("Gemini returned HTTP {status}: {}", clip(&detail, 512));
    }
    serde_json::from_str(body).context("Gemini returned malformed JSON")
}

/// Replaces every occurrence of `secret` in the rendered error chain.
fn redact_secret(err: anyhow::Error, secret: &str) -> anyhow::Error {
    let rendered = format!("{err:#}");
    if secret.is_empty() || !rendered.contains(secret) {
        return err;
    }
    anyhow!(rendered.replace(secret, "<redacted>"))
}

/// Distinct, non-blank messages of the error chain, outermost first.
pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut messages: Vec<String> = Vec::new();
    for cause in err.chain() {
        let message = cause.to_string().trim().to_string();
        if message.is_empty() || messages.last() == Some(&message) {
            continue;
        }
        messages.push(message);
    }
    clip(&messages.join(": "), max_chars)
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use retouch_contracts::{codec, ImageArtifact, Role};
    use serde_json::json;

    use super::*;

    fn service_for_test(api_key: Option<&str>, api_base: &str) -> GeminiService {
        let config = StudioConfig {
            api_base: api_base.to_string(),
            api_key: api_key.map(str::to_string),
            ..StudioConfig::default()
        };
        GeminiService::new(&config)
    }

    #[test]
    fn endpoint_accepts_bare_and_prefixed_model_names() {
        let service = service_for_test(Some("k"), "https://example.test/v1beta/");
        assert_eq!(
            service.endpoint("gemini-2.5-flash-image"),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(
            service.endpoint(" models/gemini-2.5-flash "),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn generate_payload_carries_image_instruction_and_ratio() {
        let image = codec::encode(&ImageArtifact::new(b"png".to_vec(), "image/png"));
        let request = ContentRequest {
            model: "gemini-2.5-flash-image".to_string(),
            inline_image: Some(image),
            instruction: "make it brighter".to_string(),
            aspect_ratio: Some(AspectRatio::Portrait3x4),
        };
        let payload = GeminiService::build_generate_payload(&request);
        assert_eq!(
            payload,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        {"inlineData": {"mimeType": "image/png", "data": "cG5n"}},
                        {"text": "make it brighter"},
                    ],
                }],
                "generationConfig": {"imageConfig": {"aspectRatio": "3:4"}},
            })
        );
    }

    #[test]
    fn generate_payload_omits_config_without_ratio() {
        let request = ContentRequest {
            model: "gemini-2.5-flash".to_string(),
            inline_image: None,
            instruction: "describe".to_string(),
            aspect_ratio: None,
        };
        let payload = GeminiService::build_generate_payload(&request);
        assert!(payload.get("generationConfig").is_none());
        assert_eq!(payload["contents"][0]["parts"], json!([{"text": "describe"}]));
    }

    #[test]
    fn chat_payload_appends_message_after_history() -> anyhow::Result<()> {
        let request = ChatRequest {
            model: "gemini-2.5-flash".to_string(),
            system_instruction: Some("Be brief.".to_string()),
            history: vec![
                ProviderTurn::new(Role::Assistant, "Hi there"),
                ProviderTurn::new(Role::User, "hello"),
            ],
            message: "which color?".to_string(),
        };
        let payload = GeminiService::build_chat_payload(&request)?;
        assert_eq!(
            payload["systemInstruction"],
            json!({"parts": [{"text": "Be brief."}]})
        );
        let contents = payload["contents"].as_array().cloned().unwrap_or_default();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], json!("model"));
        assert_eq!(
            contents[2],
            json!({"role": "user", "parts": [{"text": "which color?"}]})
        );
        Ok(())
    }

    #[test]
    fn chat_payload_skips_blank_system_instruction() -> anyhow::Result<()> {
        let request = ChatRequest {
            model: "gemini-2.5-flash".to_string(),
            system_instruction: Some("  ".to_string()),
            history: Vec::new(),
            message: "hi".to_string(),
        };
        let payload = GeminiService::build_chat_payload(&request)?;
        assert!(payload.get("systemInstruction").is_none());
        Ok(())
    }

    #[test]
    fn parse_reply_reads_first_candidate_parts() {
        let payload = json!({
            "candidates": [
                {"content": {"parts": [
                    {"text": "Here you go."},
                    {"inlineData": {"mimeType": "image/png", "data": "Zmlyc3Q="}},
                    {"inline_data": {"mime_type": "image/jpeg", "data": "c2Vjb25k"}},
                    {"inlineData": {"mimeType": "image/png", "data": ""}},
                ]}},
                {"content": {"parts": [{"text": "ignored candidate"}]}},
            ]
        });
        let reply = GeminiService::parse_reply(&payload);
        assert_eq!(reply.parts.len(), 3);
        assert_eq!(
            reply.first_image().map(|image| image.data.as_str()),
            Some("Zmlyc3Q=")
        );
        assert_eq!(reply.text().as_deref(), Some("Here you go."));
    }

    #[test]
    fn parse_reply_tolerates_blocked_or_empty_payloads() {
        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let reply = GeminiService::parse_reply(&blocked);
        assert!(reply.parts.is_empty());
        assert!(reply.first_image().is_none());
        assert!(reply.text().is_none());
    }

    #[test]
    fn missing_api_key_fails_before_network() {
        let service = service_for_test(None, "https://example.test/v1beta");
        let err = service
            .chat(&ChatRequest {
                model: "gemini-2.5-flash".to_string(),
                system_instruction: None,
                history: Vec::new(),
                message: "hi".to_string(),
            })
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(err, "GEMINI_API_KEY or GOOGLE_API_KEY not set");
    }

    #[test]
    fn error_chain_text_preserves_nested_contexts() {
        let err = anyhow::anyhow!("connection refused")
            .context("Gemini request failed (https://example.test)")
            .context("background replacement failed");
        let rendered = error_chain_text(&err, 400);
        assert!(rendered.contains("background replacement failed"));
        assert!(rendered.contains("Gemini request failed"));
        assert!(rendered.contains("connection refused"));
        assert!(error_chain_text(&err, 10).ends_with('…'));
    }

    #[test]
    fn error_status_surfaces_gemini_message() {
        let body = r#"{"error": {"code": 400, "message": "Image too large."}}"#;
        let err = interpret_reply(400, body).err().map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("Gemini returned HTTP 400: Image too large."));

        let plain = interpret_reply(502, " upstream down ").err().map(|err| err.to_string());
        assert_eq!(plain.as_deref(), Some("Gemini returned HTTP 502: upstream down"));
        assert!(interpret_reply(200, "not json").is_err());
    }

    #[test]
    fn success_status_parses_body() -> anyhow::Result<()> {
        let value = interpret_reply(200, r#"{"candidates": []}"#)?;
        assert_eq!(value, json!({"candidates": []}));
        Ok(())
    }

    #[test]
    fn redaction_scrubs_every_level_of_the_chain() {
        let err = anyhow::anyhow!("request to https://host/x?key=abc123secret failed")
            .context("outer mentions abc123secret too");
        let scrubbed = format!("{:#}", redact_secret(err, "abc123secret"));
        assert!(!scrubbed.contains("abc123secret"));
        assert_eq!(scrubbed.matches("<redacted>").count(), 2);

        let untouched = redact_secret(anyhow::anyhow!("timeout"), "abc123secret");
        assert_eq!(untouched.to_string(), "timeout");
    }

    #[test]
    fn transport_failure_never_mentions_api_key() {
        let secret = "retouch-test-key-5f3a9c";
        let service = service_for_test(Some(secret), "http://127.0.0.1:1/v1beta");
        let request = ContentRequest {
            model: "gemini-2.5-flash-image".to_string(),
            inline_image: None,
            instruction: "enhance".to_string(),
            aspect_ratio: None,
        };
        let Err(err) = service.generate(&request) else {
            panic!("nothing should listen on port 1");
        };
        assert!(!format!("{err:#}").contains(secret));
        assert!(!format!("{err:?}").contains(secret));
        assert!(!error_chain_text(&err, 2000).contains(secret));
    }
}
