use anyhow::{Context as _, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::llm::{
    ChatProvider, Content, Embedder, ModelReply, Part, ProviderError, Role, ToolDeclaration,
};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ── Gemini request/response wire shapes ──

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Serialize, Deserialize, Default)]
struct WireContent {
    role: String,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Serialize, Deserialize, Default)]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(rename = "functionResponse", skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
    #[serde(rename = "thoughtSignature", skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<WireFunctionDeclaration>,
}

#[derive(Serialize)]
struct WireFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Deserialize)]
struct WireCandidate {
    content: Option<WireContent>,
}

#[derive(Serialize)]
struct EmbedRequest {
    content: WireContent,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: WireEmbedding,
}

#[derive(Deserialize)]
struct WireEmbedding {
    values: Vec<f32>,
}

// ── Part mapping ──

/// A `Signature` part annotates the part immediately before it, so on the
/// wire it folds into that part's `thoughtSignature` field.
fn parts_to_wire(parts: &[Part]) -> Vec<WirePart> {
    let mut out: Vec<WirePart> = Vec::new();
    for part in parts {
        match part {
            Part::Text(text) => out.push(WirePart {
                text: Some(text.clone()),
                ..Default::default()
            }),
            Part::ToolCall { name, args } => out.push(WirePart {
                function_call: Some(WireFunctionCall {
                    name: name.clone(),
                    args: args.clone(),
                }),
                ..Default::default()
            }),
            Part::ToolResult { name, response } => out.push(WirePart {
                function_response: Some(WireFunctionResponse {
                    name: name.clone(),
                    response: response.clone(),
                }),
                ..Default::default()
            }),
            Part::Signature(bytes) => {
                if let Some(last) = out.last_mut() {
                    last.thought_signature = Some(BASE64.encode(bytes));
                }
            }
        }
    }
    out
}

fn wire_to_parts(wire: Vec<WirePart>) -> Vec<Part> {
    let mut out = Vec::new();
    for part in wire {
        if let Some(text) = part.text
            && !text.is_empty()
        {
            out.push(Part::Text(text));
        }
        if let Some(call) = part.function_call {
            out.push(Part::ToolCall {
                name: call.name,
                args: call.args,
            });
        }
        if let Some(resp) = part.function_response {
            out.push(Part::ToolResult {
                name: resp.name,
                response: resp.response,
            });
        }
        if let Some(sig) = part.thought_signature
            && let Ok(bytes) = BASE64.decode(&sig)
        {
            out.push(Part::Signature(bytes));
        }
    }
    out
}

fn transcript_to_wire(transcript: &[Content]) -> Vec<WireContent> {
    transcript
        .iter()
        .map(|entry| WireContent {
            role: entry.role.as_str().to_string(),
            parts: parts_to_wire(&entry.parts),
        })
        .collect()
}

// ── Provider ──

pub struct GoogleProvider {
    api_key: String,
    client: Client,
}

impl GoogleProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .context("GEMINI_API_KEY is not set")?;
        Ok(Self::new(api_key))
    }

    async fn post_json<Req: Serialize, Res: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &Req,
    ) -> Result<Res, ProviderError> {
        let res = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: res.text().await.unwrap_or_default(),
            });
        }
        Ok(res.json().await?)
    }
}

#[async_trait]
impl ChatProvider for GoogleProvider {
    async fn generate(
        &self,
        model: &str,
        transcript: &[Content],
        tools: &[ToolDeclaration],
    ) -> Result<ModelReply, ProviderError> {
        let req = GenerateRequest {
            contents: transcript_to_wire(transcript),
            tools: if tools.is_empty() {
                None
            } else {
                Some(vec![WireTool {
                    function_declarations: tools
                        .iter()
                        .map(|t| WireFunctionDeclaration {
                            name: t.name.to_string(),
                            description: t.description.clone(),
                            parameters: t.parameters.clone(),
                        })
                        .collect(),
                }])
            },
        };

        let url = format!("{}/models/{}:generateContent", BASE_URL, model);
        let parsed: GenerateResponse = self.post_json(&url, &req).await?;

        let parts = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| wire_to_parts(c.parts))
            .unwrap_or_default();

        Ok(ModelReply { parts })
    }
}

#[async_trait]
impl Embedder for GoogleProvider {
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ProviderError> {
        let req = EmbedRequest {
            content: WireContent {
                role: Role::User.as_str().to_string(),
                parts: vec![WirePart {
                    text: Some(text.to_string()),
                    ..Default::default()
                }],
            },
        };

        let url = format!("{}/models/{}:embedContent", BASE_URL, model);
        let parsed: EmbedResponse = self.post_json(&url, &req).await?;

        if parsed.embedding.values.is_empty() {
            return Err(ProviderError::Payload(
                "embedding response contained no values".to_string(),
            ));
        }
        Ok(parsed.embedding.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signature_part_folds_into_preceding_wire_part() {
        let parts = vec![
            Part::ToolCall {
                name: "task.manage".to_string(),
                args: json!({"action": "list"}),
            },
            Part::Signature(b"sig-bytes".to_vec()),
        ];
        let wire = parts_to_wire(&parts);
        assert_eq!(wire.len(), 1);
        assert_eq!(
            wire[0].thought_signature.as_deref(),
            Some(BASE64.encode(b"sig-bytes").as_str())
        );
        assert!(wire[0].function_call.is_some());
    }

    #[test]
    fn wire_part_with_signature_yields_trailing_signature_part() {
        let wire = vec![WirePart {
            function_call: Some(WireFunctionCall {
                name: "task.manage".to_string(),
                args: json!({"action": "create", "title": "x"}),
            }),
            thought_signature: Some(BASE64.encode(b"opaque")),
            ..Default::default()
        }];
        let parts = wire_to_parts(wire);
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], Part::ToolCall { name, .. } if name == "task.manage"));
        assert_eq!(parts[1], Part::Signature(b"opaque".to_vec()));
    }

    #[test]
    fn empty_text_wire_parts_are_dropped() {
        let wire = vec![WirePart {
            text: Some(String::new()),
            ..Default::default()
        }];
        assert!(wire_to_parts(wire).is_empty());
    }

    #[test]
    fn transcript_roles_map_to_wire_names() {
        let transcript = vec![
            Content::user(vec![Part::Text("hi".into())]),
            Content::model(vec![Part::Text("hello".into())]),
            Content::tool(vec![Part::ToolResult {
                name: "task.manage".to_string(),
                response: json!({"ok": true}),
            }]),
        ];
        let wire = transcript_to_wire(&transcript);
        let roles: Vec<&str> = wire.iter().map(|c| c.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "model", "tool"]);
    }
}
