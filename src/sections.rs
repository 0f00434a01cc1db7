//! AI generation of page sections.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::attachment::Attachment;
use crate::error::{LlmError, Result};
use crate::llm::{AiGateway, ChatMessage, CompletionRequest, extract_json_object};
use crate::prompts::PromptLibrary;
use crate::store::{DocumentStore, SetOptions};

/// Page block types the generator knows how to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Hero,
    Features,
    Comparison,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hero => "hero",
            Self::Features => "features",
            Self::Comparison => "comparison",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hero" => Some(Self::Hero),
            "features" | "feature-grid" => Some(Self::Features),
            "comparison" | "comparison-chart" => Some(Self::Comparison),
            _ => None,
        }
    }
}

impl std::str::FromStr for SectionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("unknown section kind '{s}' (expected hero, features or comparison)")
        })
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document path of a site.
pub fn site_path(site: &str) -> String {
    format!("sites/{}", site.trim_matches('/'))
}

/// Generates sections through the AI gateway.
pub struct SectionGenerator {
    gateway: Arc<AiGateway>,
    prompts: PromptLibrary,
    temperature: f32,
}

impl SectionGenerator {
    pub fn new(gateway: Arc<AiGateway>, prompts: PromptLibrary) -> Self {
        Self {
            gateway,
            prompts,
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn build_request(
        &self,
        kind: SectionKind,
        brief: &str,
        attachments: Vec<Attachment>,
    ) -> CompletionRequest {
        let mut instructions = self.prompts.content_filling_prompt().to_string();
        if let Some(section) = self.prompts.section_prompt(kind.as_str()) {
            instructions.push_str("\n\n");
            instructions.push_str(section);
        }

        CompletionRequest::new(vec![
            ChatMessage::system(self.prompts.system_prompt()),
            ChatMessage::user(format!("{instructions}\n\nBRIEF:\n{brief}"))
                .with_attachments(attachments),
        ])
        .with_temperature(self.temperature)
        .json()
    }

    /// Generate one section. The reply must contain a JSON object; anything
    /// else is [`LlmError::MalformedJson`] and is not retried.
    pub async fn generate(
        &self,
        kind: SectionKind,
        brief: &str,
        attachments: Vec<Attachment>,
    ) -> std::result::Result<Value, LlmError> {
        let request = self.build_request(kind, brief, attachments);
        let response = self.gateway.generate(request).await?;
        let mut section = extract_json_object(&response.content)?;
        tag_section(&mut section, kind);

        info!(
            kind = %kind,
            id = section["id"].as_str().unwrap_or_default(),
            output_tokens = response.output_tokens,
            "Section generated"
        );
        Ok(section)
    }
}

/// Stamp `type` and a fresh `id` onto a generated section object.
pub fn tag_section(section: &mut Value, kind: SectionKind) {
    if let Value::Object(fields) = section {
        fields.insert("type".to_string(), json!(kind.as_str()));
        fields.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
    }
}

/// Append `section` to the site's `sections` array through a merge write.
///
/// Other top-level fields of the site document are kept. Two concurrent
/// publishes to one site race and the later write wins.
pub async fn publish<S>(store: &S, site: &str, section: Value) -> Result<Value>
where
    S: DocumentStore + ?Sized,
{
    let path = site_path(site);
    let mut sections = store
        .get(&path)
        .await?
        .and_then(|doc| doc.get("sections").and_then(Value::as_array).cloned())
        .unwrap_or_default();
    sections.push(section);

    let count = sections.len();
    let written = store
        .set(&path, json!({ "sections": sections }), SetOptions::merge())
        .await?;
    info!(path = %path, sections = count, "Section published");
    Ok(written)
}
