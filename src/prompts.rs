//! Prompt templates for section generation.
//!
//! Templates come from, in order: the `cached_prompts` setting, the remote
//! defaults document (`config/prompts` in the document store), then the
//! built-in set below. A cached entry that fails to parse is deleted and the
//! next source is used. A remote set that loads is written back to the cache.
//! User prompts in settings override the template text either way.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::settings::{SettingsStore, keys};
use crate::store::DocumentStore;

/// Document holding the shared prompt defaults.
pub const REMOTE_DEFAULTS_PATH: &str = "config/prompts";

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are the copywriter for a B2B technology company's marketing website.
Write concise, concrete, benefit-led copy for technical buyers.
Never invent specifications, prices or customer names that are not in the brief or the attached material.";

const DEFAULT_CONTENT_FILLING_PROMPT: &str = "\
Fill the requested page section from the brief and any attached reference material.
Reply with a single JSON object and nothing else: no Markdown, no commentary.";

const DEFAULT_HERO_PROMPT: &str = "\
SECTION: Hero banner
JSON fields: \"headline\" (at most 8 words), \"subheadline\" (one sentence), \
\"ctaText\" (2-4 words), \"ctaLink\" (a relative URL).";

const DEFAULT_FEATURES_PROMPT: &str = "\
SECTION: Feature grid
JSON fields: \"title\", \"subtitle\", and \"features\": an array of 3-6 objects, \
each with \"title\", \"description\" (one sentence) and \"icon\" (one lowercase icon name).";

const DEFAULT_COMPARISON_PROMPT: &str = "\
SECTION: Comparison chart
JSON fields: \"title\", \"columns\" (array of product names, ours first), and \"rows\": \
an array of objects with \"feature\" and \"values\" (one short string per column).";

/// A full set of prompt templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplates {
    pub system: String,
    pub content_filling: String,
    /// Per-section instructions keyed by section type (`hero`, `features`, ...).
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        let sections = [
            ("hero", DEFAULT_HERO_PROMPT),
            ("features", DEFAULT_FEATURES_PROMPT),
            ("comparison", DEFAULT_COMPARISON_PROMPT),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            content_filling: DEFAULT_CONTENT_FILLING_PROMPT.to_string(),
            sections,
        }
    }
}

/// Where the active templates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSource {
    Cache,
    Remote,
    BuiltIn,
}

/// Resolved prompts: templates plus user overrides.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: PromptTemplates,
    source: PromptSource,
    custom_system: Option<String>,
    custom_content_filling: Option<String>,
}

impl PromptLibrary {
    /// Built-in templates with no overrides.
    pub fn built_in() -> Self {
        Self {
            templates: PromptTemplates::default(),
            source: PromptSource::BuiltIn,
            custom_system: None,
            custom_content_filling: None,
        }
    }

    /// Resolve templates and overrides from settings and the document store.
    ///
    /// Never fails: every problem is logged and the next source is tried.
    pub async fn load<S>(settings: &SettingsStore, store: &S) -> Self
    where
        S: DocumentStore + ?Sized,
    {
        let (templates, source) = match settings.get_as::<PromptTemplates>(keys::CACHED_PROMPTS).await {
            Some(Ok(templates)) => (templates, PromptSource::Cache),
            Some(Err(e)) => {
                warn!(error = %e, "Cached prompts are corrupt, discarding");
                if let Err(e) = settings.remove(keys::CACHED_PROMPTS).await {
                    warn!(error = %e, "Failed to remove corrupt prompt cache");
                }
                load_remote(settings, store).await
            }
            None => load_remote(settings, store).await,
        };

        let custom_system = non_empty(settings.get_str(keys::CUSTOM_SYSTEM_PROMPT).await);
        let custom_content_filling = non_empty(settings.get_str(keys::CONTENT_FILLING_PROMPT).await);

        debug!(
            source = ?source,
            custom_system = custom_system.is_some(),
            custom_content_filling = custom_content_filling.is_some(),
            "Prompt library loaded"
        );

        Self {
            templates,
            source,
            custom_system,
            custom_content_filling,
        }
    }

    pub fn source(&self) -> PromptSource {
        self.source
    }

    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    pub fn system_prompt(&self) -> &str {
        self.custom_system
            .as_deref()
            .unwrap_or(&self.templates.system)
    }

    pub fn content_filling_prompt(&self) -> &str {
        self.custom_content_filling
            .as_deref()
            .unwrap_or(&self.templates.content_filling)
    }

    /// Instructions for one section type, if the templates define it.
    pub fn section_prompt(&self, section_type: &str) -> Option<&str> {
        self.templates.sections.get(section_type).map(String::as_str)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

async fn load_remote<S>(settings: &SettingsStore, store: &S) -> (PromptTemplates, PromptSource)
where
    S: DocumentStore + ?Sized,
{
    let doc = match store.get(REMOTE_DEFAULTS_PATH).await {
        Ok(Some(doc)) => doc,
        Ok(None) => {
            debug!("No remote prompt defaults, using built-in prompts");
            return (PromptTemplates::default(), PromptSource::BuiltIn);
        }
        Err(e) => {
            warn!(error = %e, "Failed to fetch remote prompt defaults");
            return (PromptTemplates::default(), PromptSource::BuiltIn);
        }
    };

    match serde_json::from_value::<PromptTemplates>(doc.clone()) {
        Ok(templates) => {
            info!("Loaded prompt defaults from {REMOTE_DEFAULTS_PATH}");
            if let Err(e) = settings.set(keys::CACHED_PROMPTS, doc).await {
                warn!(error = %e, "Failed to cache prompt defaults");
            }
            (templates, PromptSource::Remote)
        }
        Err(e) => {
            warn!(error = %e, "Remote prompt defaults are malformed, using built-in prompts");
            (PromptTemplates::default(), PromptSource::BuiltIn)
        }
    }
}
