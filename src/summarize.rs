//! Chunked summarization that keeps long attachments inside a token budget.
//!
//! Tokens are estimated at four characters each; there is no tokenizer, so
//! token-dense text can still overshoot a provider's real limit.
//!
//! Each pass splits the text into chunks of at most a quarter of the context
//! window, asks the summarizer to shrink every chunk to its share of the
//! target, and joins the results. Passes repeat until the text fits or the
//! pass limit is reached, after which the text is truncated. A failed chunk
//! call truncates that chunk instead of failing the whole run.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::LlmError;

/// Characters assumed per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Default number of compression passes before falling back to truncation.
pub const DEFAULT_MAX_PASSES: usize = 5;

const CHUNK_SEPARATOR: &str = "\n\n";

/// `ceil(chars / 4)`.
pub fn estimate_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Something that can shrink one chunk of text to roughly `target_chars`.
#[async_trait]
pub trait ChunkSummarizer: Send + Sync {
    async fn summarize_chunk(&self, chunk: &str, target_chars: usize) -> Result<String, LlmError>;
}

/// Budget for one summarization run.
#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub target_tokens: usize,
    pub context_window_tokens: usize,
    pub max_passes: usize,
}

impl SummarizeOptions {
    pub fn new(target_tokens: usize, context_window_tokens: usize) -> Self {
        Self {
            target_tokens,
            context_window_tokens,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    /// Chunk size in characters: a quarter of the context window.
    pub fn chunk_chars(&self) -> usize {
        (self.context_window_tokens / 4).max(1) * CHARS_PER_TOKEN
    }
}

/// Result of [`summarize_to_fit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    /// Compression passes run (0 when the input already fit).
    pub passes: usize,
    /// Whether the final text had to be cut to fit.
    pub truncated: bool,
}

/// Shrink `text` until its estimated token count fits `options.target_tokens`.
pub async fn summarize_to_fit<S>(summarizer: &S, text: &str, options: &SummarizeOptions) -> Summary
where
    S: ChunkSummarizer + ?Sized,
{
    let target_tokens = options.target_tokens;
    if estimate_token_count(text) <= target_tokens {
        return Summary {
            text: text.to_string(),
            passes: 0,
            truncated: false,
        };
    }

    let target_chars = target_tokens * CHARS_PER_TOKEN;
    let chunk_chars = options.chunk_chars();
    let mut current = text.to_string();
    let mut passes = 0;

    while passes < options.max_passes && estimate_token_count(&current) > target_tokens {
        passes += 1;
        let total_chars = current.chars().count();
        let chunks = split_chars(&current, chunk_chars);
        debug!(
            pass = passes,
            chars = total_chars,
            chunks = chunks.len(),
            target_chars,
            "Summarization pass"
        );

        let mut summaries = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let chunk_len = chunk.chars().count();
            let budget = (target_chars * chunk_len / total_chars).max(1);
            let summary = match summarizer.summarize_chunk(chunk, budget).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, budget, "Chunk summary failed, truncating chunk");
                    truncate_chars(chunk, budget)
                }
            };
            summaries.push(summary);
        }

        let next = summaries.join(CHUNK_SEPARATOR);
        if next.chars().count() >= total_chars {
            warn!(pass = passes, "Summarization made no progress");
            break;
        }
        current = next;
    }

    let truncated = estimate_token_count(&current) > target_tokens;
    if truncated {
        current = truncate_chars(&current, target_chars);
    }

    Summary {
        text: current,
        passes,
        truncated,
    }
}

/// Split into pieces of at most `size` characters.
fn split_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size.max(1)).map(|c| c.iter().collect()).collect()
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Keeps the first half of every chunk, ignoring the budget.
    #[derive(Default)]
    struct HalvingSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChunkSummarizer for HalvingSummarizer {
        async fn summarize_chunk(&self, chunk: &str, _target_chars: usize) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let half = chunk.chars().count() / 2;
            Ok(chunk.chars().take(half).collect())
        }
    }

    /// Records budgets and always fails.
    #[derive(Default)]
    struct FailingSummarizer {
        budgets: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ChunkSummarizer for FailingSummarizer {
        async fn summarize_chunk(&self, _chunk: &str, target_chars: usize) -> Result<String, LlmError> {
            self.budgets.lock().unwrap().push(target_chars);
            Err(LlmError::Http {
                provider: "stub".into(),
                status: 500,
                body: "boom".into(),
                retry_after: None,
            })
        }
    }

    /// Returns its input unchanged.
    struct EchoSummarizer;

    #[async_trait]
    impl ChunkSummarizer for EchoSummarizer {
        async fn summarize_chunk(&self, chunk: &str, _target_chars: usize) -> Result<String, LlmError> {
            Ok(chunk.to_string())
        }
    }

    #[test]
    fn token_estimate() {
        assert_eq!(estimate_token_count(""), 0);
        assert_eq!(estimate_token_count("a"), 1);
        assert_eq!(estimate_token_count("abcd"), 1);
        assert_eq!(estimate_token_count("abcde"), 2);
        assert_eq!(estimate_token_count(&"x".repeat(4000)), 1000);
        // Characters, not bytes.
        assert_eq!(estimate_token_count("ééééé"), 2);
    }

    #[test]
    fn chunk_size_is_quarter_window() {
        let opts = SummarizeOptions::new(1000, 8000);
        assert_eq!(opts.chunk_chars(), 8000);
    }

    #[tokio::test]
    async fn text_within_target_is_unchanged() {
        let stub = HalvingSummarizer::default();
        let text = "short brief";
        let summary = summarize_to_fit(&stub, text, &SummarizeOptions::new(100, 8000)).await;
        assert_eq!(summary.text, text);
        assert_eq!(summary.passes, 0);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn halving_converges_within_pass_limit() {
        let stub = HalvingSummarizer::default();
        let text = "lorem ipsum ".repeat(4000); // 48k chars, ~12k tokens
        let opts = SummarizeOptions::new(1000, 8000);

        let summary = summarize_to_fit(&stub, &text, &opts).await;

        assert!(estimate_token_count(&summary.text) <= 1000);
        assert!(summary.passes >= 1 && summary.passes <= DEFAULT_MAX_PASSES);
        assert!(!summary.truncated);
    }

    #[tokio::test]
    async fn failed_chunks_fall_back_to_truncation() {
        let stub = FailingSummarizer::default();
        let text = "y".repeat(20_000);
        let opts = SummarizeOptions::new(500, 8000);

        let summary = summarize_to_fit(&stub, &text, &opts).await;

        assert!(estimate_token_count(&summary.text) <= 500);
        // 20k chars in 8k chunks: 8000, 8000, 4000 sharing a 2000-char target.
        let budgets = stub.budgets.lock().unwrap();
        assert_eq!(budgets[..3], [800, 800, 400]);
    }

    #[tokio::test]
    async fn no_progress_truncates() {
        let text = "z".repeat(10_000);
        let summary = summarize_to_fit(&EchoSummarizer, &text, &SummarizeOptions::new(100, 8000)).await;
        assert_eq!(summary.passes, 1);
        assert!(summary.truncated);
        assert_eq!(summary.text.chars().count(), 400);
    }

    #[test]
    fn split_respects_char_boundaries() {
        let parts = split_chars("ééééé", 2);
        assert_eq!(parts, vec!["éé", "éé", "é"]);
    }
}
