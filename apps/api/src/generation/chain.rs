//! Generation chain: turns extracted résumé text into LaTeX.
//!
//! Flow: primary credentials (rotating on rate limits) → secondary provider →
//! deterministic fallback document. Every candidate is fence-stripped,
//! extracted, sanitized and validated before it is accepted. `generate` never
//! fails: the worst case is the fallback document.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::generation::prompts::build_generation_prompt;
use crate::latex::sanitizer::{extract_latex_document, sanitize_latex, strip_markdown_fences};
use crate::latex::template::fallback_document;
use crate::llm_client::prompts::LATEX_ONLY_SYSTEM;
use crate::llm_client::CompletionProvider;

static COMPLETE_DOCUMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\\documentclass[\s\S]*\\end\{document\}\s*$")
        .expect("Invalid complete document regex")
});

/// Which stage of the chain produced the LaTeX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Primary,
    Secondary,
    Fallback,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Primary => "primary",
            Provider::Secondary => "secondary",
            Provider::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub latex: String,
    pub provider: Provider,
}

/// Ordered provider chain. `primary` holds one provider per credential, in
/// priority order; an empty list means the primary provider is unconfigured.
#[derive(Clone, Default)]
pub struct GenerationChain {
    primary: Vec<Arc<dyn CompletionProvider>>,
    secondary: Option<Arc<dyn CompletionProvider>>,
}

impl GenerationChain {
    pub fn new(
        primary: Vec<Arc<dyn CompletionProvider>>,
        secondary: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        Self { primary, secondary }
    }

    pub fn primary_credentials(&self) -> usize {
        self.primary.len()
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    pub async fn generate(&self, source_text: &str) -> GenerationResult {
        let prompt = build_generation_prompt(source_text);

        if let Some(latex) = self.try_primary(&prompt).await {
            info!("Resume LaTeX supplied by primary provider");
            return GenerationResult {
                latex,
                provider: Provider::Primary,
            };
        }

        if let Some(secondary) = &self.secondary {
            if let Some(latex) = try_provider(secondary.as_ref(), &prompt).await {
                info!("Resume LaTeX supplied by secondary provider");
                return GenerationResult {
                    latex,
                    provider: Provider::Secondary,
                };
            }
        }

        info!("Resume LaTeX supplied by fallback template");
        GenerationResult {
            latex: fallback_document(source_text),
            provider: Provider::Fallback,
        }
    }

    /// Walks the primary credentials. Rate-limit errors rotate to the next
    /// credential; any other error, or an invalid candidate, ends the primary stage.
    async fn try_primary(&self, prompt: &str) -> Option<String> {
        let total = self.primary.len();
        for (index, credential) in self.primary.iter().enumerate() {
            match credential.complete(LATEX_ONLY_SYSTEM, prompt).await {
                Ok(raw) => return accept_candidate(credential.label(), &raw),
                Err(e) if e.is_rate_limited() => {
                    warn!(
                        "{} credential {}/{} rate limited, rotating: {e}",
                        credential.label(),
                        index + 1,
                        total
                    );
                }
                Err(e) => {
                    warn!("{} failed, moving to next provider: {e}", credential.label());
                    return None;
                }
            }
        }
        None
    }
}

async fn try_provider(provider: &dyn CompletionProvider, prompt: &str) -> Option<String> {
    match provider.complete(LATEX_ONLY_SYSTEM, prompt).await {
        Ok(raw) => accept_candidate(provider.label(), &raw),
        Err(e) => {
            warn!("{} failed, moving to next provider: {e}", provider.label());
            None
        }
    }
}

fn accept_candidate(label: &str, raw: &str) -> Option<String> {
    let candidate = clean_candidate(raw);
    if candidate.is_none() {
        warn!(
            "{label} returned output that is not a complete LaTeX document ({} chars), discarding",
            raw.len()
        );
    }
    candidate
}

/// Strips fences, extracts the document span, sanitizes, and keeps the result
/// only if it is a whole `\documentclass ... \end{document}` document.
pub fn clean_candidate(raw: &str) -> Option<String> {
    let stripped = strip_markdown_fences(raw);
    let sanitized = sanitize_latex(extract_latex_document(&stripped));
    COMPLETE_DOCUMENT
        .is_match(&sanitized)
        .then_some(sanitized)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::llm_client::LlmError;

    const VALID: &str = r"\documentclass{article}\begin{document}Jane\end{document}";

    enum Reply {
        Text(&'static str),
        Status(u16),
    }

    struct FakeProvider {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionProvider for FakeProvider {
        fn label(&self) -> &str {
            "fake"
        }

        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, LlmError> {
            assert!(prompt.contains("RESUME TEXT"));
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Status(status) => Err(LlmError::Api {
                    status: *status,
                    message: "fake failure".to_string(),
                }),
            }
        }
    }

    fn as_dyn(p: &Arc<FakeProvider>) -> Arc<dyn CompletionProvider> {
        p.clone()
    }

    #[tokio::test]
    async fn test_unconfigured_chain_uses_fallback() {
        let result = GenerationChain::default().generate("Jane Doe, Engineer").await;
        assert_eq!(result.provider, Provider::Fallback);
        assert!(Regex::new(r"\\documentclass[\s\S]*\\end\{document\}")
            .unwrap()
            .is_match(&result.latex));
        assert!(result.latex.contains("Jane Doe, Engineer"));
    }

    #[tokio::test]
    async fn test_all_providers_failing_uses_fallback() {
        let first = FakeProvider::new(Reply::Status(429));
        let second = FakeProvider::new(Reply::Status(500));
        let secondary = FakeProvider::new(Reply::Text("Sorry, I cannot help with that."));
        let chain = GenerationChain::new(
            vec![as_dyn(&first), as_dyn(&second)],
            Some(as_dyn(&secondary)),
        );

        let result = chain.generate("Jane Doe, Engineer").await;

        assert_eq!(result.provider, Provider::Fallback);
        assert!(COMPLETE_DOCUMENT.is_match(&result.latex));
        assert_eq!((first.calls(), second.calls(), secondary.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_rate_limited_credential_rotates_to_next() {
        let limited = FakeProvider::new(Reply::Status(429));
        let healthy = FakeProvider::new(Reply::Text(VALID));
        let secondary = FakeProvider::new(Reply::Text(VALID));
        let chain = GenerationChain::new(
            vec![as_dyn(&limited), as_dyn(&healthy)],
            Some(as_dyn(&secondary)),
        );

        let result = chain.generate("Jane").await;

        assert_eq!(result.provider, Provider::Primary);
        assert_eq!(result.latex, VALID);
        assert_eq!(limited.calls(), 1);
        assert_eq!(healthy.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_payload_too_large_also_rotates() {
        let too_large = FakeProvider::new(Reply::Status(413));
        let healthy = FakeProvider::new(Reply::Text(VALID));
        let chain = GenerationChain::new(vec![as_dyn(&too_large), as_dyn(&healthy)], None);
        assert_eq!(chain.generate("Jane").await.provider, Provider::Primary);
    }

    #[tokio::test]
    async fn test_other_error_skips_remaining_credentials() {
        let unauthorized = FakeProvider::new(Reply::Status(401));
        let unused = FakeProvider::new(Reply::Text(VALID));
        let secondary = FakeProvider::new(Reply::Text(VALID));
        let chain = GenerationChain::new(
            vec![as_dyn(&unauthorized), as_dyn(&unused)],
            Some(as_dyn(&secondary)),
        );

        let result = chain.generate("Jane").await;

        assert_eq!(result.provider, Provider::Secondary);
        assert_eq!(unused.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_candidate_moves_to_next_provider() {
        let chatty = FakeProvider::new(Reply::Text("Here is your resume: \\section{A}"));
        let unused = FakeProvider::new(Reply::Text(VALID));
        let secondary = FakeProvider::new(Reply::Text(VALID));
        let chain = GenerationChain::new(
            vec![as_dyn(&chatty), as_dyn(&unused)],
            Some(as_dyn(&secondary)),
        );

        let result = chain.generate("Jane").await;

        assert_eq!(result.provider, Provider::Secondary);
        assert_eq!(unused.calls(), 0);
    }

    #[tokio::test]
    async fn test_fenced_candidate_is_cleaned_and_accepted() {
        let fenced = FakeProvider::new(Reply::Text(
            "Sure!\n```latex\n\\documentclass{article}\n\\begin{document}\n\\begin{itemize}\n\\item A\n\\end{document}.\n```",
        ));
        let chain = GenerationChain::new(vec![as_dyn(&fenced)], None);

        let result = chain.generate("Jane").await;

        assert_eq!(result.provider, Provider::Primary);
        assert_eq!(
            result.latex,
            "\\documentclass{article}\n\\begin{document}\n\\begin{itemize}\n\\item A\n\\end{itemize}\n\\end{document}"
        );
    }

    #[test]
    fn test_clean_candidate_rejects_partial_documents() {
        assert!(clean_candidate(r"\begin{document}x\end{document}").is_none());
        assert!(clean_candidate(r"\documentclass{article}\begin{document}x").is_none());
        assert!(clean_candidate("").is_none());
        assert!(clean_candidate(VALID).is_some());
    }

    #[test]
    fn test_provider_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Provider::Secondary).unwrap(), "secondary");
        assert_eq!(Provider::Fallback.as_str(), "fallback");
    }
}
