//! Holistic market summary over a sample of postings.

use tracing::{info, instrument, warn};

use jobagent_shared::Posting;

use crate::llm::{GenerationRequest, TextGenerator};
use crate::prompts;

/// Placeholder used whenever the summary cannot be generated.
pub const SUMMARY_UNAVAILABLE: &str = "今日市场总结暂不可用（文本生成服务未返回结果）。";

/// Summarize the first `sample_size` postings. Never fails: any service
/// error yields [`SUMMARY_UNAVAILABLE`].
#[instrument(skip_all, fields(postings = postings.len(), sample_size))]
pub async fn summarize(
    generator: &dyn TextGenerator,
    postings: &[Posting],
    sample_size: usize,
    temperature: f32,
) -> String {
    let sample = &postings[..postings.len().min(sample_size)];
    if sample.is_empty() {
        return SUMMARY_UNAVAILABLE.to_string();
    }

    let request = GenerationRequest {
        system: prompts::SUMMARY_SYSTEM.to_string(),
        user: prompts::summary_prompt(sample),
        json: false,
        temperature,
    };

    match generator.generate(&request).await {
        Ok(text) if !text.trim().is_empty() => {
            info!(sampled = sample.len(), chars = text.len(), "market summary generated");
            text.trim().to_string()
        }
        Ok(_) => {
            warn!("market summary was empty, using fallback");
            SUMMARY_UNAVAILABLE.to_string()
        }
        Err(e) => {
            warn!(error = %e, "market summary failed, using fallback");
            SUMMARY_UNAVAILABLE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use jobagent_shared::{JobAgentError, Result};

    use crate::matcher::tests::posting;

    struct Canned {
        reply: Option<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.user.clone());
            self.reply
                .map(String::from)
                .ok_or_else(|| JobAgentError::Llm("timeout".into()))
        }
    }

    fn canned(reply: Option<&'static str>) -> Canned {
        Canned {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn returns_trimmed_text() {
        let generator = canned(Some("  Demand for Rust is rising.\n"));
        let postings = vec![posting("Rust Dev")];
        let text = summarize(&generator, &postings, 100, 0.3).await;
        assert_eq!(text, "Demand for Rust is rising.");
    }

    #[tokio::test]
    async fn failure_uses_fallback() {
        let generator = canned(None);
        let text = summarize(&generator, &[posting("A")], 100, 0.3).await;
        assert_eq!(text, SUMMARY_UNAVAILABLE);
    }

    #[tokio::test]
    async fn samples_only_first_n() {
        let generator = canned(Some("ok"));
        let postings: Vec<Posting> = (0..5).map(|i| posting(&format!("job {i}"))).collect();
        summarize(&generator, &postings, 2, 0.3).await;

        let seen = generator.seen.lock().unwrap();
        assert!(seen[0].contains("job 1"));
        assert!(!seen[0].contains("job 2"));
    }

    #[tokio::test]
    async fn empty_input_skips_request() {
        let generator = canned(Some("unused"));
        let text = summarize(&generator, &[], 100, 0.3).await;
        assert_eq!(text, SUMMARY_UNAVAILABLE);
        assert!(generator.seen.lock().unwrap().is_empty());
    }
}
