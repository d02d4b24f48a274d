//! Deterministic fallback renderer
//!
//! Used when no provider is configured, and as the degradation path when a
//! configured provider call fails. No network; interpolates the supplied
//! context into a fixed template so the flow can always terminate with a
//! usable (if low-quality) report.

use async_trait::async_trait;

use crate::error::Result;
use crate::llm::ReportGenerator;
use crate::models::ReportContext;

pub struct FallbackRenderer;

#[async_trait]
impl ReportGenerator for FallbackRenderer {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn generate_report(&self, context: &ReportContext) -> Result<String> {
        Ok(render(context))
    }
}

/// Render the template; always non-empty, always contains the queried name
pub fn render(context: &ReportContext) -> String {
    let mut details: Vec<(&String, &String)> = context.details.iter().collect();
    details.sort();

    let mut out = String::new();
    out.push_str(&format!("# Report: {}\n\n", context.query_name));
    if !context.query_hints.trim().is_empty() {
        out.push_str(&format!("Hints: {}\n\n", context.query_hints));
    }
    out.push_str("## Confirmed match\n");
    out.push_str(&format!("- Title: {}\n", context.candidate.title));
    out.push_str(&format!("- Link: {}\n", context.candidate.url));
    if !context.candidate.snippet.is_empty() {
        out.push_str(&format!("- Summary: {}\n", context.candidate.snippet));
    }

    if !details.is_empty() {
        out.push_str("\n## Collected details\n");
        for (key, value) in details {
            out.push_str(&format!("- {}: {}\n", key, value));
        }
    }

    out.push_str(
        "\n---\nGenerated without a language model. Configure an LLM provider \
         for a narrative report.\n",
    );
    out
}
