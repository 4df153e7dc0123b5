//! Generator seam and post-processing of raw model output.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Task;

/// Errors a generator may report for a single request.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The backend rejects a temperature parameter; callers retry without one.
    #[error("generator does not accept a temperature parameter")]
    TemperatureUnsupported,

    #[error("generation request failed: {0}")]
    Request(String),

    #[error("malformed generator response: {0}")]
    Malformed(String),
}

/// Raw generator output.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub code: String,
    /// Time reported by the backend, in seconds. Zero when the backend
    /// does not time itself; the controller then measures wall time.
    pub elapsed_secs: f64,
}

/// Produces HDL source text from a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Stable identity, used in cache keys and result records.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        temperature: Option<f32>,
    ) -> Result<Generation, GeneratorError>;
}

/// Generate with `temperature`, retrying once without it when the backend
/// does not support the parameter.
pub async fn generate_with_fallback(
    generator: &dyn Generator,
    prompt: &str,
    temperature: Option<f32>,
) -> Result<Generation, GeneratorError> {
    match generator.generate(prompt, temperature).await {
        Err(GeneratorError::TemperatureUnsupported) if temperature.is_some() => {
            tracing::debug!(generator = generator.name(), "retrying without temperature");
            generator.generate(prompt, None).await
        }
        other => other,
    }
}

/// Pure transformation applied to generated text before verification.
pub trait PostProcess: Send + Sync {
    fn apply(&self, code: &str, task: &Task) -> String;
}

impl<F> PostProcess for F
where
    F: Fn(&str, &Task) -> String + Send + Sync,
{
    fn apply(&self, code: &str, task: &Task) -> String {
        self(code, task)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl PostProcess for Passthrough {
    fn apply(&self, code: &str, _task: &Task) -> String {
        code.to_string()
    }
}

/// Keeps only the first `module ... endmodule` span.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractModule;

impl PostProcess for ExtractModule {
    fn apply(&self, code: &str, _task: &Task) -> String {
        extract_module(code)
    }
}

/// Strip markdown fences and prose around the first module declaration.
///
/// Text without a `module` keyword is returned trimmed, fences removed.
pub fn extract_module(text: &str) -> String {
    let unfenced: String = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let Some(start) = find_keyword(&unfenced, "module") else {
        return unfenced.trim().to_string();
    };
    let body = &unfenced[start..];
    match body.find("endmodule") {
        Some(end) => body[..end + "endmodule".len()].trim().to_string(),
        None => body.trim().to_string(),
    }
}

/// Byte offset of `word` where it is not part of a longer identifier.
fn find_keyword(text: &str, word: &str) -> Option<usize> {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut from = 0;
    while let Some(rel) = text[from..].find(word) {
        let at = from + rel;
        let before_ok = text[..at].chars().next_back().map_or(true, |c| !is_ident(c));
        let after_ok = text[at + word.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_ident(c));
        if before_ok && after_ok {
            return Some(at);
        }
        from = at + word.len();
    }
    None
}
