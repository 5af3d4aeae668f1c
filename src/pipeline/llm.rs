//! Reasoning calls: one contract for text-grounded and image-grounded
//! structured extraction.
//!
//! Every stage that needs a model goes through [`ReasoningCapability`]. The
//! production implementation, [`LlmCapability`], wraps an
//! `edgequake_llm::LLMProvider`; tests plug in a scripted fake. The pipeline
//! only ever sees [`request_structured`], which sends a request, cleans the
//! reply, and runs it through the schema gate.
//!
//! ## No retries
//!
//! A failed call is returned as [`DdrError::TransportFailure`] and ends the
//! run. Re-sampling a generative call can ground the same document
//! differently on each attempt, so the provider's own transport retries are
//! the only ones that happen.

use crate::error::{DdrError, Stage};
use crate::output::CallUsage;
use crate::pipeline::response::parse_json_reply;
use crate::prompts::with_document;
use crate::schema::TargetSchema;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

/// The material a reasoning call must ground its answer in.
#[derive(Debug, Clone)]
pub enum Grounding {
    /// Plain document text, sent inline after the prompt.
    Text(String),
    /// Page images, sent in page order as attachments.
    Images(Vec<ImageData>),
}

/// Everything needed for one reasoning call.
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub stage: Stage,
    /// System instructions (grounding rules).
    pub instructions: String,
    /// Task text including the target schema.
    pub prompt: String,
    pub grounding: Grounding,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Raw model reply, before any validation.
#[derive(Debug, Clone, Default)]
pub struct ReasoningReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// The remote capability failed to answer.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// A capability that answers a [`ReasoningRequest`] with raw text.
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    async fn reason(&self, request: &ReasoningRequest) -> Result<ReasoningReply, TransportError>;
}

/// [`ReasoningCapability`] backed by an `edgequake-llm` provider.
pub struct LlmCapability {
    provider: Arc<dyn LLMProvider>,
    timeout_secs: u64,
}

impl LlmCapability {
    pub fn new(provider: Arc<dyn LLMProvider>, timeout_secs: u64) -> Self {
        Self {
            provider,
            timeout_secs,
        }
    }
}

#[async_trait]
impl ReasoningCapability for LlmCapability {
    /// ## Message Layout
    ///
    /// 1. **System message** — the grounding rules for this stage
    /// 2. **User message** — the task and schema, followed by the document
    ///    text (text grounding) or with every page image attached in order
    ///    (image grounding)
    async fn reason(&self, request: &ReasoningRequest) -> Result<ReasoningReply, TransportError> {
        let user = match &request.grounding {
            Grounding::Text(text) => ChatMessage::user(with_document(&request.prompt, text)),
            Grounding::Images(images) => {
                ChatMessage::user_with_images(request.prompt.as_str(), images.clone())
            }
        };
        let messages = vec![ChatMessage::system(request.instructions.as_str()), user];
        let options = build_options(request);

        let response = timeout(
            Duration::from_secs(self.timeout_secs),
            self.provider.chat(&messages, Some(&options)),
        )
        .await
        .map_err(|_| TransportError(format!("timed out after {}s", self.timeout_secs)))?
        .map_err(|e| TransportError(format!("{}", e)))?;

        Ok(ReasoningReply {
            content: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Build `CompletionOptions` from the request's sampling settings.
fn build_options(request: &ReasoningRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        ..Default::default()
    }
}

/// Send `request` and accept the reply only if it validates as `T`.
///
/// Fails closed: a transport error becomes [`DdrError::TransportFailure`],
/// unparseable or non-conforming output becomes
/// [`DdrError::SchemaViolation`]. There is no relaxed second attempt.
pub async fn request_structured<T: TargetSchema>(
    capability: &dyn ReasoningCapability,
    request: &ReasoningRequest,
    ctx: &T::Context,
) -> Result<(T, CallUsage), DdrError> {
    let stage = request.stage;
    let start = Instant::now();
    info!("[{}] requesting {}", stage, T::ENTITY);

    let reply = capability
        .reason(request)
        .await
        .map_err(|e| DdrError::TransportFailure {
            stage,
            detail: e.0,
        })?;

    let duration_ms = start.elapsed().as_millis() as u64;
    debug!(
        "[{}] {} input tokens, {} output tokens, {}ms",
        stage, reply.input_tokens, reply.output_tokens, duration_ms
    );

    let raw = parse_json_reply(&reply.content, T::ENTITY)
        .map_err(|source| DdrError::SchemaViolation { stage, source })?;
    let entity =
        T::validate(&raw, ctx).map_err(|source| DdrError::SchemaViolation { stage, source })?;

    Ok((
        entity,
        CallUsage {
            stage,
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
            duration_ms,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Reconciliation;

    struct Canned(Result<&'static str, &'static str>);

    #[async_trait]
    impl ReasoningCapability for Canned {
        async fn reason(&self, _: &ReasoningRequest) -> Result<ReasoningReply, TransportError> {
            match self.0 {
                Ok(content) => Ok(ReasoningReply {
                    content: content.to_string(),
                    input_tokens: 10,
                    output_tokens: 5,
                }),
                Err(e) => Err(TransportError(e.to_string())),
            }
        }
    }

    fn request() -> ReasoningRequest {
        ReasoningRequest {
            stage: Stage::Synthesis,
            instructions: "rules".into(),
            prompt: "task".into(),
            grounding: Grounding::Text("{}".into()),
            temperature: 0.2,
            max_tokens: 512,
        }
    }

    #[test]
    fn build_options_copies_sampling_settings() {
        let opts = build_options(&request());
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(512));
    }

    #[test]
    fn transport_error_is_stage_tagged() {
        let cap = Canned(Err("connection refused"));
        let err = tokio_test::block_on(request_structured::<Reconciliation>(&cap, &request(), &()))
            .unwrap_err();
        match err {
            DdrError::TransportFailure { stage, detail } => {
                assert_eq!(stage, Stage::Synthesis);
                assert!(detail.contains("refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_json_reply_is_a_schema_violation() {
        let cap = Canned(Ok("I could not find anything."));
        let err = tokio_test::block_on(request_structured::<Reconciliation>(&cap, &request(), &()))
            .unwrap_err();
        assert!(err.is_schema_violation());
    }

    #[test]
    fn valid_reply_reports_usage() {
        let cap = Canned(Ok(r#"{
            "property_issue_summary": "Not Available",
            "areas": [],
            "severity_assessment": "Not Available",
            "recommended_actions": [],
            "additional_notes": "Not Available"
        }"#));
        let (rec, usage) =
            tokio_test::block_on(request_structured::<Reconciliation>(&cap, &request(), &()))
                .expect("valid");
        assert!(rec.areas.is_empty());
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.stage, Stage::Synthesis);
    }
}
