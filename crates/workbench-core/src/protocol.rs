//! Request / response protocol between editors and the language service.
//!
//! The shapes here are transport independent: the service crate frames them as JSON, in-process
//! callers pass them around directly.

use crate::identity::{EndPointIdentity, LanguageIdentity};
use crate::issues::LanguageIssue;
use crate::options::{EditorOptions, ProcessOptions};
use crate::processor::{Asm, CompletionItem, Matchable, ParseTree, StyleModel};
use crate::token::AglToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, mpsc};

/// Status of a response or stage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// The stage started.
    Start,
    /// The stage completed.
    Success,
    /// The stage failed; issues explain why.
    Failure,
    /// The endpoint is not interested in the stage. Not an error.
    Skipped,
}

/// A pipeline stage that reports START / SUCCESS / FAILURE / SKIPPED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    /// Scan and parse.
    Parse,
    /// Parse tree to ASM.
    SyntaxAnalysis,
    /// ASM checks.
    SemanticAnalysis,
}

impl Stage {
    /// Human-readable name used in messages.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Parse => "Parse",
            Stage::SyntaxAnalysis => "SyntaxAnalysis",
            Stage::SemanticAnalysis => "SemanticAnalysis",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The payload of a successful stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum StagePayload {
    /// Parse tree.
    Parse(Arc<ParseTree>),
    /// ASM after syntax analysis.
    Syntax(Arc<Asm>),
    /// ASM after semantic analysis.
    Semantic(Arc<Asm>),
}

/// One event of one stage of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEvent {
    /// The stage.
    pub stage: Stage,
    /// Event status.
    pub status: EventStatus,
    /// Human-readable message.
    pub message: String,
    /// Issues found by the stage.
    pub issues: Vec<LanguageIssue>,
    /// Stage result, when the endpoint asked for it.
    pub payload: Option<StagePayload>,
}

impl PipelineEvent {
    /// A START event.
    pub fn start(stage: Stage) -> Self {
        Self::new(stage, EventStatus::Start, "Start")
    }

    /// An event without issues or payload.
    pub fn new(stage: Stage, status: EventStatus, message: impl Into<String>) -> Self {
        Self {
            stage,
            status,
            message: message.into(),
            issues: Vec::new(),
            payload: None,
        }
    }

    /// Attach issues.
    pub fn with_issues(mut self, issues: Vec<LanguageIssue>) -> Self {
        self.issues = issues;
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Option<StagePayload>) -> Self {
        self.payload = payload;
        self
    }

    /// Returns `true` for a configuration skip.
    pub fn is_skip(&self) -> bool {
        self.status == EventStatus::Skipped
    }

    /// Returns `true` for a real failure.
    pub fn is_failure(&self) -> bool {
        self.status == EventStatus::Failure
    }
}

/// Requests accepted by the language service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum LanguageServiceRequest {
    /// Bind an endpoint to a language and (re)define its grammar.
    ProcessorCreate {
        /// Requesting endpoint.
        endpoint: EndPointIdentity,
        /// Language to bind.
        language_id: LanguageIdentity,
        /// Grammar text.
        grammar: String,
        /// Cross-reference text.
        #[serde(default)]
        cross_reference: Option<String>,
        /// Endpoint options.
        #[serde(default)]
        editor_options: EditorOptions,
    },
    /// Close an endpoint.
    ProcessorDelete {
        /// Endpoint to close.
        endpoint: EndPointIdentity,
    },
    /// Set a language's style text.
    SetStyle {
        /// Requesting endpoint.
        endpoint: EndPointIdentity,
        /// Language to style.
        language_id: LanguageIdentity,
        /// Style text.
        style: String,
    },
    /// Cancel the endpoint's in-flight run.
    Interrupt {
        /// Endpoint to interrupt.
        endpoint: EndPointIdentity,
        /// Language of the run.
        language_id: LanguageIdentity,
        /// Why.
        reason: String,
    },
    /// Run the pipeline over a sentence.
    Process {
        /// Requesting endpoint.
        endpoint: EndPointIdentity,
        /// Language of the sentence.
        language_id: LanguageIdentity,
        /// Sentence text.
        text: String,
        /// Request options.
        #[serde(default)]
        options: ProcessOptions,
    },
    /// Ask for completion proposals.
    CodeComplete {
        /// Requesting endpoint.
        endpoint: EndPointIdentity,
        /// Language of the sentence.
        language_id: LanguageIdentity,
        /// Sentence text.
        text: String,
        /// Caret offset in chars.
        position: usize,
        /// Request options.
        #[serde(default)]
        options: ProcessOptions,
    },
}

impl LanguageServiceRequest {
    /// The endpoint the request belongs to.
    pub fn endpoint(&self) -> &EndPointIdentity {
        match self {
            LanguageServiceRequest::ProcessorCreate { endpoint, .. }
            | LanguageServiceRequest::ProcessorDelete { endpoint }
            | LanguageServiceRequest::SetStyle { endpoint, .. }
            | LanguageServiceRequest::Interrupt { endpoint, .. }
            | LanguageServiceRequest::Process { endpoint, .. }
            | LanguageServiceRequest::CodeComplete { endpoint, .. } => endpoint,
        }
    }
}

/// Responses produced by the language service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum LanguageServiceResponse {
    /// Answer to [`LanguageServiceRequest::ProcessorCreate`].
    ProcessorCreate {
        /// Endpoint.
        endpoint: EndPointIdentity,
        /// Outcome.
        status: EventStatus,
        /// Message.
        message: String,
        /// Grammar issues.
        issues: Vec<LanguageIssue>,
        /// Scanner terminals of the new processor.
        matchables: Vec<Matchable>,
    },
    /// Answer to [`LanguageServiceRequest::ProcessorDelete`].
    ProcessorDelete {
        /// Endpoint.
        endpoint: EndPointIdentity,
        /// Outcome.
        status: EventStatus,
        /// Message.
        message: String,
    },
    /// Answer to [`LanguageServiceRequest::SetStyle`].
    SetStyle {
        /// Endpoint.
        endpoint: EndPointIdentity,
        /// Outcome.
        status: EventStatus,
        /// Message.
        message: String,
        /// Style issues.
        issues: Vec<LanguageIssue>,
        /// The compiled style.
        style_model: Option<Arc<StyleModel>>,
    },
    /// A stage event of a [`LanguageServiceRequest::Process`] run.
    Stage {
        /// Endpoint.
        endpoint: EndPointIdentity,
        /// The event.
        event: PipelineEvent,
    },
    /// Highlight tokens for consecutive lines.
    LineTokens {
        /// Endpoint.
        endpoint: EndPointIdentity,
        /// Outcome.
        status: EventStatus,
        /// Message.
        message: String,
        /// First line of `line_tokens`; `None` when skipped.
        start_line: Option<usize>,
        /// Tokens per line.
        line_tokens: Vec<Vec<AglToken>>,
    },
    /// Answer to [`LanguageServiceRequest::CodeComplete`].
    CodeComplete {
        /// Endpoint.
        endpoint: EndPointIdentity,
        /// Outcome.
        status: EventStatus,
        /// Message.
        message: String,
        /// Completion issues.
        issues: Vec<LanguageIssue>,
        /// Proposals.
        items: Vec<CompletionItem>,
    },
}

impl LanguageServiceResponse {
    /// The endpoint the response is routed to.
    pub fn endpoint(&self) -> &EndPointIdentity {
        match self {
            LanguageServiceResponse::ProcessorCreate { endpoint, .. }
            | LanguageServiceResponse::ProcessorDelete { endpoint, .. }
            | LanguageServiceResponse::SetStyle { endpoint, .. }
            | LanguageServiceResponse::Stage { endpoint, .. }
            | LanguageServiceResponse::LineTokens { endpoint, .. }
            | LanguageServiceResponse::CodeComplete { endpoint, .. } => endpoint,
        }
    }

    /// The stage event, for [`LanguageServiceResponse::Stage`].
    pub fn stage_event(&self) -> Option<&PipelineEvent> {
        match self {
            LanguageServiceResponse::Stage { event, .. } => Some(event),
            _ => None,
        }
    }
}

/// Where responses for an endpoint go.
pub trait ResponseSink: Send + Sync {
    /// Deliver a response. Must not block for long.
    fn respond(&self, response: LanguageServiceResponse);
}

impl ResponseSink for mpsc::Sender<LanguageServiceResponse> {
    fn respond(&self, response: LanguageServiceResponse) {
        // A closed receiver means the editor went away.
        let _ = self.send(response);
    }
}

impl<F> ResponseSink for F
where
    F: Fn(LanguageServiceResponse) + Send + Sync,
{
    fn respond(&self, response: LanguageServiceResponse) {
        self(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request: LanguageServiceRequest = serde_json::from_value(json!({
            "type": "Process",
            "endpoint": { "editorId": "e", "sessionId": "s" },
            "languageId": "test.Hello",
            "text": "Hello World",
        }))
        .unwrap();

        match &request {
            LanguageServiceRequest::Process {
                language_id, text, ..
            } => {
                assert_eq!(language_id.as_str(), "test.Hello");
                assert_eq!(text, "Hello World");
            }
            other => panic!("unexpected request {other:?}"),
        }
        assert_eq!(request.endpoint(), &EndPointIdentity::new("e", "s"));
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(EventStatus::Skipped).unwrap(),
            json!("SKIPPED")
        );
        let event = PipelineEvent::new(Stage::Parse, EventStatus::Skipped, "skip");
        assert!(event.is_skip());
        assert!(!event.is_failure());
    }

    #[test]
    fn test_channel_sink() {
        let (tx, rx) = mpsc::channel();
        let sink: Arc<dyn ResponseSink> = Arc::new(tx);
        sink.respond(LanguageServiceResponse::ProcessorDelete {
            endpoint: EndPointIdentity::new("e", "s"),
            status: EventStatus::Success,
            message: "OK".into(),
        });
        assert!(matches!(
            rx.recv().unwrap(),
            LanguageServiceResponse::ProcessorDelete { .. }
        ));
    }
}
