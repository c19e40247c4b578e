//! The language service: request dispatch and the staged processing pipeline.
//!
//! A `Process` request runs parse, syntax analysis and semantic analysis in order. Every stage
//! first reports START and then exactly one of:
//!
//! - SKIPPED when the endpoint's [`EditorOptions`] say it is not interested,
//! - FAILURE when the stage could not produce a result (syntax errors, a processor error, a
//!   panic, cancellation, or a definition that changed under the run),
//! - SUCCESS, with or without payload depending on the payload interest flags.
//!
//! A stage that does not succeed ends the run. Before parse SUCCESS the parse stage delivers the
//! sentence's tokens as `LineTokens` responses and caches them in the endpoint's tokenizer.
//!
//! Nothing a processor does (error or panic) escapes [`LanguageService::handle`].

use crate::cancel::CancelToken;
use crate::config::ServiceConfig;
use crate::error::{ProcessorError, ProcessorResult, ServiceError};
use crate::identity::{EndPointIdentity, LanguageIdentity};
use crate::issues::LanguageIssue;
use crate::options::{AnalysisContext, ContextSpec, EditorOptions, ProcessOptions};
use crate::processor::{Asm, LanguageProcessor, Leaf, ParseTree, StyleModel};
use crate::protocol::{
    EventStatus, LanguageServiceRequest, LanguageServiceResponse, PipelineEvent, ResponseSink,
    Stage, StagePayload,
};
use crate::registry::{LanguageDefinition, LanguageRegistry};
use crate::sentence::Sentence;
use crate::session::{EndpointSession, RunGuard, Session, SessionRegistry};
use crate::token::{AglToken, LineState};
use crate::tokenizer::{LineScanner, ProcessorLineScanner};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// How a guarded processor call ended without a result.
#[derive(Debug)]
enum StageError {
    Interrupted(String),
    Failed(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Run a processor call, turning errors and panics into a [`StageError`].
fn guarded<T>(label: &str, f: impl FnOnce() -> ProcessorResult<T>) -> Result<T, StageError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(ProcessorError::Interrupted(reason))) => Err(StageError::Interrupted(reason)),
        Ok(Err(err @ ProcessorError::DefinitionChanged(_))) => Err(StageError::Failed(err.to_string())),
        Ok(Err(ProcessorError::Failed(message))) => {
            tracing::error!(stage = label, %message, "processor failed");
            Err(StageError::Failed(format!(
                "Exception during '{label}' - {message}"
            )))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(stage = label, %message, "processor panicked");
            Err(StageError::Failed(format!(
                "Exception during '{label}' - {message}"
            )))
        }
    }
}

/// Scanner used for line requests when the definition has no processor.
struct Unavailable;

impl LineScanner for Unavailable {
    fn scan(&self, _text: &str, _offset: usize) -> ProcessorResult<Vec<Leaf>> {
        Err(ProcessorError::Failed("no processor".to_string()))
    }

    fn to_tokens(&self, _leaves: &[Leaf]) -> Vec<AglToken> {
        Vec::new()
    }
}

/// Multiplexes endpoints over a shared [`LanguageRegistry`].
pub struct LanguageService {
    registry: Arc<LanguageRegistry>,
    sessions: SessionRegistry,
    config: ServiceConfig,
}

impl LanguageService {
    /// Create a service over `registry`.
    pub fn new(registry: Arc<LanguageRegistry>, config: ServiceConfig) -> Self {
        registry.observe(|change| {
            tracing::trace!(
                language = %change.identity,
                kind = ?change.kind,
                revision = change.revision,
                "definition changed, processor will be rebuilt on next use"
            );
        });
        Self {
            sessions: SessionRegistry::new(config.style_class_prefix.clone()),
            registry,
            config,
        }
    }

    /// The shared registry.
    pub fn registry(&self) -> &Arc<LanguageRegistry> {
        &self.registry
    }

    /// The endpoint sessions.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// The configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Route responses for `endpoint` to `sink`, opening a session with default options if
    /// the endpoint is new.
    pub fn add_response_listener(&self, endpoint: &EndPointIdentity, sink: Arc<dyn ResponseSink>) {
        match self.sessions.get(endpoint) {
            Some(entry) => entry.lock().set_sink(Some(sink)),
            None => {
                self.sessions
                    .open(endpoint.clone(), EditorOptions::default(), Some(sink));
            }
        }
    }

    /// Dispatch a request. Every outcome is reported through responses.
    pub fn handle(&self, request: LanguageServiceRequest) {
        match request {
            LanguageServiceRequest::ProcessorCreate {
                endpoint,
                language_id,
                grammar,
                cross_reference,
                editor_options,
            } => self.create_processor(
                &endpoint,
                &language_id,
                &grammar,
                cross_reference.as_deref(),
                editor_options,
            ),
            LanguageServiceRequest::ProcessorDelete { endpoint } => {
                self.delete_processor(&endpoint)
            }
            LanguageServiceRequest::SetStyle {
                endpoint,
                language_id,
                style,
            } => self.set_style(&endpoint, &language_id, &style),
            LanguageServiceRequest::Interrupt {
                endpoint, reason, ..
            } => {
                self.interrupt(&endpoint, &reason);
            }
            LanguageServiceRequest::Process {
                endpoint,
                language_id,
                text,
                options,
            } => {
                if let Err(err) = self.process(&endpoint, &language_id, &text, &options) {
                    self.report_request_error(&endpoint, Stage::Parse, err);
                }
            }
            LanguageServiceRequest::CodeComplete {
                endpoint,
                language_id,
                text,
                position,
                options,
            } => {
                if let Err(err) =
                    self.code_complete(&endpoint, &language_id, &text, position, &options)
                {
                    match self.sessions.get(&endpoint) {
                        Some(entry) => entry.respond(LanguageServiceResponse::CodeComplete {
                            endpoint: endpoint.clone(),
                            status: EventStatus::Failure,
                            message: err.to_string(),
                            issues: Vec::new(),
                            items: Vec::new(),
                        }),
                        None => tracing::error!(endpoint = %endpoint, error = %err, "code completion request dropped"),
                    }
                }
            }
        }
    }

    fn report_request_error(&self, endpoint: &EndPointIdentity, stage: Stage, err: ServiceError) {
        match self.sessions.get(endpoint) {
            Some(entry) => {
                entry.respond(stage_response(endpoint, PipelineEvent::start(stage)));
                entry.respond(stage_response(
                    endpoint,
                    PipelineEvent::new(stage, EventStatus::Failure, err.to_string()),
                ));
            }
            None => tracing::error!(endpoint = %endpoint, error = %err, "request dropped"),
        }
    }

    /// Bind `endpoint` to `language`, set its grammar and report the resulting processor.
    ///
    /// Built-in languages ignore the grammar text. Blank grammar text for any other language
    /// is rejected.
    pub fn create_processor(
        &self,
        endpoint: &EndPointIdentity,
        language: &LanguageIdentity,
        grammar: &str,
        cross_reference: Option<&str>,
        options: EditorOptions,
    ) {
        let entry = self.sessions.open(endpoint.clone(), options, None);
        {
            let mut session = entry.lock();
            session.bind_language(language);
            session.tokenizer_mut().reset();
        }

        let definition = self.registry.find_or_create(language);
        let failure = |message: String, issues: Vec<LanguageIssue>| {
            LanguageServiceResponse::ProcessorCreate {
                endpoint: endpoint.clone(),
                status: EventStatus::Failure,
                message,
                issues,
                matchables: Vec::new(),
            }
        };

        if definition.is_modifiable() {
            if grammar.trim().is_empty() {
                entry.respond(failure(
                    "Cannot create processor if there is no grammar".to_string(),
                    Vec::new(),
                ));
                return;
            }
            let updated = self
                .registry
                .set_grammar(language, grammar)
                .and_then(|_| {
                    self.registry
                        .set_cross_reference(language, cross_reference.unwrap_or(""))
                });
            if let Err(err) = updated {
                entry.respond(failure(err.to_string(), Vec::new()));
                return;
            }
        } else if !grammar.trim().is_empty() {
            tracing::trace!(language = %language, "ignoring grammar text for built-in language");
        }

        let compiled = guarded("ProcessorCreate", || {
            let snapshot = definition.snapshot();
            Ok(snapshot.processor.map(|p| p.matchables()))
        });
        let response = match compiled {
            Ok(Some(matchables)) => {
                tracing::debug!(endpoint = %endpoint, language = %language, "processor created");
                LanguageServiceResponse::ProcessorCreate {
                    endpoint: endpoint.clone(),
                    status: EventStatus::Success,
                    message: "OK".to_string(),
                    issues: definition.issues(),
                    matchables,
                }
            }
            Ok(None) => failure("Error".to_string(), definition.issues()),
            Err(StageError::Failed(message)) | Err(StageError::Interrupted(message)) => {
                failure(self.config.truncate_message(&message), Vec::new())
            }
        };
        entry.respond(response);
    }

    /// Close `endpoint`, interrupting any run.
    pub fn delete_processor(&self, endpoint: &EndPointIdentity) {
        let Some(entry) = self.sessions.get(endpoint) else {
            tracing::warn!(endpoint = %endpoint, "delete requested for unknown endpoint");
            return;
        };
        self.sessions.close(endpoint);
        entry.respond(LanguageServiceResponse::ProcessorDelete {
            endpoint: endpoint.clone(),
            status: EventStatus::Success,
            message: "OK".to_string(),
        });
    }

    /// Set a language's style text and report the compiled style model.
    pub fn set_style(&self, endpoint: &EndPointIdentity, language: &LanguageIdentity, style: &str) {
        let response = |status, message: String, issues, style_model| {
            LanguageServiceResponse::SetStyle {
                endpoint: endpoint.clone(),
                status,
                message,
                issues,
                style_model,
            }
        };

        let outcome = match self.registry.set_style(language, style) {
            Err(err) => response(EventStatus::Failure, err.to_string(), Vec::new(), None),
            Ok(_) => {
                let definition = self.registry.find_or_create(language);
                match guarded("SetStyle", || Ok(definition.style_model())) {
                    Ok(Some(model)) => {
                        if let Some(entry) = self.sessions.get(endpoint) {
                            let mut session = entry.lock();
                            if session.language() == Some(language) {
                                session.style_handler_mut().update_style_model(&model);
                                session.set_style_revision(Some(definition.style_revision()));
                            }
                        }
                        response(
                            EventStatus::Success,
                            "OK".to_string(),
                            definition.style_issues(),
                            Some(model),
                        )
                    }
                    Ok(None) => response(
                        EventStatus::Failure,
                        "Error in style string".to_string(),
                        definition.style_issues(),
                        None,
                    ),
                    Err(StageError::Failed(message)) | Err(StageError::Interrupted(message)) => {
                        response(EventStatus::Failure, message, Vec::new(), None)
                    }
                }
            }
        };

        match self.sessions.get(endpoint) {
            Some(entry) => entry.respond(outcome),
            None => tracing::debug!(endpoint = %endpoint, "style set for endpoint without session"),
        }
    }

    /// Cancel `endpoint`'s in-flight run. Idempotent; returns whether a run was cancelled.
    pub fn interrupt(&self, endpoint: &EndPointIdentity, reason: &str) -> bool {
        self.sessions.interrupt(endpoint, reason)
    }

    /// Run the pipeline over `text` for `endpoint`.
    ///
    /// Returns an error only for an unknown endpoint or language; every other outcome is
    /// reported through the endpoint's responses.
    pub fn process(
        &self,
        endpoint: &EndPointIdentity,
        language: &LanguageIdentity,
        text: &str,
        options: &ProcessOptions,
    ) -> Result<(), ServiceError> {
        let entry = self
            .sessions
            .get(endpoint)
            .ok_or_else(|| ServiceError::UnknownEndpoint(endpoint.clone()))?;
        let definition = self
            .registry
            .find(language)
            .ok_or_else(|| ServiceError::UnknownLanguage(language.clone()))?;
        let guard = self.sessions.begin_run(endpoint)?;

        let editor_options = {
            let mut session = entry.lock();
            session.bind_language(language);
            session.tokenizer_mut().set_accepting_tokens(true);
            *session.options()
        };

        tracing::debug!(
            endpoint = %endpoint,
            language = %language,
            generation = guard.generation(),
            "processing sentence"
        );
        let run = Run {
            service: self,
            endpoint,
            language,
            entry: &entry,
            definition: &definition,
            guard: &guard,
            editor_options,
        };
        run.execute(text, options);
        Ok(())
    }

    /// Ask the processor for completion proposals at `position`.
    pub fn code_complete(
        &self,
        endpoint: &EndPointIdentity,
        language: &LanguageIdentity,
        text: &str,
        position: usize,
        options: &ProcessOptions,
    ) -> Result<(), ServiceError> {
        let entry = self
            .sessions
            .get(endpoint)
            .ok_or_else(|| ServiceError::UnknownEndpoint(endpoint.clone()))?;
        let definition = self
            .registry
            .find(language)
            .ok_or_else(|| ServiceError::UnknownLanguage(language.clone()))?;

        let response = |status, message: String, issues, items| {
            LanguageServiceResponse::CodeComplete {
                endpoint: endpoint.clone(),
                status,
                message,
                issues,
                items,
            }
        };

        let outcome = guarded("CodeComplete", || {
            Ok(definition
                .processor()
                .map(|p| p.expected_items_at(text, position, options)))
        });
        let reply = match outcome {
            Ok(Some(Ok(result))) => {
                response(EventStatus::Success, "OK".to_string(), result.issues, result.items)
            }
            Ok(Some(Err(err))) => response(
                EventStatus::Failure,
                format!("Exception during 'CodeComplete' - {err}"),
                Vec::new(),
                Vec::new(),
            ),
            Ok(None) => response(
                EventStatus::Failure,
                not_ready_message(language),
                definition.issues(),
                Vec::new(),
            ),
            Err(StageError::Failed(message)) | Err(StageError::Interrupted(message)) => {
                response(EventStatus::Failure, message, Vec::new(), Vec::new())
            }
        };
        entry.respond(reply);
        Ok(())
    }

    /// Highlight tokens for the line after `previous`, from the endpoint's cache or by
    /// rescanning that line.
    pub fn line_tokens(
        &self,
        endpoint: &EndPointIdentity,
        line_text: &str,
        previous: &LineState,
    ) -> Result<(LineState, Vec<AglToken>), ServiceError> {
        let entry = self
            .sessions
            .get(endpoint)
            .ok_or_else(|| ServiceError::UnknownEndpoint(endpoint.clone()))?;
        let language = entry.lock().language().cloned();
        let definition = language.as_ref().and_then(|l| self.registry.find(l));
        let processor = definition.as_ref().and_then(|d| d.processor());
        let style_model = definition.as_ref().and_then(|d| d.style_model());
        let style_revision = definition.as_ref().map(|d| d.style_revision());

        let mut session = entry.lock();
        refresh_style(&mut session, style_model.as_deref(), style_revision);
        let session = &*session;
        let result = match processor.as_deref() {
            Some(processor) => {
                let scanner = ProcessorLineScanner::new(processor, session.style_handler());
                session
                    .tokenizer()
                    .get_line_tokens(line_text, previous, &scanner)
            }
            None => session
                .tokenizer()
                .get_line_tokens(line_text, previous, &Unavailable),
        };
        Ok(result)
    }
}

fn stage_response(endpoint: &EndPointIdentity, event: PipelineEvent) -> LanguageServiceResponse {
    LanguageServiceResponse::Stage {
        endpoint: endpoint.clone(),
        event,
    }
}

fn not_ready_message(language: &LanguageIdentity) -> String {
    format!("Language definition '{language}' is not ready")
}

/// Bring the session's style handler up to the definition's style revision.
fn refresh_style(
    session: &mut Session,
    model: Option<&StyleModel>,
    revision: Option<u64>,
) {
    if revision.is_none() || session.style_revision() == revision {
        return;
    }
    if let Some(model) = model {
        session.style_handler_mut().update_style_model(model);
    }
    session.set_style_revision(revision);
}

/// One `Process` request in flight.
struct Run<'a> {
    service: &'a LanguageService,
    endpoint: &'a EndPointIdentity,
    language: &'a LanguageIdentity,
    entry: &'a Arc<EndpointSession>,
    definition: &'a Arc<LanguageDefinition>,
    guard: &'a RunGuard,
    editor_options: EditorOptions,
}

impl Run<'_> {
    fn token(&self) -> &CancelToken {
        self.guard.token()
    }

    fn emit(&self, event: PipelineEvent) {
        tracing::debug!(
            endpoint = %self.endpoint,
            stage = %event.stage,
            status = ?event.status,
            generation = self.guard.generation(),
            "stage event"
        );
        self.entry.respond(stage_response(self.endpoint, event));
    }

    fn fail(&self, stage: Stage, message: impl Into<String>, issues: Vec<LanguageIssue>) {
        let message = self.service.config.truncate_message(&message.into());
        self.emit(PipelineEvent::new(stage, EventStatus::Failure, message).with_issues(issues));
    }

    fn skip(&self, stage: Stage) {
        tracing::trace!(endpoint = %self.endpoint, %stage, "stage skipped");
        self.emit(PipelineEvent::new(
            stage,
            EventStatus::Skipped,
            format!("{stage} interest not registered"),
        ));
    }

    fn succeed(
        &self,
        stage: Stage,
        issues: Vec<LanguageIssue>,
        payload: StagePayload,
        payload_wanted: bool,
    ) {
        let event = if payload_wanted {
            PipelineEvent::new(stage, EventStatus::Success, "Success").with_payload(Some(payload))
        } else {
            PipelineEvent::new(
                stage,
                EventStatus::Success,
                format!("{stage} payload interest not registered"),
            )
        };
        self.emit(event.with_issues(issues));
    }

    fn stage_error(&self, stage: Stage, err: StageError) {
        match err {
            StageError::Interrupted(reason) => {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    %stage,
                    generation = self.guard.generation(),
                    %reason,
                    "run interrupted"
                );
                self.fail(stage, format!("{stage} interrupted: {reason}"), Vec::new());
            }
            StageError::Failed(message) => self.fail(stage, message, Vec::new()),
        }
    }

    /// Cancellation and definition-change checks made before a stage does any work.
    fn preflight(&self, stage: Stage, revision: Option<u64>) -> bool {
        if let Err(ProcessorError::Interrupted(reason)) = self.token().check() {
            self.stage_error(stage, StageError::Interrupted(reason));
            return false;
        }
        if let Some(revision) = revision
            && self.definition.revision() != revision
        {
            tracing::warn!(
                endpoint = %self.endpoint,
                language = %self.language,
                revision,
                "definition changed during run"
            );
            self.fail(
                stage,
                ProcessorError::DefinitionChanged(self.language.clone()).to_string(),
                Vec::new(),
            );
            return false;
        }
        true
    }

    fn execute(&self, text: &str, options: &ProcessOptions) {
        let Some((processor, revision, tree)) = self.parse(text, options) else {
            return;
        };
        let Some(asm) = self.syntax_analysis(&*processor, revision, &tree, options) else {
            return;
        };
        self.semantic_analysis(&*processor, revision, &asm, options);
    }

    fn parse(
        &self,
        text: &str,
        options: &ProcessOptions,
    ) -> Option<(Arc<dyn LanguageProcessor>, u64, Arc<ParseTree>)> {
        let stage = Stage::Parse;
        self.emit(PipelineEvent::start(stage));
        if !self.editor_options.parse {
            self.skip(stage);
            return None;
        }
        if !self.preflight(stage, None) {
            return None;
        }

        let snapshot = match guarded(stage.label(), || Ok(self.definition.snapshot())) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.stage_error(stage, err);
                return None;
            }
        };
        let Some(processor) = snapshot.processor else {
            self.fail(stage, not_ready_message(self.language), self.definition.issues());
            return None;
        };

        let token = self.token();
        let result = match guarded(stage.label(), || processor.parse(text, options, token)) {
            Ok(result) => result,
            Err(err) => {
                self.stage_error(stage, err);
                return None;
            }
        };
        let Some(tree) = result.tree else {
            self.fail(stage, "Parse Failed", result.issues);
            return None;
        };

        self.send_line_tokens(&tree, text);
        self.succeed(
            stage,
            result.issues,
            StagePayload::Parse(tree.clone()),
            self.editor_options.parse_tree,
        );
        Some((processor, snapshot.revision, tree))
    }

    fn send_line_tokens(&self, tree: &ParseTree, text: &str) {
        let line_tokens = |status, message: String, start_line, line_tokens| {
            LanguageServiceResponse::LineTokens {
                endpoint: self.endpoint.clone(),
                status,
                message,
                start_line,
                line_tokens,
            }
        };

        if !self.editor_options.parse_line_tokens {
            self.entry.respond(line_tokens(
                EventStatus::Skipped,
                "ParseLineTokens interest not registered".to_string(),
                None,
                Vec::new(),
            ));
            return;
        }

        let style_model = self.definition.style_model();
        let style_revision = self.definition.style_revision();
        let styled = catch_unwind(AssertUnwindSafe(|| {
            let sentence = Sentence::new(text);
            let by_line = tree.tokens_by_line(&sentence);
            let mut session = self.entry.lock();
            refresh_style(&mut session, style_model.as_deref(), Some(style_revision));
            let tokens: Vec<Vec<AglToken>> = by_line
                .iter()
                .map(|leaves| session.style_handler().transform_to_tokens(leaves))
                .collect();
            session.tokenizer_mut().receive_tokens(0, tokens.clone());
            tokens
        }));

        let tokens = match styled {
            Ok(tokens) => tokens,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(endpoint = %self.endpoint, %message, "line token conversion panicked");
                self.entry.respond(line_tokens(
                    EventStatus::Failure,
                    self.service.config.truncate_message(&message),
                    None,
                    Vec::new(),
                ));
                return;
            }
        };

        let chunk_size = self
            .service
            .config
            .chunk_size(self.editor_options.line_tokens_chunk_size);
        if chunk_size == 0 {
            self.entry.respond(line_tokens(
                EventStatus::Success,
                "Success".to_string(),
                Some(0),
                tokens,
            ));
            return;
        }

        let mut start = 0;
        for chunk in tokens.chunks(chunk_size) {
            self.entry.respond(line_tokens(
                EventStatus::Success,
                "Success".to_string(),
                Some(start),
                chunk.to_vec(),
            ));
            start += chunk.len();
        }
    }

    fn syntax_analysis(
        &self,
        processor: &dyn LanguageProcessor,
        revision: u64,
        tree: &ParseTree,
        options: &ProcessOptions,
    ) -> Option<Arc<Asm>> {
        let stage = Stage::SyntaxAnalysis;
        self.emit(PipelineEvent::start(stage));
        if !self.editor_options.syntax_analysis {
            self.skip(stage);
            return None;
        }
        if !self.preflight(stage, Some(revision)) {
            return None;
        }

        let result = match guarded(stage.label(), || processor.syntax_analysis(tree, options)) {
            Ok(result) => result,
            Err(err) => {
                self.stage_error(stage, err);
                return None;
            }
        };
        let Some(asm) = result.asm else {
            self.fail(stage, "SyntaxAnalysis Failed", result.issues);
            return None;
        };

        self.succeed(
            stage,
            result.issues,
            StagePayload::Syntax(asm.clone()),
            self.editor_options.syntax_analysis_asm,
        );
        Some(asm)
    }

    fn semantic_analysis(
        &self,
        processor: &dyn LanguageProcessor,
        revision: u64,
        asm: &Arc<Asm>,
        options: &ProcessOptions,
    ) {
        let stage = Stage::SemanticAnalysis;
        self.emit(PipelineEvent::start(stage));
        if !self.editor_options.semantic_analysis {
            self.skip(stage);
            return;
        }
        if !self.preflight(stage, Some(revision)) {
            return;
        }

        let context = match self.resolve_context(&options.semantic_context) {
            Ok(context) => context,
            Err(message) => {
                self.fail(stage, message, Vec::new());
                return;
            }
        };

        let token = self.token();
        let result = match guarded(stage.label(), || {
            processor.semantic_analysis(asm, &context, options, token)
        }) {
            Ok(result) => result,
            Err(err) => {
                self.stage_error(stage, err);
                return;
            }
        };

        self.succeed(
            stage,
            result.issues,
            StagePayload::Semantic(asm.clone()),
            self.editor_options.semantic_analysis_asm,
        );
    }

    /// The grammar meta language analyses against the live registry, the cross-reference meta
    /// language against the type model of the referenced language. Everything else gets the
    /// context it was sent.
    fn resolve_context(&self, spec: &ContextSpec) -> Result<AnalysisContext, String> {
        let registry = &self.service.registry;
        match (self.language.as_str(), spec) {
            (LanguageIdentity::GRAMMAR, ContextSpec::None) => {
                Ok(AnalysisContext::Registry(registry.clone()))
            }
            (LanguageIdentity::CROSS_REFERENCE, ContextSpec::TypeModelReference(id)) => {
                let definition = registry
                    .find(id)
                    .ok_or_else(|| format!("Language '{id}' is not defined"))?;
                let processor = definition.processor().ok_or_else(|| not_ready_message(id))?;
                let model = processor
                    .type_model()
                    .ok_or_else(|| format!("Language '{id}' has no type model"))?;
                Ok(AnalysisContext::TypeModel(model))
            }
            (_, ContextSpec::None) => Ok(AnalysisContext::None),
            (_, ContextSpec::Value(value)) => Ok(AnalysisContext::Value(value.clone())),
            (_, ContextSpec::TypeModelReference(id)) => {
                Ok(AnalysisContext::Value(serde_json::Value::String(id.to_string())))
            }
        }
    }
}
