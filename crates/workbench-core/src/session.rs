//! Endpoint sessions.
//!
//! A [`Session`] is the per-endpoint state the pipeline needs between requests: editor options,
//! the language the endpoint is bound to, its tokenizer cache and its style handler. The
//! [`SessionRegistry`] maps [`EndPointIdentity`] values to sessions and tracks the cancel token
//! of each endpoint's in-flight run.
//!
//! The run token lives outside the session lock so an interrupt never waits for a running stage.

use crate::cancel::CancelToken;
use crate::error::ServiceError;
use crate::identity::{EndPointIdentity, LanguageIdentity};
use crate::options::EditorOptions;
use crate::protocol::{LanguageServiceResponse, ResponseSink};
use crate::style::StyleHandler;
use crate::tokenizer::IncrementalTokenizer;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// State kept for one endpoint.
pub struct Session {
    endpoint: EndPointIdentity,
    options: EditorOptions,
    language: Option<LanguageIdentity>,
    tokenizer: IncrementalTokenizer,
    style: StyleHandler,
    style_revision: Option<u64>,
    sink: Option<Arc<dyn ResponseSink>>,
}

impl Session {
    fn new(
        endpoint: EndPointIdentity,
        options: EditorOptions,
        sink: Option<Arc<dyn ResponseSink>>,
        style_prefix: &str,
    ) -> Self {
        Self {
            endpoint,
            options,
            language: None,
            tokenizer: IncrementalTokenizer::new(),
            style: StyleHandler::new(LanguageIdentity::new(""), style_prefix),
            style_revision: None,
            sink,
        }
    }

    /// The endpoint.
    pub fn endpoint(&self) -> &EndPointIdentity {
        &self.endpoint
    }

    /// Current editor options.
    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    /// Replace the editor options.
    pub fn set_options(&mut self, options: EditorOptions) {
        self.options = options;
    }

    /// The bound language, if any.
    pub fn language(&self) -> Option<&LanguageIdentity> {
        self.language.as_ref()
    }

    /// Bind to `language`. Returns `true` if the binding changed, in which case the tokenizer
    /// cache and style classes were reset.
    pub fn bind_language(&mut self, language: &LanguageIdentity) -> bool {
        if self.language.as_ref() == Some(language) {
            return false;
        }
        self.language = Some(language.clone());
        self.tokenizer.reset();
        self.style.rebind(language.clone());
        self.style_revision = None;
        true
    }

    /// The endpoint's tokenizer cache.
    pub fn tokenizer(&self) -> &IncrementalTokenizer {
        &self.tokenizer
    }

    /// Mutable access to the tokenizer cache.
    pub fn tokenizer_mut(&mut self) -> &mut IncrementalTokenizer {
        &mut self.tokenizer
    }

    /// The endpoint's style handler.
    pub fn style_handler(&self) -> &StyleHandler {
        &self.style
    }

    /// Mutable access to the style handler.
    pub fn style_handler_mut(&mut self) -> &mut StyleHandler {
        &mut self.style
    }

    /// Style revision the handler last ingested.
    pub fn style_revision(&self) -> Option<u64> {
        self.style_revision
    }

    /// Record the style revision the handler ingested.
    pub fn set_style_revision(&mut self, revision: Option<u64>) {
        self.style_revision = revision;
    }

    /// Replace the response sink.
    pub fn set_sink(&mut self, sink: Option<Arc<dyn ResponseSink>>) {
        self.sink = sink;
    }

    /// The response sink, if any.
    pub fn sink(&self) -> Option<Arc<dyn ResponseSink>> {
        self.sink.clone()
    }
}

/// A registered endpoint: its session and its in-flight run.
pub struct EndpointSession {
    endpoint: EndPointIdentity,
    session: Mutex<Session>,
    run: Mutex<Option<CancelToken>>,
}

impl EndpointSession {
    /// The endpoint.
    pub fn endpoint(&self) -> &EndPointIdentity {
        &self.endpoint
    }

    /// Lock the session state.
    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock()
    }

    /// Deliver a response to the endpoint's sink (dropped if there is none).
    pub fn respond(&self, response: LanguageServiceResponse) {
        let sink = self.session.lock().sink();
        match sink {
            Some(sink) => sink.respond(response),
            None => tracing::trace!(endpoint = %self.endpoint, "no response sink, dropping response"),
        }
    }

    /// Returns `true` while a run started by [`SessionRegistry::begin_run`] is in flight.
    pub fn is_running(&self) -> bool {
        self.run.lock().as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Cancel the in-flight run. Returns whether there was one.
    pub fn interrupt(&self, reason: &str) -> bool {
        let run = self.run.lock();
        match run.as_ref() {
            Some(token) if !token.is_cancelled() => {
                tracing::debug!(
                    endpoint = %self.endpoint,
                    generation = token.generation(),
                    reason,
                    "interrupting run"
                );
                token.cancel(reason);
                true
            }
            _ => false,
        }
    }
}

/// Marks a run as in flight until dropped.
pub struct RunGuard {
    token: CancelToken,
    entry: Arc<EndpointSession>,
}

impl RunGuard {
    /// The run's cancel token.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// The run generation.
    pub fn generation(&self) -> u64 {
        self.token.generation()
    }

    /// The endpoint session the run belongs to.
    pub fn session(&self) -> &Arc<EndpointSession> {
        &self.entry
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut run = self.entry.run.lock();
        if run
            .as_ref()
            .is_some_and(|t| t.generation() == self.token.generation())
        {
            *run = None;
        }
    }
}

/// Maps endpoints to sessions.
pub struct SessionRegistry {
    style_prefix: String,
    sessions: RwLock<BTreeMap<EndPointIdentity, Arc<EndpointSession>>>,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    /// Create an empty registry; style classes are prefixed with `style_prefix`.
    pub fn new(style_prefix: impl Into<String>) -> Self {
        Self {
            style_prefix: style_prefix.into(),
            sessions: RwLock::new(BTreeMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Open a session, or update the options (and sink, if given) of an existing one.
    pub fn open(
        &self,
        endpoint: EndPointIdentity,
        options: EditorOptions,
        sink: Option<Arc<dyn ResponseSink>>,
    ) -> Arc<EndpointSession> {
        if let Some(entry) = self.get(&endpoint) {
            let mut session = entry.lock();
            session.set_options(options);
            if sink.is_some() {
                session.set_sink(sink);
            }
            drop(session);
            return entry;
        }

        let mut sessions = self.sessions.write();
        sessions
            .entry(endpoint.clone())
            .or_insert_with(|| {
                tracing::debug!(endpoint = %endpoint, "opened session");
                Arc::new(EndpointSession {
                    endpoint: endpoint.clone(),
                    session: Mutex::new(Session::new(
                        endpoint.clone(),
                        options,
                        sink,
                        &self.style_prefix,
                    )),
                    run: Mutex::new(None),
                })
            })
            .clone()
    }

    /// Look up a session.
    pub fn get(&self, endpoint: &EndPointIdentity) -> Option<Arc<EndpointSession>> {
        self.sessions.read().get(endpoint).cloned()
    }

    /// Close a session, interrupting its run. Returns whether it existed.
    pub fn close(&self, endpoint: &EndPointIdentity) -> bool {
        let removed = self.sessions.write().remove(endpoint);
        match removed {
            Some(entry) => {
                entry.interrupt("endpoint closed");
                tracing::debug!(endpoint = %endpoint, "closed session");
                true
            }
            None => false,
        }
    }

    /// Replace an endpoint's editor options.
    pub fn set_options(
        &self,
        endpoint: &EndPointIdentity,
        options: EditorOptions,
    ) -> Result<(), ServiceError> {
        let entry = self
            .get(endpoint)
            .ok_or_else(|| ServiceError::UnknownEndpoint(endpoint.clone()))?;
        entry.lock().set_options(options);
        Ok(())
    }

    /// Start a run for `endpoint` with a fresh generation and cancel token.
    ///
    /// Callers are expected to [`interrupt`](Self::interrupt) the previous run first; a run
    /// still in flight is only reported.
    pub fn begin_run(&self, endpoint: &EndPointIdentity) -> Result<RunGuard, ServiceError> {
        let entry = self
            .get(endpoint)
            .ok_or_else(|| ServiceError::UnknownEndpoint(endpoint.clone()))?;
        let generation = self.next_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let token = CancelToken::new(generation);

        let mut run = entry.run.lock();
        if let Some(previous) = run.as_ref()
            && !previous.is_cancelled()
        {
            tracing::warn!(
                endpoint = %endpoint,
                previous = previous.generation(),
                generation,
                "starting a run while the previous one is still in flight"
            );
        }
        *run = Some(token.clone());
        drop(run);

        Ok(RunGuard { token, entry })
    }

    /// Interrupt an endpoint's in-flight run. Idempotent: returns `false` when there is
    /// nothing to interrupt (including unknown endpoints).
    pub fn interrupt(&self, endpoint: &EndPointIdentity, reason: &str) -> bool {
        self.get(endpoint)
            .is_some_and(|entry| entry.interrupt(reason))
    }

    /// Open endpoints, sorted.
    pub fn endpoints(&self) -> Vec<EndPointIdentity> {
        self.sessions.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(s: &str) -> EndPointIdentity {
        EndPointIdentity::new("editor", s)
    }

    #[test]
    fn test_interrupt_without_run_is_noop() {
        let registry = SessionRegistry::new("wb");
        assert!(!registry.interrupt(&ep("missing"), "x"));

        registry.open(ep("a"), EditorOptions::default(), None);
        assert!(!registry.interrupt(&ep("a"), "x"));
        assert!(!registry.interrupt(&ep("a"), "x"));

        let guard = registry.begin_run(&ep("a")).unwrap();
        assert!(!guard.token().is_cancelled());
    }

    #[test]
    fn test_interrupt_cancels_run_once() {
        let registry = SessionRegistry::new("wb");
        registry.open(ep("a"), EditorOptions::default(), None);
        let guard = registry.begin_run(&ep("a")).unwrap();

        assert!(registry.interrupt(&ep("a"), "new text"));
        assert!(!registry.interrupt(&ep("a"), "again"));
        assert_eq!(guard.token().reason().as_deref(), Some("new text"));
    }

    #[test]
    fn test_run_guard_clears_on_drop() {
        let registry = SessionRegistry::new("wb");
        let entry = registry.open(ep("a"), EditorOptions::default(), None);
        let first = registry.begin_run(&ep("a")).unwrap();
        let second = registry.begin_run(&ep("a")).unwrap();
        assert!(second.generation() > first.generation());

        drop(first);
        assert!(entry.is_running());
        drop(second);
        assert!(!entry.is_running());
    }

    #[test]
    fn test_bind_language_resets_caches() {
        let registry = SessionRegistry::new("wb");
        let entry = registry.open(ep("a"), EditorOptions::default(), None);
        let mut session = entry.lock();

        assert!(session.bind_language(&LanguageIdentity::new("one")));
        session.style_handler_mut().map_class("X");
        session.set_style_revision(Some(1));
        assert!(!session.bind_language(&LanguageIdentity::new("one")));
        assert_eq!(session.style_handler().class_for("X"), Some("wb_one-1"));

        assert!(session.bind_language(&LanguageIdentity::new("two")));
        assert_eq!(session.style_handler().class_for("X"), None);
        assert_eq!(session.style_revision(), None);
    }

    #[test]
    fn test_close_and_unknown_endpoint() {
        let registry = SessionRegistry::new("wb");
        registry.open(ep("a"), EditorOptions::default(), None);
        assert_eq!(registry.endpoints(), vec![ep("a")]);
        assert!(registry.close(&ep("a")));
        assert!(!registry.close(&ep("a")));
        assert!(matches!(
            registry.begin_run(&ep("a")),
            Err(ServiceError::UnknownEndpoint(_))
        ));
    }
}
