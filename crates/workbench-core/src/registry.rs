//! Language definition registry.
//!
//! A process-wide map from [`LanguageIdentity`] to a shared [`LanguageDefinition`]. Definitions
//! hold grammar / cross-reference / style text and compile lazily: setting text only bumps a
//! revision and drops the cached processor, the next caller of
//! [`LanguageDefinition::processor`] pays for the compile.
//!
//! Edits are last-write-wins. The revision counters let the pipeline notice that a definition
//! changed under a running request.

use crate::error::RegistryError;
use crate::identity::LanguageIdentity;
use crate::issues::LanguageIssue;
use crate::processor::{LanguageCompiler, LanguageProcessor, StyleModel};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Which source text of a definition changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionChangeKind {
    /// Grammar text.
    Grammar,
    /// Cross-reference text.
    CrossReference,
    /// Style text.
    Style,
}

/// Notification sent to registry observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionChange {
    /// The definition that changed.
    pub identity: LanguageIdentity,
    /// What changed.
    pub kind: DefinitionChangeKind,
    /// The new revision (style revision for [`DefinitionChangeKind::Style`]).
    pub revision: u64,
}

/// A compiled processor together with the revision it was compiled from.
#[derive(Clone)]
pub struct ProcessorSnapshot {
    /// Grammar / cross-reference revision.
    pub revision: u64,
    /// The processor; `None` while the definition is not ready.
    pub processor: Option<Arc<dyn LanguageProcessor>>,
}

#[derive(Default)]
struct DefinitionState {
    grammar: Option<String>,
    cross_reference: Option<String>,
    style: Option<String>,
    revision: u64,
    style_revision: u64,
    compiled: Option<ProcessorSnapshot>,
    compile_issues: Vec<LanguageIssue>,
    style_model: Option<(u64, Option<Arc<StyleModel>>)>,
    style_issues: Vec<LanguageIssue>,
}

/// Grammar, cross-reference and style text for one language, plus what was compiled from them.
pub struct LanguageDefinition {
    identity: LanguageIdentity,
    modifiable: bool,
    builtin: Option<Arc<dyn LanguageProcessor>>,
    compiler: Arc<dyn LanguageCompiler>,
    state: RwLock<DefinitionState>,
}

impl fmt::Debug for LanguageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("LanguageDefinition")
            .field("identity", &self.identity)
            .field("modifiable", &self.modifiable)
            .field("revision", &state.revision)
            .field("style_revision", &state.style_revision)
            .finish()
    }
}

impl LanguageDefinition {
    fn placeholder(identity: LanguageIdentity, compiler: Arc<dyn LanguageCompiler>) -> Self {
        Self {
            identity,
            modifiable: true,
            builtin: None,
            compiler,
            state: RwLock::new(DefinitionState::default()),
        }
    }

    /// Get the identity.
    pub fn identity(&self) -> &LanguageIdentity {
        &self.identity
    }

    /// Grammar text, if set.
    pub fn grammar(&self) -> Option<String> {
        self.state.read().grammar.clone()
    }

    /// Cross-reference text, if set.
    pub fn cross_reference(&self) -> Option<String> {
        self.state.read().cross_reference.clone()
    }

    /// Style text, if set.
    pub fn style(&self) -> Option<String> {
        self.state.read().style.clone()
    }

    /// A definition is configured once it has non-blank grammar text (or is built in).
    pub fn is_configured(&self) -> bool {
        self.builtin.is_some()
            || self
                .state
                .read()
                .grammar
                .as_deref()
                .is_some_and(|g| !g.trim().is_empty())
    }

    /// Built-in definitions cannot be removed, and only their style can be edited.
    pub fn is_modifiable(&self) -> bool {
        self.modifiable
    }

    /// Revision of the grammar / cross-reference text.
    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// Revision of the style text.
    pub fn style_revision(&self) -> u64 {
        self.state.read().style_revision
    }

    /// Compile (or reuse) the processor for the current revision.
    pub fn processor(&self) -> Option<Arc<dyn LanguageProcessor>> {
        self.snapshot().processor
    }

    /// Compile (or reuse) the processor, returning it with the revision it belongs to.
    pub fn snapshot(&self) -> ProcessorSnapshot {
        let (revision, grammar, cross_reference) = {
            let state = self.state.read();
            if let Some(builtin) = &self.builtin {
                return ProcessorSnapshot {
                    revision: state.revision,
                    processor: Some(builtin.clone()),
                };
            }
            if let Some(compiled) = &state.compiled
                && compiled.revision == state.revision
            {
                return compiled.clone();
            }
            (
                state.revision,
                state.grammar.clone(),
                state.cross_reference.clone(),
            )
        };

        let Some(grammar) = grammar else {
            return ProcessorSnapshot {
                revision,
                processor: None,
            };
        };

        tracing::debug!(language = %self.identity, revision, "compiling language definition");
        let outcome = self
            .compiler
            .compile(&self.identity, &grammar, cross_reference.as_deref());
        if outcome.processor.is_none() {
            tracing::debug!(
                language = %self.identity,
                revision,
                issues = outcome.issues.len(),
                "language definition did not compile"
            );
        }

        let snapshot = ProcessorSnapshot {
            revision,
            processor: outcome.processor,
        };
        let mut state = self.state.write();
        if state.revision == revision {
            state.compiled = Some(snapshot.clone());
            state.compile_issues = outcome.issues;
        }
        snapshot
    }

    /// Compile (or reuse) the style model for the current style revision.
    pub fn style_model(&self) -> Option<Arc<StyleModel>> {
        let (revision, style) = {
            let state = self.state.read();
            if let Some((rev, model)) = &state.style_model
                && *rev == state.style_revision
            {
                return model.clone();
            }
            (state.style_revision, state.style.clone())
        };

        let style = style?;
        let outcome = self.compiler.compile_style(&style);
        let mut state = self.state.write();
        if state.style_revision == revision {
            state.style_model = Some((revision, outcome.model.clone()));
            state.style_issues = outcome.issues;
        }
        outcome.model
    }

    /// Issues from the last grammar and style compilations.
    pub fn issues(&self) -> Vec<LanguageIssue> {
        let state = self.state.read();
        state
            .compile_issues
            .iter()
            .chain(state.style_issues.iter())
            .cloned()
            .collect()
    }

    /// Issues from the last style compilation.
    pub fn style_issues(&self) -> Vec<LanguageIssue> {
        self.state.read().style_issues.clone()
    }

    fn update(&self, kind: DefinitionChangeKind, text: &str) -> Result<Option<u64>, RegistryError> {
        if !self.modifiable && kind != DefinitionChangeKind::Style {
            return Err(RegistryError::NotModifiable(self.identity.clone()));
        }

        let mut state = self.state.write();
        let slot = match kind {
            DefinitionChangeKind::Grammar => &mut state.grammar,
            DefinitionChangeKind::CrossReference => &mut state.cross_reference,
            DefinitionChangeKind::Style => &mut state.style,
        };
        let new_value = match kind {
            DefinitionChangeKind::CrossReference if text.trim().is_empty() => None,
            _ => Some(text.to_string()),
        };
        if *slot == new_value {
            return Ok(None);
        }
        *slot = new_value;

        match kind {
            DefinitionChangeKind::Style => {
                state.style_revision += 1;
                state.style_model = None;
                state.style_issues.clear();
                Ok(Some(state.style_revision))
            }
            DefinitionChangeKind::Grammar | DefinitionChangeKind::CrossReference => {
                state.revision += 1;
                state.compiled = None;
                state.compile_issues.clear();
                Ok(Some(state.revision))
            }
        }
    }
}

type Observer = Box<dyn FnMut(&DefinitionChange) + Send>;

/// Process-wide registry of language definitions.
pub struct LanguageRegistry {
    compiler: Arc<dyn LanguageCompiler>,
    definitions: RwLock<BTreeMap<LanguageIdentity, Arc<LanguageDefinition>>>,
    observers: Mutex<Vec<Observer>>,
}

impl fmt::Debug for LanguageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageRegistry")
            .field("definitions", &self.identities())
            .finish()
    }
}

impl LanguageRegistry {
    /// Create an empty registry that compiles definitions with `compiler`.
    pub fn new(compiler: Arc<dyn LanguageCompiler>) -> Self {
        Self {
            compiler,
            definitions: RwLock::new(BTreeMap::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// The compiler used for user definitions.
    pub fn compiler(&self) -> Arc<dyn LanguageCompiler> {
        self.compiler.clone()
    }

    /// Look up a definition.
    pub fn find(&self, identity: &LanguageIdentity) -> Option<Arc<LanguageDefinition>> {
        self.definitions.read().get(identity).cloned()
    }

    /// Look up a definition, creating an unconfigured placeholder if missing.
    pub fn find_or_create(&self, identity: &LanguageIdentity) -> Arc<LanguageDefinition> {
        if let Some(def) = self.find(identity) {
            return def;
        }
        let mut definitions = self.definitions.write();
        definitions
            .entry(identity.clone())
            .or_insert_with(|| {
                tracing::trace!(language = %identity, "created placeholder definition");
                Arc::new(LanguageDefinition::placeholder(
                    identity.clone(),
                    self.compiler.clone(),
                ))
            })
            .clone()
    }

    /// Register a built-in definition backed by an existing processor.
    ///
    /// Its grammar and cross-reference are fixed; its style can still be replaced.
    pub fn register_builtin(
        &self,
        identity: LanguageIdentity,
        processor: Arc<dyn LanguageProcessor>,
        style: Option<&str>,
    ) -> Arc<LanguageDefinition> {
        let state = DefinitionState {
            style: style.map(str::to_string),
            ..DefinitionState::default()
        };
        let def = Arc::new(LanguageDefinition {
            identity: identity.clone(),
            modifiable: false,
            builtin: Some(processor),
            compiler: self.compiler.clone(),
            state: RwLock::new(state),
        });
        self.definitions.write().insert(identity, def.clone());
        def
    }

    /// Set grammar text. Returns whether anything changed.
    pub fn set_grammar(&self, identity: &LanguageIdentity, text: &str) -> Result<bool, RegistryError> {
        self.update(identity, DefinitionChangeKind::Grammar, text)
    }

    /// Set cross-reference text (blank text clears it). Returns whether anything changed.
    pub fn set_cross_reference(
        &self,
        identity: &LanguageIdentity,
        text: &str,
    ) -> Result<bool, RegistryError> {
        self.update(identity, DefinitionChangeKind::CrossReference, text)
    }

    /// Set style text. Returns whether anything changed.
    pub fn set_style(&self, identity: &LanguageIdentity, text: &str) -> Result<bool, RegistryError> {
        self.update(identity, DefinitionChangeKind::Style, text)
    }

    /// Remove a definition. Endpoints still holding it keep their `Arc`.
    pub fn remove(&self, identity: &LanguageIdentity) -> Result<bool, RegistryError> {
        let mut definitions = self.definitions.write();
        match definitions.get(identity) {
            None => Ok(false),
            Some(def) if !def.is_modifiable() => {
                Err(RegistryError::NotModifiable(identity.clone()))
            }
            Some(_) => {
                definitions.remove(identity);
                Ok(true)
            }
        }
    }

    /// Registered identities, sorted.
    pub fn identities(&self) -> Vec<LanguageIdentity> {
        self.definitions.read().keys().cloned().collect()
    }

    /// All registered definitions, sorted by identity.
    pub fn definitions(&self) -> Vec<Arc<LanguageDefinition>> {
        self.definitions.read().values().cloned().collect()
    }

    /// Register a change observer.
    ///
    /// Observers run on the thread that made the change and must not modify the registry.
    pub fn observe<F>(&self, callback: F)
    where
        F: FnMut(&DefinitionChange) + Send + 'static,
    {
        self.observers.lock().push(Box::new(callback));
    }

    fn update(
        &self,
        identity: &LanguageIdentity,
        kind: DefinitionChangeKind,
        text: &str,
    ) -> Result<bool, RegistryError> {
        let def = self.find_or_create(identity);
        let Some(revision) = def.update(kind, text)? else {
            return Ok(false);
        };

        tracing::debug!(language = %identity, ?kind, revision, "language definition changed");
        let change = DefinitionChange {
            identity: identity.clone(),
            kind,
            revision,
        };
        for observer in self.observers.lock().iter_mut() {
            observer(&change);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessorResult;
    use crate::issues::{LanguageIssue, Phase};
    use crate::options::ProcessOptions;
    use crate::processor::{
        CompileOutcome, Matchable, ParseResult, ParseTree, ScanResult, StyleOutcome,
        SyntaxAnalysisResult,
    };
    use crate::cancel::CancelToken;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Nothing;

    impl LanguageProcessor for Nothing {
        fn matchables(&self) -> Vec<Matchable> {
            Vec::new()
        }
        fn scan(&self, _text: &str, _offset: usize) -> ProcessorResult<ScanResult> {
            Ok(ScanResult::default())
        }
        fn parse(
            &self,
            _text: &str,
            _options: &ProcessOptions,
            _cancel: &CancelToken,
        ) -> ProcessorResult<ParseResult> {
            Ok(ParseResult::default())
        }
        fn syntax_analysis(
            &self,
            _tree: &ParseTree,
            _options: &ProcessOptions,
        ) -> ProcessorResult<SyntaxAnalysisResult> {
            Ok(SyntaxAnalysisResult::default())
        }
    }

    #[derive(Default)]
    struct CountingCompiler {
        compiles: AtomicUsize,
    }

    impl LanguageCompiler for CountingCompiler {
        fn compile(
            &self,
            _identity: &LanguageIdentity,
            grammar: &str,
            _cross_reference: Option<&str>,
        ) -> CompileOutcome {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            if grammar.trim().is_empty() {
                return CompileOutcome {
                    processor: None,
                    issues: vec![LanguageIssue::error(Phase::Compile, None, "empty grammar")],
                };
            }
            CompileOutcome {
                processor: Some(Arc::new(Nothing)),
                issues: Vec::new(),
            }
        }

        fn compile_style(&self, _style: &str) -> StyleOutcome {
            StyleOutcome {
                model: Some(Arc::new(StyleModel::default())),
                issues: Vec::new(),
            }
        }
    }

    #[test]
    fn test_placeholder_is_not_configured() {
        let registry = LanguageRegistry::new(Arc::new(CountingCompiler::default()));
        let id = LanguageIdentity::new("lang");
        let def = registry.find_or_create(&id);
        assert!(!def.is_configured());
        assert!(def.processor().is_none());
        assert!(Arc::ptr_eq(&def, &registry.find_or_create(&id)));
    }

    #[test]
    fn test_compiles_lazily_once_per_revision() {
        let compiler = Arc::new(CountingCompiler::default());
        let registry = LanguageRegistry::new(compiler.clone());
        let id = LanguageIdentity::new("lang");

        assert!(registry.set_grammar(&id, "grammar").unwrap());
        assert_eq!(compiler.compiles.load(Ordering::SeqCst), 0);

        let def = registry.find(&id).unwrap();
        assert!(def.processor().is_some());
        assert!(def.processor().is_some());
        assert_eq!(compiler.compiles.load(Ordering::SeqCst), 1);

        assert!(!registry.set_grammar(&id, "grammar").unwrap());
        assert_eq!(def.revision(), 1);

        registry.set_grammar(&id, "").unwrap();
        assert!(def.processor().is_none());
        assert_eq!(def.issues().len(), 1);
        assert_eq!(def.revision(), 2);
    }

    #[test]
    fn test_builtin_not_modifiable() {
        let registry = LanguageRegistry::new(Arc::new(CountingCompiler::default()));
        let id = LanguageIdentity::grammar();
        registry.register_builtin(id.clone(), Arc::new(Nothing), None);

        assert_eq!(
            registry.set_grammar(&id, "x"),
            Err(RegistryError::NotModifiable(id.clone()))
        );
        assert_eq!(
            registry.set_cross_reference(&id, "x"),
            Err(RegistryError::NotModifiable(id.clone()))
        );
        assert_eq!(
            registry.remove(&id),
            Err(RegistryError::NotModifiable(id.clone()))
        );
        assert!(registry.find(&id).unwrap().is_configured());
    }

    #[test]
    fn test_builtin_style_can_be_replaced() {
        let registry = LanguageRegistry::new(Arc::new(CountingCompiler::default()));
        let id = LanguageIdentity::style();
        let def = registry.register_builtin(id.clone(), Arc::new(Nothing), Some("old"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.observe(move |change| sink.lock().push(change.kind));

        assert_eq!(registry.set_style(&id, "new"), Ok(true));
        assert_eq!(registry.set_style(&id, "new"), Ok(false));
        assert_eq!(def.style(), Some("new".to_string()));
        assert_eq!(def.style_revision(), 1);
        assert_eq!(def.revision(), 0);
        assert_eq!(*seen.lock(), vec![DefinitionChangeKind::Style]);
    }

    #[test]
    fn test_observers_see_changes() {
        let registry = LanguageRegistry::new(Arc::new(CountingCompiler::default()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.observe(move |change| sink.lock().push(change.clone()));

        let id = LanguageIdentity::new("lang");
        registry.set_grammar(&id, "g").unwrap();
        registry.set_style(&id, "s").unwrap();
        registry.set_style(&id, "s").unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].kind, DefinitionChangeKind::Style);
        assert_eq!(seen[1].revision, 1);
    }
}
