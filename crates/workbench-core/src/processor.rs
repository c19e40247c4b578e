//! Language processor interfaces and the data they produce.
//!
//! The workbench core never parses anything itself. A [`LanguageCompiler`] turns grammar and
//! cross-reference text into a [`LanguageProcessor`], and the pipeline drives that processor
//! stage by stage. Concrete implementations live in other crates (`workbench-grammar`).

use crate::cancel::CancelToken;
use crate::error::ProcessorResult;
use crate::identity::LanguageIdentity;
use crate::issues::{InputLocation, LanguageIssue};
use crate::options::{AnalysisContext, ProcessOptions};
use crate::sentence::Sentence;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A terminal match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaf {
    /// Rule name; anonymous literals are quoted (`'Hello'`), anonymous patterns double-quoted.
    pub name: String,
    /// Start offset in chars.
    pub position: usize,
    /// Length in chars.
    pub length: usize,
    /// Matched text.
    pub text: String,
    /// Matched by a skip rule (whitespace, comments).
    pub is_skip: bool,
    /// Ancestor rule names followed by the leaf's own name (empty for scan-only leaves).
    #[serde(default)]
    pub tags: Vec<String>,
    /// Meta tags such as `$keyword`.
    #[serde(default)]
    pub meta_tags: Vec<String>,
}

impl Leaf {
    /// Name given to text no terminal recognizes.
    pub const UNDEFINED: &'static str = "$undefined";

    /// Create a leaf; `length` is the char count of `text`.
    pub fn new(name: impl Into<String>, position: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            name: name.into(),
            position,
            length: text.chars().count(),
            text,
            is_skip: false,
            tags: Vec::new(),
            meta_tags: Vec::new(),
        }
    }

    /// Mark as a skip leaf.
    pub fn skip(mut self) -> Self {
        self.is_skip = true;
        self
    }

    /// Set tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set meta tags.
    pub fn with_meta_tags(mut self, meta_tags: Vec<String>) -> Self {
        self.meta_tags = meta_tags;
        self
    }

    /// Exclusive end offset.
    pub fn end(&self) -> usize {
        self.position + self.length
    }

    /// Returns `true` for text no terminal recognized.
    pub fn is_undefined(&self) -> bool {
        self.name == Self::UNDEFINED
    }

    fn segment(&self, position: usize, text: String) -> Leaf {
        Leaf {
            name: self.name.clone(),
            position,
            length: text.chars().count(),
            text,
            is_skip: self.is_skip,
            tags: self.tags.clone(),
            meta_tags: self.meta_tags.clone(),
        }
    }
}

/// A non-terminal node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseBranch {
    /// Rule name.
    pub name: String,
    /// Start offset in chars.
    pub position: usize,
    /// Length in chars.
    pub length: usize,
    /// Children in text order.
    pub children: Vec<ParseNode>,
}

/// A node of a parse tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ParseNode {
    /// A non-terminal.
    Branch(ParseBranch),
    /// A terminal.
    Leaf(Leaf),
}

impl ParseNode {
    /// Rule name of the node.
    pub fn name(&self) -> &str {
        match self {
            ParseNode::Branch(branch) => &branch.name,
            ParseNode::Leaf(leaf) => &leaf.name,
        }
    }

    /// Start offset in chars.
    pub fn position(&self) -> usize {
        match self {
            ParseNode::Branch(branch) => branch.position,
            ParseNode::Leaf(leaf) => leaf.position,
        }
    }

    /// Length in chars.
    pub fn length(&self) -> usize {
        match self {
            ParseNode::Branch(branch) => branch.length,
            ParseNode::Leaf(leaf) => leaf.length,
        }
    }
}

/// The parse tree of a whole sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseTree {
    /// The goal-rule node.
    pub root: ParseNode,
}

impl ParseTree {
    /// Wrap a root node.
    pub fn new(root: ParseNode) -> Self {
        Self { root }
    }

    /// All leaves in text order, skip leaves included.
    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match node {
                ParseNode::Leaf(leaf) => out.push(leaf),
                ParseNode::Branch(branch) => stack.extend(branch.children.iter().rev()),
            }
        }
        out
    }

    /// Leaves that were not matched by a skip rule.
    pub fn non_skip_leaves(&self) -> Vec<&Leaf> {
        self.leaves().into_iter().filter(|l| !l.is_skip).collect()
    }

    /// Leaves grouped by line, multi-line leaves split at line ends.
    ///
    /// A covered line terminator becomes its own length-1 segment on the line it terminates, so
    /// every terminated line ends with a token at `line_start + line_len`. Zero-length leaves
    /// produce no segment.
    pub fn tokens_by_line(&self, sentence: &Sentence) -> Vec<Vec<Leaf>> {
        let mut lines: Vec<Vec<Leaf>> = vec![Vec::new(); sentence.line_count()];
        for leaf in self.leaves() {
            if leaf.length == 0 {
                continue;
            }

            let chars: Vec<char> = leaf.text.chars().collect();
            let mut pos = leaf.position;
            let end = leaf.end();
            while pos < end {
                let line = sentence.line_of(pos);
                let content_end = sentence.line_start(line) + sentence.line_len(line);
                let boundary = if pos < content_end {
                    content_end
                } else {
                    content_end + 1
                };
                let seg_end = end.min(boundary).max(pos + 1);

                let from = (pos - leaf.position).min(chars.len());
                let to = (seg_end - leaf.position).min(chars.len());
                let text: String = chars[from..to].iter().collect();
                if let Some(bucket) = lines.get_mut(line) {
                    bucket.push(leaf.segment(pos, text));
                }
                pos = seg_end;
            }
        }
        lines
    }
}

/// Primitive ASM value with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsmPrimitive {
    /// Matched text.
    pub value: String,
    /// Where it came from.
    pub location: Option<InputLocation>,
}

/// A value in the abstract syntax model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AsmValue {
    /// Absent optional value.
    Nothing,
    /// A leaf value.
    Primitive(AsmPrimitive),
    /// A nested structure.
    Structure(AsmStructure),
    /// A repetition.
    List(Vec<AsmValue>),
}

impl AsmValue {
    /// The primitive text, if this is a primitive.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AsmValue::Primitive(p) => Some(&p.value),
            _ => None,
        }
    }

    /// The structure, if this is a structure.
    pub fn as_structure(&self) -> Option<&AsmStructure> {
        match self {
            AsmValue::Structure(s) => Some(s),
            _ => None,
        }
    }
}

/// A named property of a structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsmProperty {
    /// Property name.
    pub name: String,
    /// Property value.
    pub value: AsmValue,
}

/// A typed node of the abstract syntax model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsmStructure {
    /// Type name.
    pub type_name: String,
    /// Text the structure was built from.
    pub location: Option<InputLocation>,
    /// Properties in declaration order.
    pub properties: Vec<AsmProperty>,
}

impl AsmStructure {
    /// Look up a property value.
    pub fn property(&self, name: &str) -> Option<&AsmValue> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// The abstract syntax model of a sentence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asm {
    /// Root structures.
    pub roots: Vec<AsmStructure>,
}

impl Asm {
    /// Visit every structure depth-first, parents before children.
    pub fn walk<'a, F: FnMut(&'a AsmStructure)>(&'a self, mut visitor: F) {
        fn visit_value<'a, F: FnMut(&'a AsmStructure)>(value: &'a AsmValue, visitor: &mut F) {
            match value {
                AsmValue::Structure(s) => visit_structure(s, visitor),
                AsmValue::List(items) => items.iter().for_each(|v| visit_value(v, visitor)),
                AsmValue::Nothing | AsmValue::Primitive(_) => {}
            }
        }
        fn visit_structure<'a, F: FnMut(&'a AsmStructure)>(
            s: &'a AsmStructure,
            visitor: &mut F,
        ) {
            visitor(s);
            for p in &s.properties {
                visit_value(&p.value, visitor);
            }
        }

        for root in &self.roots {
            visit_structure(root, &mut visitor);
        }
    }

    /// Number of structures in the model.
    pub fn structure_count(&self) -> usize {
        let mut count = 0;
        self.walk(|_| count += 1);
        count
    }
}

/// A property of a [`TypeDefinition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    /// Property name.
    pub name: String,
    /// Type of the property (`String` for primitives).
    pub type_name: String,
    /// Whether the property holds a list.
    pub is_collection: bool,
}

/// A type derived from a grammar rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefinition {
    /// Type name.
    pub name: String,
    /// Properties.
    pub properties: Vec<PropertyDefinition>,
}

impl TypeDefinition {
    /// Look up a property.
    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// The type information derived from a grammar.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeModel {
    /// Grammar namespace.
    pub namespace: String,
    /// Grammar name.
    pub name: String,
    /// Types, one per non-leaf rule.
    pub types: Vec<TypeDefinition>,
}

impl TypeModel {
    /// Look up a type.
    pub fn find_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.iter().find(|t| t.name == name)
    }
}

/// How a scanner terminal matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchableKind {
    /// Exact text.
    Literal,
    /// Regular expression.
    Pattern,
}

/// A scanner terminal, as reported to editors on processor creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matchable {
    /// Leaf name the terminal produces.
    pub name: String,
    /// Literal or pattern.
    pub kind: MatchableKind,
    /// Literal text or pattern source.
    pub expression: String,
    /// Matched by a skip rule.
    pub is_skip: bool,
}

/// A code-completion proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
    /// Kind of terminal proposed.
    pub kind: MatchableKind,
    /// Terminal name.
    pub name: String,
    /// Text to insert (a pattern's name in angle brackets when no concrete text exists).
    pub text: String,
}

/// What a style selector matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectorKind {
    /// An anonymous literal, quoted as it appears in leaf names.
    Literal,
    /// An anonymous pattern.
    Pattern,
    /// A rule name.
    RuleName,
    /// A meta tag (`$keyword`, `$nostyle`).
    Meta,
}

/// A selector of a style rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSelector {
    /// Selector text as matched against leaf names and tags.
    pub value: String,
    /// Selector kind.
    pub kind: SelectorKind,
}

/// A `name: value` pair of a style rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleDeclaration {
    /// Property name.
    pub name: String,
    /// Property value.
    pub value: String,
}

/// A style rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleRule {
    /// Selectors the rule applies to.
    pub selectors: Vec<StyleSelector>,
    /// Declarations.
    pub declarations: Vec<StyleDeclaration>,
}

/// A compiled style sheet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleModel {
    /// Rules in source order.
    pub rules: Vec<StyleRule>,
}

impl StyleModel {
    /// Selector for text that should not be styled.
    pub const NO_STYLE: &'static str = "$nostyle";

    /// Every selector value, in source order.
    pub fn all_selectors(&self) -> Vec<&str> {
        self.rules
            .iter()
            .flat_map(|r| r.selectors.iter().map(|s| s.value.as_str()))
            .collect()
    }
}

/// Result of scanning text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanResult {
    /// Leaves in text order, covering the whole text.
    pub leaves: Vec<Leaf>,
    /// Scanner issues.
    pub issues: Vec<LanguageIssue>,
}

/// Result of parsing a sentence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParseResult {
    /// The tree; `None` when the sentence could not be parsed.
    pub tree: Option<Arc<ParseTree>>,
    /// Parse issues.
    pub issues: Vec<LanguageIssue>,
}

/// Result of syntax analysis.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyntaxAnalysisResult {
    /// The ASM; `None` when no model could be built.
    pub asm: Option<Arc<Asm>>,
    /// Syntax-analysis issues.
    pub issues: Vec<LanguageIssue>,
}

/// Result of semantic analysis.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SemanticAnalysisResult {
    /// Semantic issues.
    pub issues: Vec<LanguageIssue>,
}

/// Result of a completion request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionResult {
    /// Proposals.
    pub items: Vec<CompletionItem>,
    /// Completion issues.
    pub issues: Vec<LanguageIssue>,
}

/// A compiled language: scanner, parser and analyses.
///
/// Implementations are shared between endpoints and must be usable from several threads.
/// Long-running calls receive a [`CancelToken`] and should return its error once cancelled.
pub trait LanguageProcessor: Send + Sync {
    /// Scanner terminals.
    fn matchables(&self) -> Vec<Matchable>;

    /// Scan `text` without parsing; leaf positions are shifted by `offset`.
    fn scan(&self, text: &str, offset: usize) -> ProcessorResult<ScanResult>;

    /// Parse a sentence.
    fn parse(
        &self,
        text: &str,
        options: &ProcessOptions,
        cancel: &CancelToken,
    ) -> ProcessorResult<ParseResult>;

    /// Build the ASM from a parse tree.
    fn syntax_analysis(
        &self,
        tree: &ParseTree,
        options: &ProcessOptions,
    ) -> ProcessorResult<SyntaxAnalysisResult>;

    /// Check an ASM.
    fn semantic_analysis(
        &self,
        _asm: &Asm,
        _context: &AnalysisContext,
        _options: &ProcessOptions,
        _cancel: &CancelToken,
    ) -> ProcessorResult<SemanticAnalysisResult> {
        Ok(SemanticAnalysisResult::default())
    }

    /// Terminals that may appear at `position` of `text`.
    fn expected_items_at(
        &self,
        _text: &str,
        _position: usize,
        _options: &ProcessOptions,
    ) -> ProcessorResult<CompletionResult> {
        Ok(CompletionResult::default())
    }

    /// Type model derived from the grammar.
    fn type_model(&self) -> Option<Arc<TypeModel>> {
        None
    }

    /// Names of all rules.
    fn rule_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Outcome of compiling grammar (and cross-reference) text.
#[derive(Clone, Default)]
pub struct CompileOutcome {
    /// The processor; `None` if compilation failed.
    pub processor: Option<Arc<dyn LanguageProcessor>>,
    /// Compilation issues.
    pub issues: Vec<LanguageIssue>,
}

/// Outcome of compiling style text.
#[derive(Debug, Clone, Default)]
pub struct StyleOutcome {
    /// The model; `None` if compilation failed.
    pub model: Option<Arc<StyleModel>>,
    /// Compilation issues.
    pub issues: Vec<LanguageIssue>,
}

/// Builds processors and style models from definition text.
///
/// Compilation never panics or returns an error: failures are reported as issues.
pub trait LanguageCompiler: Send + Sync {
    /// Compile grammar text, with optional cross-reference text.
    fn compile(
        &self,
        identity: &LanguageIdentity,
        grammar: &str,
        cross_reference: Option<&str>,
    ) -> CompileOutcome;

    /// Compile style text.
    fn compile_style(&self, style: &str) -> StyleOutcome;
}
