//! The built-in meta languages: grammar, cross-reference and style texts are themselves
//! sentences of languages defined here, so definition editors get highlighting, parse errors
//! and semantic checks like any other editor.

use crate::grammar::{CompiledGrammar, GrammarError, GrammarSource};
use crate::processor::{Analysis, GrammarProcessor};
use crate::xref::{check_declarations, primitives, structures};
use std::collections::BTreeSet;
use std::sync::Arc;
use workbench_core::{
    AnalysisContext, Asm, AsmPrimitive, AsmStructure, AsmValue, LanguageIdentity, LanguageIssue,
    LanguageRegistry, Phase,
};

/// Grammar of grammar texts.
pub const GRAMMAR_GRAMMAR: &str = r#"
namespace workbench
grammar Grammar {
    skip leaf WHITESPACE = "\s+" ;
    skip leaf LINE_COMMENT = "//[^\n]*" ;
    skip leaf BLOCK_COMMENT = "/\*(?s:.)*?\*/" ;

    unit = namespace grammar+ ;
    namespace = 'namespace' QUALIFIED_NAME ;
    grammar = 'grammar' IDENTIFIER extends? '{' rule* '}' ;
    extends = ':' [QUALIFIED_NAME / ',']+ ;
    rule = ruleModifier* IDENTIFIER '=' choice? ';' ;
    ruleModifier = 'skip' | 'leaf' ;
    choice = [concatenation / '|']+ ;
    concatenation = concatenationItem+ ;
    concatenationItem = simpleItem multiplicity? | separatedList ;
    simpleItem = LITERAL | PATTERN | nonTerminal | group ;
    group = '(' choice ')' ;
    separatedList = '[' simpleItem '/' simpleItem ']' listMultiplicity ;
    multiplicity = '?' | '*' | '+' ;
    listMultiplicity = '*' | '+' ;
    nonTerminal = IDENTIFIER ;

    leaf QUALIFIED_NAME = IDENTIFIER ( "\." IDENTIFIER )* ;
    leaf IDENTIFIER = "[A-Za-z_][A-Za-z0-9_]*" ;
    leaf LITERAL = "'(?:[^'\\]|\\.)*'" ;
    leaf PATTERN = "\"(?:[^\"\\]|\\.)*\"" ;
}
"#;

/// Grammar of cross-reference texts.
pub const CROSS_REFERENCE_GRAMMAR: &str = r#"
namespace workbench
grammar CrossReference {
    skip leaf WHITESPACE = "\s+" ;
    skip leaf LINE_COMMENT = "//[^\n]*" ;
    skip leaf BLOCK_COMMENT = "/\*(?s:.)*?\*/" ;

    unit = namespace? declaration* ;
    namespace = 'namespace' qualifiedName ;
    declaration = identify | references ;
    identify = 'identify' typeName 'by' propertyName ;
    references = 'references' '{' referenceGroup* '}' ;
    referenceGroup = 'in' typeName '{' reference* '}' ;
    reference = 'property' propertyName 'refers-to' typeList ;
    typeList = [typeName / '|']+ ;

    leaf IDENTIFIER = "[A-Za-z_][A-Za-z0-9_]*" ;
    leaf qualifiedName = IDENTIFIER ( "\." IDENTIFIER )* ;
    leaf typeName = IDENTIFIER ;
    leaf propertyName = IDENTIFIER ;
}
"#;

/// Grammar of style texts.
pub const STYLE_GRAMMAR: &str = r#"
namespace workbench
grammar Style {
    skip leaf WHITESPACE = "\s+" ;
    skip leaf LINE_COMMENT = "//[^\n]*" ;
    skip leaf BLOCK_COMMENT = "/\*(?s:.)*?\*/" ;

    unit = namespace? sheet ;
    namespace = 'namespace' QUALIFIED_NAME ;
    sheet = wrapped | rules ;
    wrapped = 'styles' IDENTIFIER '{' rules '}' ;
    rules = rule* ;
    rule = selectorList '{' declaration* '}' ;
    selectorList = [selector / ',']+ ;
    selector = LITERAL | PATTERN | META | IDENTIFIER ;
    declaration = STYLE_NAME ':' VALUE ';' ;

    leaf QUALIFIED_NAME = IDENTIFIER ( "\." IDENTIFIER )* ;
    leaf IDENTIFIER = "[A-Za-z_][A-Za-z0-9_]*" ;
    leaf LITERAL = "'(?:[^'\\]|\\.)*'" ;
    leaf PATTERN = "\"(?:[^\"\\]|\\.)*\"" ;
    leaf META = "\$[A-Za-z_][A-Za-z0-9_]*" ;
    leaf STYLE_NAME = "[A-Za-z_-][A-Za-z0-9_-]*" ;
    leaf VALUE = "[^;{}\s:]+(?:[ \t]+[^;{}\s:]+)*" ;
}
"#;

/// Highlighting of grammar texts.
pub const GRAMMAR_STYLE: &str = r#"
namespace workbench
styles Grammar {
    $keyword { foreground: darkgreen; font-weight: bold; }
    LITERAL { foreground: blue; }
    PATTERN { foreground: darkblue; }
    IDENTIFIER { foreground: darkred; }
    QUALIFIED_NAME { foreground: darkred; font-style: italic; }
    LINE_COMMENT, BLOCK_COMMENT { foreground: grey; font-style: italic; }
}
"#;

/// Highlighting of cross-reference texts.
pub const CROSS_REFERENCE_STYLE: &str = r#"
namespace workbench
styles CrossReference {
    $keyword, 'refers-to' { foreground: darkgreen; font-weight: bold; }
    typeName { foreground: darkred; }
    propertyName { foreground: darkblue; }
    LINE_COMMENT, BLOCK_COMMENT { foreground: grey; font-style: italic; }
}
"#;

/// Highlighting of style texts.
pub const STYLE_STYLE: &str = r#"
namespace workbench
styles Style {
    $keyword { foreground: darkgreen; font-weight: bold; }
    LITERAL, PATTERN { foreground: blue; }
    META { foreground: purple; }
    IDENTIFIER { foreground: darkred; font-style: italic; }
    STYLE_NAME { foreground: darkred; }
    VALUE { foreground: black; }
    LINE_COMMENT, BLOCK_COMMENT { foreground: grey; font-style: italic; }
}
"#;

/// Processors of the three meta languages.
#[derive(Debug, Clone)]
pub struct MetaLanguages {
    /// Grammar texts.
    pub grammar: Arc<GrammarProcessor>,
    /// Cross-reference texts.
    pub cross_reference: Arc<GrammarProcessor>,
    /// Style texts.
    pub style: Arc<GrammarProcessor>,
}

impl MetaLanguages {
    /// Compile the meta-language grammars.
    pub fn new() -> Result<Self, GrammarError> {
        let processor = |text: &str, analysis: Analysis| -> Result<_, GrammarError> {
            let grammar = CompiledGrammar::compile(text)?;
            Ok(Arc::new(
                GrammarProcessor::new(grammar).with_analysis(analysis),
            ))
        };

        Ok(Self {
            grammar: processor(GRAMMAR_GRAMMAR, Analysis::GrammarMeta)?,
            cross_reference: processor(CROSS_REFERENCE_GRAMMAR, Analysis::CrossReferenceMeta)?,
            style: processor(STYLE_GRAMMAR, Analysis::StyleMeta)?,
        })
    }

    /// Register the meta languages as built-in definitions.
    pub fn register(&self, registry: &LanguageRegistry) {
        registry.register_builtin(
            LanguageIdentity::grammar(),
            self.grammar.clone(),
            Some(GRAMMAR_STYLE),
        );
        registry.register_builtin(
            LanguageIdentity::cross_reference(),
            self.cross_reference.clone(),
            Some(CROSS_REFERENCE_STYLE),
        );
        registry.register_builtin(
            LanguageIdentity::style(),
            self.style.clone(),
            Some(STYLE_STYLE),
        );
        tracing::debug!("registered meta languages");
    }
}

fn first<'a>(structure: &'a AsmStructure, property: &str) -> Option<&'a AsmPrimitive> {
    primitives(structure.property(property)).next()
}

/// Every structure below `structure`, itself included.
fn descendants<'a>(structure: &'a AsmStructure, out: &mut Vec<&'a AsmStructure>) {
    out.push(structure);
    for property in &structure.properties {
        let mut pending = vec![&property.value];
        while let Some(value) = pending.pop() {
            match value {
                AsmValue::Structure(s) => descendants(s, out),
                AsmValue::List(items) => pending.extend(items.iter().rev()),
                AsmValue::Nothing | AsmValue::Primitive(_) => {}
            }
        }
    }
}

fn error(location: &AsmPrimitive, message: String) -> LanguageIssue {
    LanguageIssue::error(Phase::SemanticAnalysis, location.location, message)
}

/// Checks of a grammar text: duplicate grammars and rules, unknown base grammars and undefined
/// rule references. With the registry as context, also reports which languages use each
/// grammar.
pub(crate) fn check_grammar(asm: &Asm, context: &AnalysisContext) -> Vec<LanguageIssue> {
    let mut issues = Vec::new();
    for unit in &asm.roots {
        let namespace = unit
            .property("namespace")
            .and_then(AsmValue::as_structure)
            .and_then(|n| n.property("qualified_name"))
            .and_then(AsmValue::as_str)
            .unwrap_or_default();
        let grammars: Vec<&AsmStructure> = structures(unit.property("grammar")).collect();

        let mut seen = BTreeSet::new();
        for grammar in &grammars {
            let Some(name) = first(grammar, "identifier") else {
                continue;
            };
            if !seen.insert(name.value.as_str()) {
                issues.push(error(
                    name,
                    format!(
                        "Grammar '{}' is already defined in namespace '{namespace}'",
                        name.value
                    ),
                ));
            }
        }

        for grammar in &grammars {
            check_rules(grammar, &grammars, &mut issues);
        }

        if let AnalysisContext::Registry(registry) = context {
            for grammar in &grammars {
                if let Some(name) = first(grammar, "identifier") {
                    report_registrations(registry, namespace, name, &mut issues);
                }
            }
        }
    }
    issues
}

fn find_grammar<'a>(grammars: &[&'a AsmStructure], name: &str) -> Option<&'a AsmStructure> {
    let simple = name.rsplit('.').next().unwrap_or(name);
    grammars
        .iter()
        .copied()
        .find(|g| first(g, "identifier").is_some_and(|id| id.value == simple))
}

fn rules_of(grammar: &AsmStructure) -> impl Iterator<Item = &AsmStructure> {
    structures(grammar.property("rule"))
}

fn check_rules(grammar: &AsmStructure, all: &[&AsmStructure], issues: &mut Vec<LanguageIssue>) {
    let grammar_name = first(grammar, "identifier").map_or("", |p| p.value.as_str());

    let mut own = BTreeSet::new();
    for rule in rules_of(grammar) {
        let Some(name) = first(rule, "identifier") else {
            continue;
        };
        if !own.insert(name.value.as_str()) {
            issues.push(error(
                name,
                format!(
                    "Rule '{}' is already defined in grammar '{grammar_name}'",
                    name.value
                ),
            ));
        }
    }

    let mut available = own.clone();
    let mut visited = BTreeSet::from([grammar_name]);
    let mut pending = vec![grammar];
    while let Some(current) = pending.pop() {
        let bases = current
            .property("extends")
            .and_then(AsmValue::as_structure)
            .map(|e| primitives(e.property("qualified_name")).collect::<Vec<_>>())
            .unwrap_or_default();
        for base in bases {
            match find_grammar(all, &base.value) {
                Some(found) => {
                    let name = first(found, "identifier").map_or("", |p| p.value.as_str());
                    if visited.insert(name) {
                        available.extend(
                            rules_of(found)
                                .filter_map(|r| first(r, "identifier"))
                                .map(|p| p.value.as_str()),
                        );
                        pending.push(found);
                    }
                }
                None if std::ptr::eq(current, grammar) => issues.push(error(
                    base,
                    format!("Grammar '{}' not found", base.value),
                )),
                None => {}
            }
        }
    }

    for rule in rules_of(grammar) {
        let mut nodes = Vec::new();
        descendants(rule, &mut nodes);
        for reference in nodes.into_iter().filter(|s| s.type_name == "NonTerminal") {
            let Some(name) = first(reference, "identifier") else {
                continue;
            };
            if !available.contains(name.value.as_str()) {
                issues.push(error(
                    name,
                    format!(
                        "Rule '{}' not found in grammar '{grammar_name}'",
                        name.value
                    ),
                ));
            }
        }
    }
}

fn report_registrations(
    registry: &LanguageRegistry,
    namespace: &str,
    name: &AsmPrimitive,
    issues: &mut Vec<LanguageIssue>,
) {
    let qualified = format!("{namespace}.{}", name.value);
    for definition in registry.definitions() {
        let Some(text) = definition.grammar() else {
            continue;
        };
        let Ok(source) = GrammarSource::read(&text) else {
            continue;
        };
        if source
            .grammars
            .iter()
            .any(|g| source.qualified_name(g) == qualified)
        {
            issues.push(LanguageIssue::information(
                Phase::SemanticAnalysis,
                name.location,
                format!(
                    "Grammar '{qualified}' is registered as language '{}'",
                    definition.identity()
                ),
            ));
        }
    }
}

/// Checks of a cross-reference text against the type model given as context.
pub(crate) fn check_cross_reference(asm: &Asm, context: &AnalysisContext) -> Vec<LanguageIssue> {
    let AnalysisContext::TypeModel(types) = context else {
        return Vec::new();
    };
    check_declarations(asm, types)
        .into_iter()
        .map(|(location, message)| {
            LanguageIssue::error(Phase::SemanticAnalysis, location, message)
        })
        .collect()
}
