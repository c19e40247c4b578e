//! Type model derivation and the default parse-tree to ASM transformation.
//!
//! Every non-terminal rule becomes a type named after the rule (first letter upper-cased) whose
//! properties are the rules and named terminals it refers to. A rule that is a choice between
//! single references is *transparent*: it gets no type and passes its alternative's value
//! through. Anonymous literals and patterns carry no value.

use crate::grammar::compiler::{CompiledGrammar, Expr, RuleId};
use workbench_core::{
    Asm, AsmPrimitive, AsmProperty, AsmStructure, AsmValue, ParseNode, ParseTree,
    PropertyDefinition, Sentence, TypeDefinition, TypeModel,
};

/// Type used for properties holding leaf text.
pub const STRING_TYPE: &str = "String";

/// `document` -> `Document`.
pub fn type_name(rule: &str) -> String {
    let mut chars = rule.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `NAME` -> `name`, `typeName` -> `typeName`, `Rule` -> `rule`.
pub fn property_name(rule: &str) -> String {
    if !rule.chars().any(char::is_lowercase) {
        return rule.to_lowercase();
    }
    let mut chars = rule.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_anonymous(terminal_name: &str) -> bool {
    terminal_name.starts_with('\'') || terminal_name.starts_with('"')
}

/// Whether a rule is a choice between at least two single references.
pub fn is_transparent(grammar: &CompiledGrammar, id: RuleId) -> bool {
    match &grammar.rule(id).expr {
        Expr::Choice(items) => {
            items.len() > 1
                && items
                    .iter()
                    .all(|i| matches!(i, Expr::Terminal(_) | Expr::Rule(_)))
        }
        _ => false,
    }
}

/// Derive the type model of a compiled grammar.
pub fn derive_type_model(grammar: &CompiledGrammar) -> TypeModel {
    let mut types = Vec::new();
    for (id, rule) in grammar.rules().iter().enumerate() {
        if rule.is_terminal() || rule.is_skip || is_transparent(grammar, id) {
            continue;
        }
        let mut properties = Vec::new();
        collect_properties(grammar, &rule.expr, false, &mut properties);
        types.push(TypeDefinition {
            name: type_name(&rule.name),
            properties,
        });
    }

    TypeModel {
        namespace: grammar.namespace().to_string(),
        name: grammar.name().to_string(),
        types,
    }
}

fn collect_properties(
    grammar: &CompiledGrammar,
    expr: &Expr,
    in_collection: bool,
    out: &mut Vec<PropertyDefinition>,
) {
    match expr {
        Expr::Empty => {}
        Expr::Terminal(id) => {
            let terminal = grammar.terminal(*id);
            if !terminal.is_skip && !is_anonymous(&terminal.name) {
                add_property(out, property_name(&terminal.name), STRING_TYPE, in_collection);
            }
        }
        Expr::Rule(id) => {
            let rule = grammar.rule(*id);
            let value_type = if is_transparent(grammar, *id) && only_terminals(&rule.expr) {
                STRING_TYPE.to_string()
            } else {
                type_name(&rule.name)
            };
            add_property(out, property_name(&rule.name), &value_type, in_collection);
        }
        Expr::Sequence(items) | Expr::Choice(items) => {
            for item in items {
                collect_properties(grammar, item, in_collection, out);
            }
        }
        Expr::Optional(item) => collect_properties(grammar, item, in_collection, out),
        Expr::Repeat { item, .. } => collect_properties(grammar, item, true, out),
        Expr::SeparatedList {
            item, separator, ..
        } => {
            collect_properties(grammar, item, true, out);
            collect_properties(grammar, separator, true, out);
        }
    }
}

/// A property referenced twice is a collection.
fn add_property(out: &mut Vec<PropertyDefinition>, name: String, type_name: &str, collection: bool) {
    match out.iter_mut().find(|p| p.name == name) {
        Some(existing) => existing.is_collection = true,
        None => out.push(PropertyDefinition {
            name,
            type_name: type_name.to_string(),
            is_collection: collection,
        }),
    }
}

fn only_terminals(expr: &Expr) -> bool {
    match expr {
        Expr::Choice(items) => items.iter().all(|i| matches!(i, Expr::Terminal(_))),
        _ => false,
    }
}

/// Build the ASM of a parse tree.
pub fn build_asm(grammar: &CompiledGrammar, model: &TypeModel, tree: &ParseTree) -> Asm {
    let text: String = tree.leaves().iter().map(|l| l.text.as_str()).collect();
    let builder = AsmBuilder {
        grammar,
        model,
        sentence: Sentence::new(&text),
    };

    let roots = match builder.value(&tree.root) {
        AsmValue::Structure(root) => vec![root],
        AsmValue::List(items) => items
            .into_iter()
            .filter_map(|v| match v {
                AsmValue::Structure(s) => Some(s),
                _ => None,
            })
            .collect(),
        AsmValue::Nothing | AsmValue::Primitive(_) => Vec::new(),
    };
    Asm { roots }
}

struct AsmBuilder<'a> {
    grammar: &'a CompiledGrammar,
    model: &'a TypeModel,
    sentence: Sentence,
}

impl AsmBuilder<'_> {
    fn value(&self, node: &ParseNode) -> AsmValue {
        let branch = match node {
            ParseNode::Leaf(leaf) => {
                return AsmValue::Primitive(AsmPrimitive {
                    value: leaf.text.clone(),
                    location: Some(self.sentence.location(leaf.position, leaf.length)),
                });
            }
            ParseNode::Branch(branch) => branch,
        };

        let Some(id) = self.grammar.find_rule(&branch.name) else {
            return AsmValue::Nothing;
        };
        let mut children = branch.children.iter().filter(|c| !is_skip(c));

        if self.grammar.rule(id).is_terminal() || is_transparent(self.grammar, id) {
            return children
                .next()
                .map_or(AsmValue::Nothing, |child| self.value(child));
        }

        let Some(definition) = self.model.find_type(&type_name(&branch.name)) else {
            return AsmValue::Nothing;
        };

        let mut values: Vec<Vec<AsmValue>> = vec![Vec::new(); definition.properties.len()];
        for child in children {
            let key = match child {
                ParseNode::Leaf(leaf) if is_anonymous(&leaf.name) => continue,
                ParseNode::Leaf(leaf) => property_name(&leaf.name),
                ParseNode::Branch(inner) => property_name(&inner.name),
            };
            if let Some(index) = definition.properties.iter().position(|p| p.name == key) {
                values[index].push(self.value(child));
            }
        }

        let properties = definition
            .properties
            .iter()
            .zip(values)
            .map(|(property, values)| AsmProperty {
                name: property.name.clone(),
                value: if property.is_collection {
                    AsmValue::List(values)
                } else {
                    values.into_iter().next().unwrap_or(AsmValue::Nothing)
                },
            })
            .collect();

        let (start, end) = content_span(node).unwrap_or((branch.position, branch.position));
        AsmValue::Structure(AsmStructure {
            type_name: definition.name.clone(),
            location: Some(self.sentence.location(start, end - start)),
            properties,
        })
    }
}

fn is_skip(node: &ParseNode) -> bool {
    matches!(node, ParseNode::Leaf(leaf) if leaf.is_skip)
}

/// Span from the first to the last non-skip leaf.
fn content_span(node: &ParseNode) -> Option<(usize, usize)> {
    match node {
        ParseNode::Leaf(leaf) if leaf.is_skip => None,
        ParseNode::Leaf(leaf) => Some((leaf.position, leaf.end())),
        ParseNode::Branch(branch) => {
            let mut spans = branch.children.iter().filter_map(content_span);
            let first = spans.next()?;
            let last = spans.last().unwrap_or(first);
            Some((first.0, last.1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::engine::parse;
    use pretty_assertions::assert_eq;
    use workbench_core::CancelToken;

    const DECLS: &str = r#"
        namespace test
        grammar Decls {
            skip leaf WS = "\s+" ;
            unit = declaration* ;
            declaration = variable | alias ;
            variable = 'var' NAME ':' typeRef ;
            alias = 'alias' NAME '=' [typeRef / '|']+ ;
            typeRef = NAME modifier? ;
            modifier = '?' | '!' ;
            leaf NAME = "[A-Za-z]+" ;
        }
    "#;

    fn asm_of(grammar: &CompiledGrammar, text: &str) -> Asm {
        let tree = parse(grammar, text, grammar.default_goal(), &CancelToken::none())
            .unwrap()
            .unwrap();
        build_asm(grammar, &derive_type_model(grammar), &tree)
    }

    #[test]
    fn test_naming() {
        assert_eq!(type_name("document"), "Document");
        assert_eq!(property_name("NAME"), "name");
        assert_eq!(property_name("STYLE_NAME"), "style_name");
        assert_eq!(property_name("typeRef"), "typeRef");
        assert_eq!(property_name("Declaration"), "declaration");
    }

    #[test]
    fn test_type_model() {
        let grammar = CompiledGrammar::compile(DECLS).unwrap();
        let model = derive_type_model(&grammar);
        let names: Vec<&str> = model.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Unit", "Variable", "Alias", "TypeRef"]);

        let unit = model.find_type("Unit").unwrap();
        assert_eq!(
            unit.properties,
            vec![PropertyDefinition {
                name: "declaration".to_string(),
                type_name: "Declaration".to_string(),
                is_collection: true,
            }]
        );

        let alias = model.find_type("Alias").unwrap();
        assert_eq!(alias.property("name").map(|p| p.is_collection), Some(false));
        assert_eq!(alias.property("typeRef").map(|p| p.is_collection), Some(true));

        let type_ref = model.find_type("TypeRef").unwrap();
        assert_eq!(
            type_ref.property("modifier").map(|p| p.type_name.as_str()),
            Some(STRING_TYPE)
        );
    }

    #[test]
    fn test_asm_structures_and_transparent_rules() {
        let grammar = CompiledGrammar::compile(DECLS).unwrap();
        let asm = asm_of(&grammar, "var x : Int?\nalias T = A | B");

        assert_eq!(asm.roots.len(), 1);
        let unit = &asm.roots[0];
        let Some(AsmValue::List(declarations)) = unit.property("declaration") else {
            panic!("declarations missing");
        };
        assert_eq!(declarations.len(), 2);

        let variable = declarations[0].as_structure().unwrap();
        assert_eq!(variable.type_name, "Variable");
        assert_eq!(variable.property("name").and_then(AsmValue::as_str), Some("x"));
        let type_ref = variable
            .property("typeRef")
            .and_then(AsmValue::as_structure)
            .unwrap();
        assert_eq!(type_ref.property("modifier").and_then(AsmValue::as_str), Some("?"));

        let alias = declarations[1].as_structure().unwrap();
        let Some(AsmValue::List(targets)) = alias.property("typeRef") else {
            panic!("alias targets missing");
        };
        let names: Vec<&str> = targets
            .iter()
            .filter_map(|t| t.as_structure()?.property("name")?.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B"]);

        let location = alias.location.unwrap();
        assert_eq!((location.line, location.column, location.length), (1, 0, 15));
        assert_eq!(asm.structure_count(), 6);
    }

    #[test]
    fn test_missing_optional_is_nothing() {
        let grammar = CompiledGrammar::compile(DECLS).unwrap();
        let asm = asm_of(&grammar, "var x : Int");
        let mut modifiers = Vec::new();
        asm.walk(|s| {
            if s.type_name == "TypeRef" {
                modifiers.push(s.property("modifier").cloned());
            }
        });
        assert_eq!(modifiers, vec![Some(AsmValue::Nothing)]);
    }
}
