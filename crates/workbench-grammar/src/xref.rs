//! Cross-reference declarations and their resolution.
//!
//! A cross-reference text says which ASM types introduce names (`identify Type by property`)
//! and which properties refer to them (`in Type { property p refers-to A | B }`). Scopes are
//! flat: every identified name is visible from everywhere in the sentence.

use std::collections::{BTreeMap, BTreeSet};
use workbench_core::{
    Asm, AsmPrimitive, AsmStructure, AsmValue, CancelToken, InputLocation, LanguageIssue, Phase,
    ProcessorResult, TypeModel,
};

/// `identify <type_name> by <property>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    /// Type whose instances introduce a name.
    pub type_name: String,
    /// Property holding the name.
    pub property: String,
}

/// `in <type_name> { property <property> refers-to <targets> }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDeclaration {
    /// Type holding the reference.
    pub type_name: String,
    /// Property holding the referring value.
    pub property: String,
    /// Types the value may refer to.
    pub targets: Vec<String>,
}

/// The compiled cross-reference declarations of a language.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CrossReferenceModel {
    /// Declared namespace, if any.
    pub namespace: Option<String>,
    /// Name-introducing types.
    pub identify: Vec<Identification>,
    /// Referring properties.
    pub references: Vec<ReferenceDeclaration>,
}

impl CrossReferenceModel {
    /// Extract the declarations from the ASM of a cross-reference text.
    pub fn from_asm(asm: &Asm) -> Self {
        let mut model = CrossReferenceModel::default();
        asm.walk(|s| match s.type_name.as_str() {
            "Namespace" => model.namespace = text(s, "qualifiedName"),
            "Identify" => {
                if let (Some(type_name), Some(property)) =
                    (text(s, "typeName"), text(s, "propertyName"))
                {
                    model.identify.push(Identification {
                        type_name,
                        property,
                    });
                }
            }
            "ReferenceGroup" => {
                let Some(type_name) = text(s, "typeName") else {
                    return;
                };
                for reference in structures(s.property("reference")) {
                    let Some(property) = text(reference, "propertyName") else {
                        continue;
                    };
                    let targets = reference
                        .property("typeList")
                        .and_then(AsmValue::as_structure)
                        .map(|list| {
                            primitives(list.property("typeName"))
                                .map(|p| p.value.clone())
                                .collect()
                        })
                        .unwrap_or_default();
                    model.references.push(ReferenceDeclaration {
                        type_name: type_name.clone(),
                        property,
                        targets,
                    });
                }
            }
            _ => {}
        });
        model
    }

    /// Whether nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.identify.is_empty() && self.references.is_empty()
    }
}

fn text(structure: &AsmStructure, property: &str) -> Option<String> {
    structure
        .property(property)
        .and_then(AsmValue::as_str)
        .map(str::to_string)
}

/// Primitives held by a property, whether single or a list.
pub(crate) fn primitives(value: Option<&AsmValue>) -> impl Iterator<Item = &AsmPrimitive> {
    let items: Vec<&AsmPrimitive> = match value {
        Some(AsmValue::Primitive(p)) => vec![p],
        Some(AsmValue::List(items)) => items
            .iter()
            .filter_map(|v| match v {
                AsmValue::Primitive(p) => Some(p),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    items.into_iter()
}

/// Structures held by a property, whether single or a list.
pub(crate) fn structures(value: Option<&AsmValue>) -> impl Iterator<Item = &AsmStructure> {
    let items: Vec<&AsmStructure> = match value {
        Some(AsmValue::Structure(s)) => vec![s],
        Some(AsmValue::List(items)) => items.iter().filter_map(AsmValue::as_structure).collect(),
        _ => Vec::new(),
    };
    items.into_iter()
}

/// Resolve every referring value of `asm` against the names it identifies.
///
/// An unresolved value yields an error located at the value.
pub fn resolve_references(
    model: &CrossReferenceModel,
    asm: &Asm,
    cancel: &CancelToken,
) -> ProcessorResult<Vec<LanguageIssue>> {
    if model.is_empty() {
        return Ok(Vec::new());
    }

    let mut all = Vec::new();
    asm.walk(|s| all.push(s));

    let mut scope: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for structure in &all {
        cancel.check()?;
        for identify in model
            .identify
            .iter()
            .filter(|i| i.type_name == structure.type_name)
        {
            for name in primitives(structure.property(&identify.property)) {
                scope
                    .entry(structure.type_name.as_str())
                    .or_default()
                    .insert(name.value.as_str());
            }
        }
    }

    let mut issues = Vec::new();
    for structure in &all {
        cancel.check()?;
        for reference in model
            .references
            .iter()
            .filter(|r| r.type_name == structure.type_name)
        {
            for value in primitives(structure.property(&reference.property)) {
                let found = reference.targets.iter().any(|target| {
                    scope
                        .get(target.as_str())
                        .is_some_and(|names| names.contains(value.value.as_str()))
                });
                if !found {
                    issues.push(LanguageIssue::error(
                        Phase::SemanticAnalysis,
                        value.location,
                        format!(
                            "No target of type(s) [{}] found for referring value '{}'",
                            reference.targets.join(", "),
                            value.value
                        ),
                    ));
                }
            }
        }
    }
    Ok(issues)
}

/// Problems of a cross-reference ASM against the type model of the language it refers to.
///
/// Every type and property named by the declarations must exist in `types`.
pub(crate) fn check_declarations(
    asm: &Asm,
    types: &TypeModel,
) -> Vec<(Option<InputLocation>, String)> {
    let model_name = format!("{}.{}", types.namespace, types.name);
    let mut problems = Vec::new();

    let check_type = |p: &AsmPrimitive, problems: &mut Vec<(Option<InputLocation>, String)>| {
        let found = types.find_type(&p.value).is_some();
        if !found {
            problems.push((
                p.location,
                format!("Type '{}' not found in type model '{model_name}'", p.value),
            ));
        }
        found
    };
    let check_property = |type_name: &str,
                          p: &AsmPrimitive,
                          problems: &mut Vec<(Option<InputLocation>, String)>| {
        let exists = types
            .find_type(type_name)
            .is_some_and(|t| t.property(&p.value).is_some());
        if !exists {
            problems.push((
                p.location,
                format!("Property '{}' not found on type '{type_name}'", p.value),
            ));
        }
    };

    asm.walk(|s| match s.type_name.as_str() {
        "Identify" => {
            let Some(type_name) = primitives(s.property("typeName")).next() else {
                return;
            };
            if check_type(type_name, &mut problems) {
                for property in primitives(s.property("propertyName")) {
                    check_property(&type_name.value, property, &mut problems);
                }
            }
        }
        "ReferenceGroup" => {
            let Some(type_name) = primitives(s.property("typeName")).next() else {
                return;
            };
            let known = check_type(type_name, &mut problems);
            for reference in structures(s.property("reference")) {
                if known {
                    for property in primitives(reference.property("propertyName")) {
                        check_property(&type_name.value, property, &mut problems);
                    }
                }
                let targets = reference
                    .property("typeList")
                    .and_then(AsmValue::as_structure);
                for target in targets.into_iter().flat_map(|l| primitives(l.property("typeName"))) {
                    check_type(target, &mut problems);
                }
            }
        }
        _ => {}
    });
    problems
}
