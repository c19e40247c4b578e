//! Style sheets: extraction of a [`StyleModel`] from the ASM of a style text.
//!
//! ```text
//! namespace test
//! styles Hello {
//!     'Hello', $keyword { foreground: darkgreen; font-weight: bold; }
//!     NAME { foreground: blue; }
//! }
//! ```
//!
//! Selectors are written the way leaves are named: `'literal'`, `"pattern"`, a rule name, or a
//! `$meta` tag. The `styles Name { .. }` wrapper is optional.

use crate::xref::{primitives, structures};
use workbench_core::{
    Asm, AsmValue, SelectorKind, StyleDeclaration, StyleModel, StyleRule, StyleSelector,
};

/// Build the style model of a style-sheet ASM. Rules keep their source order.
pub fn style_model_from_asm(asm: &Asm) -> StyleModel {
    let mut rules = Vec::new();
    asm.walk(|s| {
        if s.type_name != "Rule" {
            return;
        }
        let selectors = s
            .property("selectorList")
            .and_then(AsmValue::as_structure)
            .map(|list| {
                primitives(list.property("selector"))
                    .map(|p| selector(&p.value))
                    .collect()
            })
            .unwrap_or_default();
        let declarations = structures(s.property("declaration"))
            .filter_map(|d| {
                let name = d.property("style_name").and_then(AsmValue::as_str)?;
                let value = d.property("value").and_then(AsmValue::as_str)?;
                Some(StyleDeclaration {
                    name: name.trim().to_string(),
                    value: value.trim().to_string(),
                })
            })
            .collect();
        rules.push(StyleRule {
            selectors,
            declarations,
        });
    });
    StyleModel { rules }
}

fn selector(text: &str) -> StyleSelector {
    let (value, kind) = match text.chars().next() {
        Some('\'') => {
            let inner = text
                .strip_prefix('\'')
                .and_then(|t| t.strip_suffix('\''))
                .unwrap_or(text);
            (format!("'{}'", unescape(inner)), SelectorKind::Literal)
        }
        Some('"') => (text.replace("\\\"", "\""), SelectorKind::Pattern),
        Some('$') => (text.to_string(), SelectorKind::Meta),
        _ => (text.to_string(), SelectorKind::RuleName),
    };
    StyleSelector { value, kind }
}

/// Undo `\\` and `\'` escapes of a quoted literal.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            c => out.push(c),
        }
    }
    out
}
