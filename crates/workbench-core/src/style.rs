//! Style selector to rendering-class mapping.
//!
//! Each endpoint keeps one [`StyleHandler`] so class names stay stable across re-styling: a
//! selector that was once given `wb_lang-3` keeps it until [`StyleHandler::reset`].

use crate::identity::LanguageIdentity;
use crate::processor::{Leaf, StyleModel};
use crate::token::AglToken;
use std::collections::HashMap;

/// Maps style selectors (literals, patterns, rule names, meta tags) to class names.
#[derive(Debug, Clone)]
pub struct StyleHandler {
    language: LanguageIdentity,
    prefix: String,
    class_prefix: String,
    next_class: usize,
    selector_to_class: HashMap<String, String>,
}

impl StyleHandler {
    /// Class for text with no matching style.
    pub const NO_STYLE: &'static str = "nostyle";

    /// Create a handler for `language` with class-name prefix `prefix`.
    pub fn new(language: LanguageIdentity, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let mut handler = Self {
            class_prefix: Self::language_class(&prefix, &language),
            language,
            prefix,
            next_class: 1,
            selector_to_class: HashMap::new(),
        };
        handler.reset();
        handler
    }

    /// `<prefix>_<language>` with characters outside `[A-Za-z0-9_-]` replaced by `_`.
    pub fn language_class(prefix: &str, language: &LanguageIdentity) -> String {
        let sanitized: String = language
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{prefix}_{sanitized}")
    }

    /// The language the classes are named after.
    pub fn language(&self) -> &LanguageIdentity {
        &self.language
    }

    /// Get (or allocate) the class for a selector.
    pub fn map_class(&mut self, selector: &str) -> String {
        if let Some(class) = self.selector_to_class.get(selector) {
            return class.clone();
        }
        let class = format!("{}-{}", self.class_prefix, self.next_class);
        self.next_class += 1;
        self.selector_to_class
            .insert(selector.to_string(), class.clone());
        class
    }

    /// Look up the class for a selector without allocating.
    pub fn class_for(&self, selector: &str) -> Option<&str> {
        self.selector_to_class.get(selector).map(String::as_str)
    }

    /// Allocate classes for every selector of `model`. Existing classes are kept.
    pub fn update_style_model(&mut self, model: &StyleModel) {
        for selector in model.all_selectors() {
            self.map_class(selector);
        }
    }

    /// Resolve leaves to tokens.
    ///
    /// Classes come from the leaf's meta tags, then from its tags (or its name when it has no
    /// tags). Selectors without a class are ignored; a leaf with no class at all gets
    /// [`StyleHandler::NO_STYLE`].
    pub fn transform_to_tokens(&self, leaves: &[Leaf]) -> Vec<AglToken> {
        leaves
            .iter()
            .map(|leaf| AglToken::new(self.classes_for(leaf), leaf.position, leaf.length))
            .collect()
    }

    fn classes_for(&self, leaf: &Leaf) -> Vec<String> {
        let meta = leaf.meta_tags.iter().filter_map(|t| self.class_for(t));
        let classes: Vec<String> = if leaf.tags.is_empty() {
            meta.chain(self.class_for(&leaf.name))
                .map(str::to_string)
                .collect()
        } else {
            meta.chain(leaf.tags.iter().filter_map(|t| self.class_for(t)))
                .map(str::to_string)
                .collect()
        };

        if classes.is_empty() {
            vec![Self::NO_STYLE.to_string()]
        } else {
            classes
        }
    }

    /// Forget every class. Tokens produced before a reset must be recomputed.
    pub fn reset(&mut self) {
        self.selector_to_class.clear();
        self.next_class = 1;
        self.selector_to_class
            .insert(StyleModel::NO_STYLE.to_string(), Self::NO_STYLE.to_string());
    }

    /// Reset and rename classes after another language.
    pub fn rebind(&mut self, language: LanguageIdentity) {
        self.class_prefix = Self::language_class(&self.prefix, &language);
        self.language = language;
        self.reset();
    }
}
