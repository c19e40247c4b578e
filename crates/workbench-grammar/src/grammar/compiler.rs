use crate::grammar::definition::{GrammarDefinition, GrammarSource, RuleDefinition, RuleItem};
use crate::grammar::error::GrammarError;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use workbench_core::{Matchable, MatchableKind};

/// Index of a rule in [`CompiledGrammar::rules`].
pub type RuleId = usize;
/// Index of a terminal in [`CompiledGrammar::terminals`].
pub type TerminalId = usize;

#[derive(Debug, Clone)]
/// A compiled grammar: rules resolved to indices and terminals compiled to regexes.
///
/// This is the runtime representation consumed by the scanner and the parser.
pub struct CompiledGrammar {
    namespace: String,
    name: String,
    rules: Vec<CompiledRule>,
    rule_index: HashMap<String, RuleId>,
    terminals: Vec<Terminal>,
    skip_terminals: Vec<TerminalId>,
    default_goal: RuleId,
}

#[derive(Debug, Clone)]
/// A rule after name resolution.
pub struct CompiledRule {
    /// Rule name.
    pub name: String,
    /// What the rule matches. Leaf and skip rules match their own terminal.
    pub expr: Expr,
    /// Skip rule.
    pub is_skip: bool,
    /// The terminal of a leaf or skip rule.
    pub terminal: Option<TerminalId>,
    /// Whether the rule can match without consuming input.
    pub nullable: bool,
}

impl CompiledRule {
    /// Leaf and skip rules are terminals; everything else produces a branch.
    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Compiled right-hand side.
pub enum Expr {
    /// Matches nothing.
    Empty,
    /// A terminal.
    Terminal(TerminalId),
    /// A non-terminal rule.
    Rule(RuleId),
    /// Sequence.
    Sequence(Vec<Expr>),
    /// Ordered choice.
    Choice(Vec<Expr>),
    /// Optional item.
    Optional(Box<Expr>),
    /// Repetition with a minimum count.
    Repeat {
        /// Repeated item.
        item: Box<Expr>,
        /// Minimum number of matches.
        min: usize,
    },
    /// Separated list with a minimum count.
    SeparatedList {
        /// List item.
        item: Box<Expr>,
        /// Separator.
        separator: Box<Expr>,
        /// Minimum number of items.
        min: usize,
    },
}

#[derive(Debug, Clone)]
/// A terminal the scanner and the parser match.
pub struct Terminal {
    /// Leaf name: the rule name for leaf rules, `'text'` / `"pattern"` for anonymous ones.
    pub name: String,
    /// Literal or pattern.
    pub kind: MatchableKind,
    /// Literal text or regex source.
    pub expression: String,
    /// Produced by a skip rule.
    pub is_skip: bool,
    /// An identifier-like literal: it only matches at a word boundary.
    pub is_keyword: bool,
    regex: Option<Regex>,
}

impl Terminal {
    fn literal(name: String, text: String, is_skip: bool) -> Self {
        let is_keyword = is_identifier(&text);
        Self {
            name,
            kind: MatchableKind::Literal,
            expression: text,
            is_skip,
            is_keyword,
            regex: None,
        }
    }

    fn pattern(name: String, source: String, is_skip: bool) -> Result<Self, GrammarError> {
        let regex = Regex::new(&format!("^(?:{source})")).map_err(|e| {
            GrammarError::RegexCompile {
                pattern: source.clone(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            name,
            kind: MatchableKind::Pattern,
            expression: source,
            is_skip,
            is_keyword: false,
            regex: Some(regex),
        })
    }

    /// Byte length of the match starting at byte offset `at`, if any.
    pub fn match_at(&self, text: &str, at: usize) -> Option<usize> {
        let rest = text.get(at..)?;
        let len = match &self.regex {
            Some(regex) => regex.find(rest)?.end(),
            None => {
                if !rest.starts_with(self.expression.as_str()) {
                    return None;
                }
                self.expression.len()
            }
        };
        if self.is_keyword
            && rest[len..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            return None;
        }
        Some(len)
    }

    /// Whether the terminal can match the empty string.
    pub fn is_nullable(&self) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(""),
            None => self.expression.is_empty(),
        }
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl CompiledGrammar {
    /// Read and compile grammar text.
    pub fn compile(text: &str) -> Result<Self, GrammarError> {
        let source = GrammarSource::read(text)?;
        Self::from_source(&source)
    }

    /// Compile the goal grammar (the last one) of a read grammar text.
    pub fn from_source(source: &GrammarSource) -> Result<Self, GrammarError> {
        let goal = source.goal().ok_or(GrammarError::NoGrammar)?;
        let definitions = effective_rules(source, goal, &mut Vec::new())?;

        let rule_index: HashMap<String, RuleId> = definitions
            .iter()
            .enumerate()
            .map(|(id, def)| (def.name.clone(), id))
            .collect();
        let by_name: HashMap<&str, &RuleDefinition> =
            definitions.iter().map(|d| (d.name.as_str(), *d)).collect();

        let mut builder = Builder {
            terminals: Vec::new(),
            anonymous: HashMap::new(),
            rule_terminals: vec![None; definitions.len()],
            rule_index: &rule_index,
            by_name: &by_name,
        };

        // Named terminals first, in rule order.
        for (id, def) in definitions.iter().enumerate() {
            if def.is_leaf || def.is_skip {
                let terminal = builder.named_terminal(def)?;
                builder.rule_terminals[id] = Some(terminal);
            }
        }

        let mut rules = Vec::with_capacity(definitions.len());
        for (id, def) in definitions.iter().enumerate() {
            let terminal = builder.rule_terminals[id];
            let expr = match terminal {
                Some(terminal) => Expr::Terminal(terminal),
                None => builder.expr(&def.rhs, &def.name)?,
            };
            rules.push(CompiledRule {
                name: def.name.clone(),
                expr,
                is_skip: def.is_skip,
                terminal,
                nullable: false,
            });
        }
        let terminals = builder.terminals;

        let default_goal = rules
            .iter()
            .position(|r| !r.is_terminal())
            .ok_or_else(|| GrammarError::MissingGoal(goal.name.clone()))?;

        let skip_terminals = terminals
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_skip)
            .map(|(id, _)| id)
            .collect();

        let mut grammar = Self {
            namespace: source.namespace.clone(),
            name: goal.name.clone(),
            rules,
            rule_index,
            terminals,
            skip_terminals,
            default_goal,
        };
        grammar.compute_nullable();
        grammar.check_left_recursion()?;

        tracing::trace!(
            grammar = %grammar.qualified_name(),
            rules = grammar.rules.len(),
            terminals = grammar.terminals.len(),
            "compiled grammar"
        );
        Ok(grammar)
    }

    /// Grammar namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Goal grammar name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `namespace.Name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// All rules, inherited ones included.
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// A rule by id.
    pub fn rule(&self, id: RuleId) -> &CompiledRule {
        &self.rules[id]
    }

    /// Look up a rule by name.
    pub fn find_rule(&self, name: &str) -> Option<RuleId> {
        self.rule_index.get(name).copied()
    }

    /// All terminals, named ones first.
    pub fn terminals(&self) -> &[Terminal] {
        &self.terminals
    }

    /// A terminal by id.
    pub fn terminal(&self, id: TerminalId) -> &Terminal {
        &self.terminals[id]
    }

    /// Terminals produced by skip rules.
    pub fn skip_terminals(&self) -> &[TerminalId] {
        &self.skip_terminals
    }

    /// The first non-terminal rule of the goal grammar.
    pub fn default_goal(&self) -> RuleId {
        self.default_goal
    }

    /// Scanner terminals as reported to editors.
    pub fn matchables(&self) -> Vec<Matchable> {
        self.terminals
            .iter()
            .map(|t| Matchable {
                name: t.name.clone(),
                kind: t.kind,
                expression: t.expression.clone(),
                is_skip: t.is_skip,
            })
            .collect()
    }

    /// Whether `expr` can match without consuming input.
    pub fn is_nullable(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Empty => true,
            Expr::Terminal(t) => self.terminals[*t].is_nullable(),
            Expr::Rule(r) => self.rules[*r].nullable,
            Expr::Sequence(items) => items.iter().all(|i| self.is_nullable(i)),
            Expr::Choice(items) => items.iter().any(|i| self.is_nullable(i)),
            Expr::Optional(_) => true,
            Expr::Repeat { item, min } | Expr::SeparatedList { item, min, .. } => {
                *min == 0 || self.is_nullable(item)
            }
        }
    }

    fn compute_nullable(&mut self) {
        loop {
            let mut changed = false;
            for id in 0..self.rules.len() {
                if !self.rules[id].nullable && self.is_nullable(&self.rules[id].expr) {
                    self.rules[id].nullable = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn left_rules(&self, expr: &Expr, out: &mut Vec<RuleId>) {
        match expr {
            Expr::Empty | Expr::Terminal(_) => {}
            Expr::Rule(r) => out.push(*r),
            Expr::Sequence(items) => {
                for item in items {
                    self.left_rules(item, out);
                    if !self.is_nullable(item) {
                        break;
                    }
                }
            }
            Expr::Choice(items) => items.iter().for_each(|i| self.left_rules(i, out)),
            Expr::Optional(item) | Expr::Repeat { item, .. } => self.left_rules(item, out),
            Expr::SeparatedList {
                item, separator, ..
            } => {
                self.left_rules(item, out);
                if self.is_nullable(item) {
                    self.left_rules(separator, out);
                }
            }
        }
    }

    fn check_left_recursion(&self) -> Result<(), GrammarError> {
        for (start, rule) in self.rules.iter().enumerate() {
            let mut seen = HashSet::new();
            let mut stack = Vec::new();
            self.left_rules(&rule.expr, &mut stack);
            while let Some(next) = stack.pop() {
                if next == start {
                    return Err(GrammarError::LeftRecursion(rule.name.clone()));
                }
                if seen.insert(next) {
                    self.left_rules(&self.rules[next].expr, &mut stack);
                }
            }
        }
        Ok(())
    }
}

/// Own rules first, then inherited rules that are not overridden.
fn effective_rules<'s>(
    source: &'s GrammarSource,
    grammar: &'s GrammarDefinition,
    visiting: &mut Vec<String>,
) -> Result<Vec<&'s RuleDefinition>, GrammarError> {
    if visiting.contains(&grammar.name) {
        return Err(GrammarError::InheritanceCycle(grammar.name.clone()));
    }
    visiting.push(grammar.name.clone());

    let mut names = HashSet::new();
    let mut rules = Vec::new();
    for rule in &grammar.rules {
        if !names.insert(rule.name.as_str()) {
            return Err(GrammarError::DuplicateRule {
                name: rule.name.clone(),
                grammar: grammar.name.clone(),
                position: rule.position,
            });
        }
        rules.push(rule);
    }

    for base_name in &grammar.extends {
        let base = source
            .find(base_name)
            .ok_or_else(|| GrammarError::UnknownGrammar(base_name.clone()))?;
        for rule in effective_rules(source, base, visiting)? {
            if names.insert(rule.name.as_str()) {
                rules.push(rule);
            }
        }
    }

    visiting.pop();
    Ok(rules)
}

struct Builder<'a> {
    terminals: Vec<Terminal>,
    anonymous: HashMap<(MatchableKind, String), TerminalId>,
    rule_terminals: Vec<Option<TerminalId>>,
    rule_index: &'a HashMap<String, RuleId>,
    by_name: &'a HashMap<&'a str, &'a RuleDefinition>,
}

impl Builder<'_> {
    fn named_terminal(&mut self, def: &RuleDefinition) -> Result<TerminalId, GrammarError> {
        let terminal = match &def.rhs {
            RuleItem::Literal(text) => Terminal::literal(def.name.clone(), text.clone(), def.is_skip),
            rhs => {
                let source = self.leaf_regex(rhs, &def.name, &mut vec![def.name.clone()])?;
                Terminal::pattern(def.name.clone(), source, def.is_skip)?
            }
        };
        self.terminals.push(terminal);
        Ok(self.terminals.len() - 1)
    }

    fn anonymous_terminal(&mut self, kind: MatchableKind, text: &str) -> Result<TerminalId, GrammarError> {
        if let Some(id) = self.anonymous.get(&(kind, text.to_string())) {
            return Ok(*id);
        }
        let terminal = match kind {
            MatchableKind::Literal => {
                Terminal::literal(format!("'{text}'"), text.to_string(), false)
            }
            MatchableKind::Pattern => {
                Terminal::pattern(format!("\"{text}\""), text.to_string(), false)?
            }
        };
        self.terminals.push(terminal);
        let id = self.terminals.len() - 1;
        self.anonymous.insert((kind, text.to_string()), id);
        Ok(id)
    }

    /// Inline a leaf rule's right-hand side into one regex.
    fn leaf_regex(
        &self,
        item: &RuleItem,
        rule: &str,
        stack: &mut Vec<String>,
    ) -> Result<String, GrammarError> {
        Ok(match item {
            RuleItem::Empty => String::new(),
            RuleItem::Literal(text) => regex::escape(text),
            RuleItem::Pattern(source) => format!("(?:{source})"),
            RuleItem::NonTerminal { name, position } => {
                let def = self.by_name.get(name.as_str()).ok_or_else(|| {
                    GrammarError::UnknownRule {
                        name: name.clone(),
                        rule: rule.to_string(),
                        position: *position,
                    }
                })?;
                if !def.is_leaf && !def.is_skip {
                    return Err(GrammarError::NotTerminal {
                        rule: rule.to_string(),
                        name: name.clone(),
                    });
                }
                if stack.contains(name) {
                    return Err(GrammarError::LeftRecursion(name.clone()));
                }
                stack.push(name.clone());
                let inner = self.leaf_regex(&def.rhs, rule, stack)?;
                stack.pop();
                format!("(?:{inner})")
            }
            RuleItem::Choice(items) => {
                let parts = items
                    .iter()
                    .map(|i| self.leaf_regex(i, rule, stack))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("(?:{})", parts.join("|"))
            }
            RuleItem::Concatenation(items) => items
                .iter()
                .map(|i| self.leaf_regex(i, rule, stack))
                .collect::<Result<Vec<_>, _>>()?
                .concat(),
            RuleItem::Optional(item) => format!("(?:{})?", self.leaf_regex(item, rule, stack)?),
            RuleItem::Repeat { item, min } => {
                let op = if *min == 0 { '*' } else { '+' };
                format!("(?:{}){op}", self.leaf_regex(item, rule, stack)?)
            }
            RuleItem::SeparatedList {
                item,
                separator,
                min,
            } => {
                let item = self.leaf_regex(item, rule, stack)?;
                let separator = self.leaf_regex(separator, rule, stack)?;
                let list = format!("(?:{item}(?:{separator}{item})*)");
                if *min == 0 { format!("{list}?") } else { list }
            }
        })
    }

    fn expr(&mut self, item: &RuleItem, rule: &str) -> Result<Expr, GrammarError> {
        Ok(match item {
            RuleItem::Empty => Expr::Empty,
            RuleItem::Literal(text) => {
                Expr::Terminal(self.anonymous_terminal(MatchableKind::Literal, text)?)
            }
            RuleItem::Pattern(source) => {
                Expr::Terminal(self.anonymous_terminal(MatchableKind::Pattern, source)?)
            }
            RuleItem::NonTerminal { name, position } => {
                let id = self.rule_index.get(name).copied().ok_or_else(|| {
                    GrammarError::UnknownRule {
                        name: name.clone(),
                        rule: rule.to_string(),
                        position: *position,
                    }
                })?;
                match self.rule_terminals[id] {
                    Some(terminal) => Expr::Terminal(terminal),
                    None => Expr::Rule(id),
                }
            }
            RuleItem::Choice(items) => Expr::Choice(
                items
                    .iter()
                    .map(|i| self.expr(i, rule))
                    .collect::<Result<_, _>>()?,
            ),
            RuleItem::Concatenation(items) => Expr::Sequence(
                items
                    .iter()
                    .map(|i| self.expr(i, rule))
                    .collect::<Result<_, _>>()?,
            ),
            RuleItem::Optional(item) => Expr::Optional(Box::new(self.expr(item, rule)?)),
            RuleItem::Repeat { item, min } => Expr::Repeat {
                item: Box::new(self.expr(item, rule)?),
                min: *min,
            },
            RuleItem::SeparatedList {
                item,
                separator,
                min,
            } => Expr::SeparatedList {
                item: Box::new(self.expr(item, rule)?),
                separator: Box::new(self.expr(separator, rule)?),
                min: *min,
            },
        })
    }
}
