use crate::grammar::error::GrammarError;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Raw grammar text: a namespace and the grammars it declares.
///
/// ```text
/// namespace test
/// grammar Test {
///     skip leaf WS = "\s+" ;
///     document = 'Hello' NAME ;
///     leaf NAME = "[A-Za-z]+" ;
/// }
/// ```
pub struct GrammarSource {
    /// Dotted namespace.
    pub namespace: String,
    /// Grammars in text order; the last one is the goal grammar.
    pub grammars: Vec<GrammarDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A `grammar Name : Base { ... }` block.
pub struct GrammarDefinition {
    /// Grammar name.
    pub name: String,
    /// Names of extended grammars.
    pub extends: Vec<String>,
    /// Rules in text order.
    pub rules: Vec<RuleDefinition>,
    /// Char offset of the grammar name.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A single `name = rhs ;` rule.
pub struct RuleDefinition {
    /// Rule name.
    pub name: String,
    /// Matches are skipped between terminals (whitespace, comments).
    pub is_skip: bool,
    /// The rule is a terminal: it matches as one regex and produces a single leaf.
    pub is_leaf: bool,
    /// Right-hand side.
    pub rhs: RuleItem,
    /// Char offset of the rule name.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The right-hand side of a rule.
pub enum RuleItem {
    /// Matches nothing.
    Empty,
    /// Ordered choice: the first alternative that matches wins.
    Choice(Vec<RuleItem>),
    /// Sequence.
    Concatenation(Vec<RuleItem>),
    /// Exact text (escapes resolved).
    Literal(String),
    /// Regular expression source.
    Pattern(String),
    /// Reference to another rule.
    NonTerminal {
        /// Referenced rule.
        name: String,
        /// Char offset of the reference.
        position: usize,
    },
    /// `item?`
    Optional(Box<RuleItem>),
    /// `item*` (`min == 0`) or `item+` (`min == 1`).
    Repeat {
        /// Repeated item.
        item: Box<RuleItem>,
        /// Minimum number of matches.
        min: usize,
    },
    /// `[item / separator]*` or `[item / separator]+`.
    SeparatedList {
        /// List item.
        item: Box<RuleItem>,
        /// Separator between items.
        separator: Box<RuleItem>,
        /// Minimum number of items.
        min: usize,
    },
}

impl RuleItem {
    /// Calls `f` for every non-terminal reference, in text order.
    pub fn for_each_reference<F: FnMut(&str, usize)>(&self, f: &mut F) {
        match self {
            RuleItem::Empty | RuleItem::Literal(_) | RuleItem::Pattern(_) => {}
            RuleItem::NonTerminal { name, position } => f(name, *position),
            RuleItem::Choice(items) | RuleItem::Concatenation(items) => {
                items.iter().for_each(|i| i.for_each_reference(f))
            }
            RuleItem::Optional(item) | RuleItem::Repeat { item, .. } => item.for_each_reference(f),
            RuleItem::SeparatedList {
                item, separator, ..
            } => {
                item.for_each_reference(f);
                separator.for_each_reference(f);
            }
        }
    }
}

impl GrammarSource {
    /// Read grammar text.
    pub fn read(text: &str) -> Result<Self, GrammarError> {
        let tokens = lex(text)?;
        Reader { tokens, index: 0 }.source()
    }

    /// `namespace.Name` of one of the grammars.
    pub fn qualified_name(&self, grammar: &GrammarDefinition) -> String {
        format!("{}.{}", self.namespace, grammar.name)
    }

    /// The goal grammar (the last one in the text).
    pub fn goal(&self) -> Option<&GrammarDefinition> {
        self.grammars.last()
    }

    /// Find a grammar by simple or qualified name.
    pub fn find(&self, name: &str) -> Option<&GrammarDefinition> {
        let simple = name.rsplit('.').next().unwrap_or(name);
        self.grammars.iter().find(|g| g.name == simple)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Literal(String),
    Pattern(String),
    Punct(char),
    End,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
    line: usize,
    column: usize,
}

impl Token {
    fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::Literal(value) => format!("literal '{value}'"),
            TokenKind::Pattern(source) => format!("pattern \"{source}\""),
            TokenKind::Punct(c) => format!("'{c}'"),
            TokenKind::End => "end of text".to_string(),
        }
    }

    fn is_ident(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(name) if name == word)
    }
}

const PUNCTUATION: &str = "{}()[]=;|/:,?*+.";

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Cursor {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, position: usize, line: usize, column: usize, message: String) -> GrammarError {
        GrammarError::Syntax {
            position,
            line,
            column,
            message,
            expected: Vec::new(),
        }
    }
}

fn lex(text: &str) -> Result<Vec<Token>, GrammarError> {
    let mut cursor = Cursor {
        chars: text.chars().collect(),
        pos: 0,
        line: 0,
        column: 0,
    };
    let mut tokens = Vec::new();

    while let Some(c) = cursor.peek() {
        let (position, line, column) = (cursor.pos, cursor.line, cursor.column);

        if c.is_whitespace() {
            cursor.bump();
            continue;
        }

        if c == '/' && cursor.peek_at(1) == Some('/') {
            while cursor.peek().is_some_and(|c| c != '\n') {
                cursor.bump();
            }
            continue;
        }

        if c == '/' && cursor.peek_at(1) == Some('*') {
            cursor.bump();
            cursor.bump();
            loop {
                match cursor.bump() {
                    Some('*') if cursor.peek() == Some('/') => {
                        cursor.bump();
                        break;
                    }
                    Some(_) => {}
                    None => {
                        return Err(cursor.error(
                            position,
                            line,
                            column,
                            "unterminated comment".to_string(),
                        ));
                    }
                }
            }
            continue;
        }

        let kind = if c.is_alphabetic() || c == '_' {
            let mut name = String::new();
            while let Some(c) = cursor.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
                name.push(c);
                cursor.bump();
            }
            TokenKind::Ident(name)
        } else if c == '\'' {
            cursor.bump();
            let mut value = String::new();
            loop {
                match cursor.bump() {
                    Some('\'') => break,
                    Some('\\') => match cursor.bump() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some(c @ ('\'' | '\\')) => value.push(c),
                        Some(c) => {
                            value.push('\\');
                            value.push(c);
                        }
                        None => break,
                    },
                    Some(c) => value.push(c),
                    None => {
                        return Err(cursor.error(
                            position,
                            line,
                            column,
                            "unterminated literal".to_string(),
                        ));
                    }
                }
            }
            TokenKind::Literal(value)
        } else if c == '"' {
            cursor.bump();
            let mut source = String::new();
            loop {
                match cursor.bump() {
                    Some('"') => break,
                    Some('\\') => match cursor.bump() {
                        Some('"') => source.push('"'),
                        Some(c) => {
                            source.push('\\');
                            source.push(c);
                        }
                        None => break,
                    },
                    Some(c) => source.push(c),
                    None => {
                        return Err(cursor.error(
                            position,
                            line,
                            column,
                            "unterminated pattern".to_string(),
                        ));
                    }
                }
            }
            TokenKind::Pattern(source)
        } else if PUNCTUATION.contains(c) {
            cursor.bump();
            TokenKind::Punct(c)
        } else {
            return Err(cursor.error(position, line, column, format!("unexpected character '{c}'")));
        };

        tokens.push(Token {
            kind,
            position,
            line,
            column,
        });
    }

    tokens.push(Token {
        kind: TokenKind::End,
        position: cursor.pos,
        line: cursor.line,
        column: cursor.column,
    });
    Ok(tokens)
}

struct Reader {
    tokens: Vec<Token>,
    index: usize,
}

impl Reader {
    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.index.min(last)]
    }

    fn peek_second(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.index + 1).min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn error(&self, expected: &[&str]) -> GrammarError {
        let token = self.peek();
        let expected: Vec<String> = expected.iter().map(|e| e.to_string()).collect();
        GrammarError::Syntax {
            position: token.position,
            line: token.line,
            column: token.column,
            message: format!("expected {}, found {}", expected.join(" or "), token.describe()),
            expected,
        }
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek().kind == TokenKind::Punct(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), GrammarError> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.error(&[&format!("'{c}'")]))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), GrammarError> {
        if self.peek().is_ident(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&[&format!("'{word}'")]))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, usize), GrammarError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                let position = self.advance().position;
                Ok((name, position))
            }
            _ => Err(self.error(&[what])),
        }
    }

    fn qualified_name(&mut self, what: &str) -> Result<String, GrammarError> {
        let (mut name, _) = self.expect_ident(what)?;
        while self.peek().kind == TokenKind::Punct('.') {
            self.advance();
            let (part, _) = self.expect_ident(what)?;
            name.push('.');
            name.push_str(&part);
        }
        Ok(name)
    }

    fn source(mut self) -> Result<GrammarSource, GrammarError> {
        self.expect_keyword("namespace")?;
        let namespace = self.qualified_name("<namespace>")?;

        if self.peek().kind == TokenKind::End {
            return Err(GrammarError::NoGrammar);
        }

        let mut grammars = Vec::new();
        while self.peek().is_ident("grammar") {
            grammars.push(self.grammar()?);
        }
        if grammars.is_empty() || self.peek().kind != TokenKind::End {
            return Err(self.error(&["'grammar'"]));
        }

        Ok(GrammarSource {
            namespace,
            grammars,
        })
    }

    fn grammar(&mut self) -> Result<GrammarDefinition, GrammarError> {
        self.expect_keyword("grammar")?;
        let (name, position) = self.expect_ident("<grammar name>")?;

        let mut extends = Vec::new();
        if self.eat_punct(':') {
            extends.push(self.qualified_name("<grammar name>")?);
            while self.eat_punct(',') {
                extends.push(self.qualified_name("<grammar name>")?);
            }
        }

        self.expect_punct('{')?;
        let mut rules = Vec::new();
        while !self.eat_punct('}') {
            if !matches!(self.peek().kind, TokenKind::Ident(_)) {
                return Err(self.error(&["<rule name>", "'}'"]));
            }
            rules.push(self.rule()?);
        }

        Ok(GrammarDefinition {
            name,
            extends,
            rules,
            position,
        })
    }

    fn rule(&mut self) -> Result<RuleDefinition, GrammarError> {
        let (mut is_skip, mut is_leaf) = (false, false);
        loop {
            let modifier = self.peek();
            let followed_by_name = matches!(self.peek_second().kind, TokenKind::Ident(_));
            if modifier.is_ident("skip") && followed_by_name {
                is_skip = true;
            } else if modifier.is_ident("leaf") && followed_by_name {
                is_leaf = true;
            } else {
                break;
            }
            self.advance();
        }

        let (name, position) = self.expect_ident("<rule name>")?;
        self.expect_punct('=')?;
        let rhs = self.choice()?;
        self.expect_punct(';')?;

        Ok(RuleDefinition {
            name,
            is_skip,
            is_leaf,
            rhs,
            position,
        })
    }

    fn choice(&mut self) -> Result<RuleItem, GrammarError> {
        let mut alternatives = vec![self.concatenation()?];
        while self.eat_punct('|') {
            alternatives.push(self.concatenation()?);
        }
        Ok(if alternatives.len() == 1 {
            alternatives.remove(0)
        } else {
            RuleItem::Choice(alternatives)
        })
    }

    fn starts_item(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Ident(_)
                | TokenKind::Literal(_)
                | TokenKind::Pattern(_)
                | TokenKind::Punct('(')
                | TokenKind::Punct('[')
        )
    }

    fn concatenation(&mut self) -> Result<RuleItem, GrammarError> {
        let mut items = Vec::new();
        while self.starts_item() {
            items.push(self.item()?);
        }
        Ok(match items.len() {
            0 => RuleItem::Empty,
            1 => items.remove(0),
            _ => RuleItem::Concatenation(items),
        })
    }

    fn item(&mut self) -> Result<RuleItem, GrammarError> {
        if self.eat_punct('[') {
            let item = self.primary()?;
            self.expect_punct('/')?;
            let separator = self.primary()?;
            self.expect_punct(']')?;
            let min = if self.eat_punct('*') {
                0
            } else if self.eat_punct('+') {
                1
            } else {
                return Err(self.error(&["'*'", "'+'"]));
            };
            return Ok(RuleItem::SeparatedList {
                item: Box::new(item),
                separator: Box::new(separator),
                min,
            });
        }

        let primary = self.primary()?;
        Ok(if self.eat_punct('?') {
            RuleItem::Optional(Box::new(primary))
        } else if self.eat_punct('*') {
            RuleItem::Repeat {
                item: Box::new(primary),
                min: 0,
            }
        } else if self.eat_punct('+') {
            RuleItem::Repeat {
                item: Box::new(primary),
                min: 1,
            }
        } else {
            primary
        })
    }

    fn primary(&mut self) -> Result<RuleItem, GrammarError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Literal(value) => {
                self.advance();
                Ok(RuleItem::Literal(value))
            }
            TokenKind::Pattern(source) => {
                self.advance();
                Ok(RuleItem::Pattern(source))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(RuleItem::NonTerminal {
                    name,
                    position: token.position,
                })
            }
            TokenKind::Punct('(') => {
                self.advance();
                let inner = self.choice()?;
                self.expect_punct(')')?;
                Ok(inner)
            }
            _ => Err(self.error(&["<literal>", "<pattern>", "<rule name>", "'('"])),
        }
    }
}
