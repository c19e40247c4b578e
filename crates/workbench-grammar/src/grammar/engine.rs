use crate::grammar::compiler::{CompiledGrammar, Expr, RuleId, TerminalId};
use crate::grammar::scanner::terminal_leaf;
use std::collections::{BTreeSet, HashMap};
use workbench_core::{CancelToken, Leaf, ParseBranch, ParseNode, ParseTree, ProcessorError};

/// Name reported when the end of the text was expected.
pub const END_OF_TEXT: &str = "<EOT>";

/// Steps between two cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Deepest rule nesting a parse may reach before it gives up.
///
/// Every nested rule costs a few native stack frames, so a long right-recursive sentence
/// would otherwise overflow the thread stack.
pub const MAX_RULE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Why a sentence could not be parsed.
pub struct ParseFailure {
    /// Char offset of the farthest point the parser reached.
    pub position: usize,
    /// Terminal names (or [`END_OF_TEXT`]) that would have been accepted there, sorted.
    pub expected: Vec<String>,
}

/// Parse `text` starting from `goal`.
///
/// Skip terminals are consumed before every terminal and after the goal, so the tree covers the
/// whole text. Leaves carry their ancestor rule names followed by their own name as tags.
///
/// Returns `Err` when `cancel` fires or rules nest deeper than [`MAX_RULE_DEPTH`]; a sentence
/// that does not parse is `Ok(Err(_))`.
pub fn parse(
    grammar: &CompiledGrammar,
    text: &str,
    goal: RuleId,
    cancel: &CancelToken,
) -> Result<Result<ParseTree, ParseFailure>, ProcessorError> {
    let mut parser = Parser::new(grammar, text, cancel);
    let Some((end, root)) = parser.parse_rule(goal, 0)? else {
        return Ok(Err(parser.failure()));
    };

    let (after, trailing) = parser.skip(end);
    if after < text.len() {
        parser.expect(after, None);
        return Ok(Err(parser.failure()));
    }

    let mut root = match root {
        ParseNode::Branch(mut branch) => {
            branch.length = parser.char_at[after] - branch.position;
            branch.children.extend(trailing.into_iter().map(ParseNode::Leaf));
            ParseNode::Branch(branch)
        }
        leaf => leaf,
    };
    assign_tags(&mut root, &mut Vec::new());
    Ok(Ok(ParseTree::new(root)))
}

/// Non-skip terminals that may follow the first `position` chars of `text`.
///
/// Empty when the text before `position` already contains an error.
pub fn expected_at(
    grammar: &CompiledGrammar,
    text: &str,
    goal: RuleId,
    position: usize,
    cancel: &CancelToken,
) -> Result<Vec<TerminalId>, ProcessorError> {
    let byte = text
        .char_indices()
        .nth(position)
        .map_or(text.len(), |(b, _)| b);
    let prefix = &text[..byte];

    let mut parser = Parser::new(grammar, prefix, cancel);
    if let Some((end, _)) = parser.parse_rule(goal, 0)? {
        let (after, _) = parser.skip(end);
        if after < prefix.len() {
            parser.expect(after, None);
        }
    }

    if parser.farthest != prefix.len() {
        return Ok(Vec::new());
    }
    Ok(parser.expected.into_iter().collect())
}

fn assign_tags(node: &mut ParseNode, path: &mut Vec<String>) {
    match node {
        ParseNode::Branch(branch) => {
            path.push(branch.name.clone());
            for child in &mut branch.children {
                assign_tags(child, path);
            }
            path.pop();
        }
        ParseNode::Leaf(leaf) => {
            let mut tags = path.clone();
            tags.push(leaf.name.clone());
            leaf.tags = tags;
        }
    }
}

type Memo = Option<(usize, ParseNode)>;

/// Packrat parser over byte offsets; leaves and branches are reported in chars.
struct Parser<'a> {
    grammar: &'a CompiledGrammar,
    text: &'a str,
    char_at: Vec<usize>,
    memo: HashMap<(RuleId, usize), Memo>,
    skip_memo: HashMap<usize, (usize, Vec<Leaf>)>,
    farthest: usize,
    expected: BTreeSet<TerminalId>,
    expect_end: bool,
    cancel: &'a CancelToken,
    steps: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(grammar: &'a CompiledGrammar, text: &'a str, cancel: &'a CancelToken) -> Self {
        let mut char_at = vec![0; text.len() + 1];
        let mut count = 0;
        for (byte, _) in text.char_indices() {
            char_at[byte] = count;
            count += 1;
        }
        char_at[text.len()] = count;

        Self {
            grammar,
            text,
            char_at,
            memo: HashMap::new(),
            skip_memo: HashMap::new(),
            farthest: 0,
            expected: BTreeSet::new(),
            expect_end: false,
            cancel,
            steps: 0,
            depth: 0,
        }
    }

    fn tick(&mut self) -> Result<(), ProcessorError> {
        self.steps += 1;
        if self.steps % CANCEL_CHECK_INTERVAL == 0 {
            self.cancel.check()?;
        }
        Ok(())
    }

    fn failure(&self) -> ParseFailure {
        let mut expected: BTreeSet<String> = self
            .expected
            .iter()
            .map(|t| self.grammar.terminal(*t).name.clone())
            .collect();
        if self.expect_end {
            expected.insert(END_OF_TEXT.to_string());
        }
        ParseFailure {
            position: self.char_at[self.farthest],
            expected: expected.into_iter().collect(),
        }
    }

    /// Records that `terminal` (or the end of text) was expected at `at`.
    fn expect(&mut self, at: usize, terminal: Option<TerminalId>) {
        if at > self.farthest {
            self.farthest = at;
            self.expected.clear();
            self.expect_end = false;
        }
        if at == self.farthest {
            match terminal {
                Some(t) => {
                    self.expected.insert(t);
                }
                None => self.expect_end = true,
            }
        }
    }

    /// Greedily consumes skip terminals starting at `at`.
    fn skip(&mut self, at: usize) -> (usize, Vec<Leaf>) {
        if let Some(hit) = self.skip_memo.get(&at) {
            return hit.clone();
        }

        let grammar = self.grammar;
        let mut pos = at;
        let mut leaves = Vec::new();
        loop {
            let best = grammar
                .skip_terminals()
                .iter()
                .filter_map(|t| {
                    grammar
                        .terminal(*t)
                        .match_at(self.text, pos)
                        .filter(|len| *len > 0)
                        .map(|len| (*t, len))
                })
                .fold(None, |best: Option<(TerminalId, usize)>, (t, len)| match best {
                    Some((_, best_len)) if best_len >= len => best,
                    _ => Some((t, len)),
                });
            let Some((t, len)) = best else {
                break;
            };
            leaves.push(terminal_leaf(
                grammar.terminal(t),
                self.char_at[pos],
                &self.text[pos..pos + len],
            ));
            pos += len;
        }

        self.skip_memo.insert(at, (pos, leaves.clone()));
        (pos, leaves)
    }

    fn parse_rule(&mut self, id: RuleId, at: usize) -> Result<Memo, ProcessorError> {
        if let Some(hit) = self.memo.get(&(id, at)) {
            return Ok(hit.clone());
        }

        if self.depth >= MAX_RULE_DEPTH {
            return Err(ProcessorError::Failed(format!(
                "Rule nesting deeper than {MAX_RULE_DEPTH} levels at offset {}",
                self.char_at[at]
            )));
        }

        let grammar = self.grammar;
        let rule = grammar.rule(id);
        let mut children = Vec::new();
        self.depth += 1;
        let parsed = self.parse_expr(&rule.expr, at, &mut children);
        self.depth -= 1;
        let result = parsed?.map(|end| {
            let position = self.char_at[at];
            let node = ParseNode::Branch(ParseBranch {
                name: rule.name.clone(),
                position,
                length: self.char_at[end] - position,
                children,
            });
            (end, node)
        });

        self.memo.insert((id, at), result.clone());
        Ok(result)
    }

    fn parse_expr(
        &mut self,
        expr: &Expr,
        at: usize,
        out: &mut Vec<ParseNode>,
    ) -> Result<Option<usize>, ProcessorError> {
        self.tick()?;
        match expr {
            Expr::Empty => Ok(Some(at)),
            Expr::Terminal(id) => {
                let (start, skipped) = self.skip(at);
                let grammar = self.grammar;
                let terminal = grammar.terminal(*id);
                match terminal.match_at(self.text, start) {
                    Some(len) => {
                        out.extend(skipped.into_iter().map(ParseNode::Leaf));
                        out.push(ParseNode::Leaf(terminal_leaf(
                            terminal,
                            self.char_at[start],
                            &self.text[start..start + len],
                        )));
                        Ok(Some(start + len))
                    }
                    None => {
                        self.expect(start, Some(*id));
                        Ok(None)
                    }
                }
            }
            Expr::Rule(id) => Ok(self.parse_rule(*id, at)?.map(|(end, node)| {
                out.push(node);
                end
            })),
            Expr::Sequence(items) => {
                let mark = out.len();
                let mut pos = at;
                for item in items {
                    match self.parse_expr(item, pos, out)? {
                        Some(next) => pos = next,
                        None => {
                            out.truncate(mark);
                            return Ok(None);
                        }
                    }
                }
                Ok(Some(pos))
            }
            Expr::Choice(items) => {
                for item in items {
                    let mark = out.len();
                    if let Some(next) = self.parse_expr(item, at, out)? {
                        return Ok(Some(next));
                    }
                    out.truncate(mark);
                }
                Ok(None)
            }
            Expr::Optional(item) => {
                let mark = out.len();
                match self.parse_expr(item, at, out)? {
                    Some(next) => Ok(Some(next)),
                    None => {
                        out.truncate(mark);
                        Ok(Some(at))
                    }
                }
            }
            Expr::Repeat { item, min } => {
                let mark = out.len();
                let mut pos = at;
                let mut count = 0;
                loop {
                    let before = out.len();
                    match self.parse_expr(item, pos, out)? {
                        Some(next) => {
                            count += 1;
                            if next == pos {
                                break;
                            }
                            pos = next;
                        }
                        None => {
                            out.truncate(before);
                            break;
                        }
                    }
                }
                if count < *min {
                    out.truncate(mark);
                    return Ok(None);
                }
                Ok(Some(pos))
            }
            Expr::SeparatedList {
                item,
                separator,
                min,
            } => {
                let mark = out.len();
                let mut pos = at;
                let mut count = 0;
                if let Some(next) = self.parse_expr(item, pos, out)? {
                    pos = next;
                    count = 1;
                    loop {
                        let before = out.len();
                        let Some(after_separator) = self.parse_expr(separator, pos, out)? else {
                            out.truncate(before);
                            break;
                        };
                        match self.parse_expr(item, after_separator, out)? {
                            Some(next) if next > pos => {
                                pos = next;
                                count += 1;
                            }
                            _ => {
                                out.truncate(before);
                                break;
                            }
                        }
                    }
                } else {
                    out.truncate(mark);
                }
                if count < *min {
                    out.truncate(mark);
                    return Ok(None);
                }
                Ok(Some(pos))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HELLO: &str = r#"
        namespace test
        grammar Test {
            skip leaf WS = "\s+" ;
            document = 'Hello' NAME ;
            leaf NAME = "[A-Za-z]+" ;
        }
    "#;

    fn run(grammar: &str, text: &str) -> Result<ParseTree, ParseFailure> {
        let grammar = CompiledGrammar::compile(grammar).unwrap();
        parse(&grammar, text, grammar.default_goal(), &CancelToken::none()).unwrap()
    }

    #[test]
    fn test_parse_hello_world() {
        let tree = run(HELLO, "Hello World").unwrap();
        let leaves: Vec<(&str, usize, usize)> = tree
            .non_skip_leaves()
            .iter()
            .map(|l| (l.name.as_str(), l.position, l.length))
            .collect();
        assert_eq!(leaves, vec![("'Hello'", 0, 5), ("NAME", 6, 5)]);
        assert_eq!(tree.root.name(), "document");
        assert_eq!(tree.root.length(), 11);

        let name = tree.non_skip_leaves()[1];
        assert_eq!(name.tags, vec!["document".to_string(), "NAME".to_string()]);
    }

    #[test]
    fn test_tree_covers_leading_and_trailing_skip() {
        let tree = run(HELLO, "  Hello World \n").unwrap();
        let leaves = tree.leaves();
        assert_eq!(leaves.first().map(|l| (l.position, l.is_skip)), Some((0, true)));
        assert_eq!(leaves.last().map(|l| (l.position, l.length)), Some((13, 2)));
        assert_eq!(tree.root.length(), 15);
    }

    #[test]
    fn test_failure_reports_farthest_expected() {
        let failure = run(HELLO, "Hello 42").unwrap_err();
        assert_eq!(failure.position, 6);
        assert_eq!(failure.expected, vec!["NAME".to_string()]);

        let failure = run(HELLO, "garbage").unwrap_err();
        assert_eq!(failure.position, 0);
        assert_eq!(failure.expected, vec!["'Hello'".to_string()]);
    }

    #[test]
    fn test_leftover_text_expects_end() {
        let failure = run(HELLO, "Hello World again").unwrap_err();
        assert_eq!(failure.position, 12);
        assert_eq!(failure.expected, vec![END_OF_TEXT.to_string()]);
    }

    #[test]
    fn test_lists_and_backtracking() {
        let grammar = r#"namespace t grammar G {
            skip leaf WS = "\s+" ;
            unit = decl* ;
            decl = 'var' ID '=' ID ';' | 'var' ID ';' | call ;
            call = ID '(' [ID / ',']* ')' ';' ;
            leaf ID = "[a-z]+" ;
        }"#;
        let tree = run(grammar, "var a ; var b = c ; f ( x , y ) ; g ( ) ;").unwrap();
        let ParseNode::Branch(root) = &tree.root else {
            panic!("root is a leaf");
        };
        let decls: Vec<&str> = root
            .children
            .iter()
            .filter(|c| matches!(c, ParseNode::Branch(_)))
            .map(|c| c.name())
            .collect();
        assert_eq!(decls, vec!["decl", "decl", "decl", "decl"]);

        let failure = run(grammar, "f ( x , ) ;").unwrap_err();
        assert_eq!(failure.position, 8);
        assert_eq!(failure.expected, vec!["ID".to_string()]);
    }

    #[test]
    fn test_empty_text_with_nullable_goal() {
        let tree = run(r#"namespace t grammar G { unit = 'a'* ; }"#, "").unwrap();
        assert_eq!(tree.root.length(), 0);
        let failure = run(r#"namespace t grammar G { unit = 'a' ; }"#, "").unwrap_err();
        assert_eq!(failure.expected, vec!["'a'".to_string()]);
    }

    #[test]
    fn test_cancelled_parse_is_interrupted() {
        let grammar = CompiledGrammar::compile(
            r#"namespace t grammar G { skip leaf WS = "\s+" ; unit = ID* ; leaf ID = "[a-z]+" ; }"#,
        )
        .unwrap();
        let text = "word ".repeat(5000);
        let cancel = CancelToken::new(1);
        cancel.cancel("new text");
        let result = parse(&grammar, &text, grammar.default_goal(), &cancel);
        assert_eq!(
            result.unwrap_err(),
            ProcessorError::Interrupted("new text".to_string())
        );
    }

    #[test]
    fn test_deep_right_recursion_fails_instead_of_overflowing() {
        let grammar = CompiledGrammar::compile(
            r#"namespace t grammar Sum { expr = NAME '+' expr | NAME ; leaf NAME = "[a-z]+" ; }"#,
        )
        .unwrap();
        let goal = grammar.default_goal();

        let shallow = vec!["a"; 100].join("+");
        assert!(parse(&grammar, &shallow, goal, &CancelToken::none()).unwrap().is_ok());

        let deep = vec!["a"; 3000].join("+");
        match parse(&grammar, &deep, goal, &CancelToken::none()) {
            Err(ProcessorError::Failed(message)) => {
                assert!(message.starts_with("Rule nesting deeper than 256 levels"), "{message}");
            }
            other => panic!("expected a nesting failure, got {other:?}"),
        }
    }

    #[test]
    fn test_expected_at_position() {
        let grammar = CompiledGrammar::compile(HELLO).unwrap();
        let goal = grammar.default_goal();
        let names = |text: &str, position: usize| -> Vec<String> {
            expected_at(&grammar, text, goal, position, &CancelToken::none())
                .unwrap()
                .into_iter()
                .map(|t| grammar.terminal(t).name.clone())
                .collect()
        };
        assert_eq!(names("", 0), vec!["'Hello'".to_string()]);
        assert_eq!(names("Hello W", 6), vec!["NAME".to_string()]);
        assert!(names("xx", 2).is_empty());
    }
}
