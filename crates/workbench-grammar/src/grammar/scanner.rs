use crate::grammar::compiler::{CompiledGrammar, Terminal, TerminalId};
use workbench_core::{Leaf, MatchableKind};

/// Meta tag carried by identifier-like literal leaves.
pub const KEYWORD_TAG: &str = "$keyword";

/// Scan `text` into leaves without parsing.
///
/// At every position the longest non-empty terminal match wins; on a tie a literal beats a
/// pattern, then the earlier terminal wins. Text no terminal matches is collected into
/// [`Leaf::UNDEFINED`] leaves. Leaf positions are char offsets shifted by `offset`.
pub fn scan(grammar: &CompiledGrammar, text: &str, offset: usize) -> Vec<Leaf> {
    let mut leaves = Vec::new();
    let mut undefined = String::new();
    let mut undefined_start = 0;
    let (mut byte, mut position) = (0, offset);

    while byte < text.len() {
        match longest_match(grammar, text, byte) {
            Some((id, len)) => {
                if !undefined.is_empty() {
                    leaves.push(Leaf::new(Leaf::UNDEFINED, undefined_start, undefined.as_str()));
                    undefined.clear();
                }
                let leaf = terminal_leaf(grammar.terminal(id), position, &text[byte..byte + len]);
                position += leaf.length;
                byte += len;
                leaves.push(leaf);
            }
            None => {
                let Some(c) = text[byte..].chars().next() else {
                    break;
                };
                if undefined.is_empty() {
                    undefined_start = position;
                }
                undefined.push(c);
                byte += c.len_utf8();
                position += 1;
            }
        }
    }

    if !undefined.is_empty() {
        leaves.push(Leaf::new(Leaf::UNDEFINED, undefined_start, undefined));
    }
    leaves
}

fn longest_match(grammar: &CompiledGrammar, text: &str, at: usize) -> Option<(TerminalId, usize)> {
    let mut best: Option<(TerminalId, usize)> = None;
    for (id, terminal) in grammar.terminals().iter().enumerate() {
        let Some(len) = terminal.match_at(text, at).filter(|len| *len > 0) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((best_id, best_len)) => {
                len > best_len
                    || (len == best_len
                        && terminal.kind == MatchableKind::Literal
                        && grammar.terminal(best_id).kind == MatchableKind::Pattern)
            }
        };
        if better {
            best = Some((id, len));
        }
    }
    best
}

/// The leaf a terminal produces for matched `text`.
pub(crate) fn terminal_leaf(terminal: &Terminal, position: usize, text: &str) -> Leaf {
    let mut leaf = Leaf::new(terminal.name.as_str(), position, text);
    if terminal.is_skip {
        leaf = leaf.skip();
    }
    if terminal.is_keyword {
        leaf = leaf.with_meta_tags(vec![KEYWORD_TAG.to_string()]);
    }
    leaf
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn grammar() -> CompiledGrammar {
        CompiledGrammar::compile(
            r#"namespace test grammar Test {
                skip leaf WS = "\s+" ;
                document = 'Hello' NAME ;
                leaf NAME = "[A-Za-z]+" ;
            }"#,
        )
        .unwrap()
    }

    fn spans(leaves: &[Leaf]) -> Vec<(&str, usize, usize)> {
        leaves
            .iter()
            .map(|l| (l.name.as_str(), l.position, l.length))
            .collect()
    }

    #[test]
    fn test_literal_wins_tie_with_pattern() {
        let leaves = scan(&grammar(), "Hello World", 0);
        assert_eq!(
            spans(&leaves),
            vec![("'Hello'", 0, 5), ("WS", 5, 1), ("NAME", 6, 5)]
        );
        assert_eq!(leaves[0].meta_tags, vec![KEYWORD_TAG.to_string()]);
        assert!(leaves[1].is_skip);
    }

    #[test]
    fn test_longest_match_wins() {
        let leaves = scan(&grammar(), "Helloo", 0);
        assert_eq!(spans(&leaves), vec![("NAME", 0, 6)]);
    }

    #[test]
    fn test_unmatched_text_is_merged() {
        let leaves = scan(&grammar(), "ab 12€ cd", 10);
        assert_eq!(
            spans(&leaves),
            vec![
                ("NAME", 10, 2),
                ("WS", 12, 1),
                (Leaf::UNDEFINED, 13, 3),
                ("WS", 16, 1),
                ("NAME", 17, 2),
            ]
        );
        assert_eq!(leaves[2].text, "12€");
    }

    #[test]
    fn test_empty_text() {
        assert!(scan(&grammar(), "", 0).is_empty());
    }
}
