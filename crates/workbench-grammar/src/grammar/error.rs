use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Errors produced by the grammar reader and compiler.
pub enum GrammarError {
    #[error("{message} at line {}, column {}", .line + 1, .column + 1)]
    /// The grammar text could not be read.
    Syntax {
        /// Char offset of the offending text.
        position: usize,
        /// 0-based line.
        line: usize,
        /// 0-based column.
        column: usize,
        /// What went wrong.
        message: String,
        /// Tokens that would have been accepted.
        expected: Vec<String>,
    },

    #[error("the grammar text defines no grammar")]
    /// The text has a namespace but no grammar.
    NoGrammar,

    #[error("grammar '{0}' is not defined")]
    /// An `extends` clause names an unknown grammar.
    UnknownGrammar(String),

    #[error("inheritance cycle detected involving '{0}'")]
    /// An `extends` chain formed a cycle.
    InheritanceCycle(String),

    #[error("rule '{name}' is not defined (referenced from '{rule}')")]
    /// A rule refers to a non-terminal nobody defines.
    UnknownRule {
        /// The missing rule.
        name: String,
        /// The rule holding the reference.
        rule: String,
        /// Char offset of the reference.
        position: usize,
    },

    #[error("rule '{name}' is already defined in grammar '{grammar}'")]
    /// A grammar defines the same rule twice.
    DuplicateRule {
        /// Rule name.
        name: String,
        /// Grammar name.
        grammar: String,
        /// Char offset of the second definition.
        position: usize,
    },

    #[error("rule '{0}' is left recursive")]
    /// A rule can reach itself without consuming input.
    LeftRecursion(String),

    #[error("leaf rule '{rule}' refers to non-leaf rule '{name}'")]
    /// A leaf or skip rule refers to a rule that is not itself a terminal.
    NotTerminal {
        /// The leaf rule.
        rule: String,
        /// The non-terminal it refers to.
        name: String,
    },

    #[error("regex compile error for pattern '{pattern}': {message}")]
    /// A pattern failed to compile.
    RegexCompile {
        /// The pattern source.
        pattern: String,
        /// The compiler error message.
        message: String,
    },

    #[error("grammar '{0}' has no rule to start parsing from")]
    /// Every rule of the goal grammar is a skip rule.
    MissingGoal(String),
}

impl GrammarError {
    /// Char offset in the grammar text the error refers to, if known.
    pub fn position(&self) -> Option<usize> {
        match self {
            GrammarError::Syntax { position, .. }
            | GrammarError::UnknownRule { position, .. }
            | GrammarError::DuplicateRule { position, .. } => Some(*position),
            _ => None,
        }
    }

    /// Expected tokens of a syntax error.
    pub fn expected(&self) -> &[String] {
        match self {
            GrammarError::Syntax { expected, .. } => expected,
            _ => &[],
        }
    }
}
