use thiserror::Error;

/// Errors raised while turning source text into a [`crate::ast::Document`].
///
/// Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error(
        "Unexpected token \"{found}\" on line {line} column {column}. Expected {}",
        .expected.join(", ")
    )]
    UnexpectedToken {
        found: String,
        line: usize,
        column: usize,
        expected: Vec<String>,
    },

    #[error(
        "Wrong variation mode set \"{mode}\" on line {line} column {column}. Valid modes: {}",
        crate::ast::VariationMode::NAMES.join(", ")
    )]
    InvalidVariationMode {
        mode: String,
        line: usize,
        column: usize,
    },

    #[error("Unexpected character \"{character}\" on line {line} column {column}")]
    UnexpectedCharacter {
        character: char,
        line: usize,
        column: usize,
    },

    #[error("Unterminated string starting on line {line} column {column}")]
    UnterminatedString { line: usize, column: usize },

    #[error("Indentation on line {line} column {column} does not match any enclosing level")]
    InvalidIndentation { line: usize, column: usize },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::UnexpectedToken { line, .. }
            | ParseError::InvalidVariationMode { line, .. }
            | ParseError::UnexpectedCharacter { line, .. }
            | ParseError::UnterminatedString { line, .. }
            | ParseError::InvalidIndentation { line, .. } => *line,
        }
    }

    pub fn column(&self) -> usize {
        match self {
            ParseError::UnexpectedToken { column, .. }
            | ParseError::InvalidVariationMode { column, .. }
            | ParseError::UnexpectedCharacter { column, .. }
            | ParseError::UnterminatedString { column, .. }
            | ParseError::InvalidIndentation { column, .. } => *column,
        }
    }
}

/// Misuse of the interpreter or a corrupted document.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Index {0} not available.")]
    InvalidOption(usize),

    #[error("Nothing to select.")]
    NothingToSelect,

    #[error("Block '{0}' not found.")]
    UnknownBlock(String),

    #[error("Unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("Listener not registered.")]
    ListenerNotFound,

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ClydeError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
