//! Tokenizer for Clyde dialogue source.
//!
//! The lexer is pull based: [`Lexer`] implements [`Iterator`] and produces
//! one token at a time, while [`tokenize`] materializes the whole stream.
//! Classification depends on a mode stack (option line, logic block,
//! quoted text, variations) and on an indentation stack that turns leading
//! whitespace into `INDENT` / `DEDENT` tokens.

use std::collections::VecDeque;

use crate::ast::VariationMode;
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Text,
    Indent,
    Dedent,
    Option,
    StickyOption,
    FallbackOption,
    OptionsStart,
    SqrBracketOpen,
    SqrBracketClose,
    Speaker,
    LineId,
    Tag,
    Block,
    Divert,
    DivertParent,
    BracketOpen,
    BracketClose,
    VariationsMode,
    BraceOpen,
    BraceClose,
    LineBreak,
    Eof,

    // logic mode
    Minus,
    Plus,
    Mult,
    Div,
    Power,
    Mod,
    And,
    Or,
    Not,
    Equal,
    NotEqual,
    GreaterOrEqual,
    LessOrEqual,
    Greater,
    Less,
    Assign,
    AssignSum,
    AssignSub,
    AssignMult,
    AssignDiv,
    AssignPow,
    AssignMod,
    Comma,
    NumberLiteral,
    StringLiteral,
    BooleanLiteral,
    NullLiteral,
    Identifier,
    KeywordSet,
    KeywordTrigger,
    KeywordWhen,
}

impl TokenKind {
    /// Human readable name used in syntax errors.
    pub fn hint(self) -> &'static str {
        match self {
            TokenKind::Text => "text",
            TokenKind::Indent => "INDENT",
            TokenKind::Dedent => "DEDENT",
            TokenKind::Option => "*",
            TokenKind::StickyOption => "+",
            TokenKind::FallbackOption => ">",
            TokenKind::OptionsStart => ">>",
            TokenKind::SqrBracketOpen => "[",
            TokenKind::SqrBracketClose => "]",
            TokenKind::Speaker => "<speaker name>:",
            TokenKind::LineId => "$id",
            TokenKind::Tag => "#tag",
            TokenKind::Block => "== <block name>",
            TokenKind::Divert => "-> <target name>",
            TokenKind::DivertParent => "<-",
            TokenKind::BracketOpen => "(",
            TokenKind::BracketClose => ")",
            TokenKind::VariationsMode => "<variations mode>",
            TokenKind::BraceOpen => "{",
            TokenKind::BraceClose => "}",
            TokenKind::LineBreak => "line break",
            TokenKind::Eof => "EOF",
            TokenKind::Minus => "-",
            TokenKind::Plus => "+",
            TokenKind::Mult => "*",
            TokenKind::Div => "/",
            TokenKind::Power => "^",
            TokenKind::Mod => "%",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::Equal => "==, is",
            TokenKind::NotEqual => "!=, isnt",
            TokenKind::GreaterOrEqual => ">=",
            TokenKind::LessOrEqual => "<=",
            TokenKind::Greater => ">",
            TokenKind::Less => "<",
            TokenKind::Assign => "=",
            TokenKind::AssignSum => "+=",
            TokenKind::AssignSub => "-=",
            TokenKind::AssignMult => "*=",
            TokenKind::AssignDiv => "/=",
            TokenKind::AssignPow => "^=",
            TokenKind::AssignMod => "%=",
            TokenKind::Comma => ",",
            TokenKind::NumberLiteral => "number",
            TokenKind::StringLiteral => "string",
            TokenKind::BooleanLiteral => "boolean",
            TokenKind::NullLiteral => "null",
            TokenKind::Identifier => "identifier",
            TokenKind::KeywordSet => "set",
            TokenKind::KeywordTrigger => "trigger",
            TokenKind::KeywordWhen => "when",
        }
    }
}

/// A token with its 0-based position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
    pub value: Option<String>,
}

impl Token {
    fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Self {
            kind,
            line,
            column,
            value: None,
        }
    }

    fn with_value(kind: TokenKind, line: usize, column: usize, value: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            column,
            value: Some(value.into()),
        }
    }

    pub fn value(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Default,
    QuotedString,
    Option,
    Logic,
    Variations,
}

pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    indent: Vec<usize>,
    modes: Vec<Mode>,
    pending: VecDeque<Token>,
    at_line_start: bool,
    speaker_on_line: bool,
    quote_start: (usize, usize),
    finished: bool,
}

/// Materializes the complete token stream, failing on the first error.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(input).collect()
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let input = input.trim_start_matches('\u{feff}');
        Self {
            chars: input.chars().collect(),
            position: 0,
            line: 0,
            column: 0,
            indent: vec![0],
            modes: vec![Mode::Default],
            pending: VecDeque::new(),
            at_line_start: true,
            speaker_on_line: false,
            quote_start: (0, 0),
            finished: false,
        }
    }

    fn mode(&self) -> Mode {
        self.modes.last().copied().unwrap_or(Mode::Default)
    }

    fn pop_mode(&mut self) {
        if self.modes.len() > 1 {
            self.modes.pop();
        }
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn starts_with(&self, pattern: &str) -> bool {
        pattern
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek_char(i) == Some(c))
    }

    fn advance(&mut self, count: usize) {
        self.position += count;
        self.column += count;
    }

    fn push(&mut self, token: Token) {
        self.pending.push_back(token);
    }

    fn scan(&mut self) -> Result<(), ParseError> {
        if self.mode() == Mode::QuotedString {
            return self.handle_quoted_text();
        }

        if self.at_line_start && self.mode() != Mode::Logic {
            return self.handle_line_start();
        }

        let Some(c) = self.peek_char(0) else {
            self.handle_eof();
            return Ok(());
        };

        if c == '\n' {
            self.handle_line_break();
            return Ok(());
        }

        if self.mode() == Mode::Logic {
            return self.handle_logic(c);
        }

        match c {
            '{' => {
                self.modes.push(Mode::Logic);
                self.push(Token::new(TokenKind::BraceOpen, self.line, self.column));
                self.advance(1);
            }
            '"' => {
                self.quote_start = (self.line, self.column);
                self.modes.push(Mode::QuotedString);
                self.advance(1);
            }
            ' ' | '\t' | '\r' => self.advance(1),
            '(' => self.handle_variations_start()?,
            ')' if self.mode() == Mode::Variations => {
                self.pop_mode();
                self.push(Token::new(TokenKind::BracketClose, self.line, self.column));
                self.advance(1);
            }
            '=' if self.column == 0 && self.starts_with("==") => self.handle_block(),
            '-' if self.starts_with("->") => self.handle_divert(),
            '<' if self.starts_with("<-") => {
                let token = Token::new(TokenKind::DivertParent, self.line, self.column);
                self.advance(2);
                self.push(token);
                self.push_following_line_break();
            }
            '-' if self.mode() == Mode::Variations => {
                self.push(Token::new(TokenKind::Minus, self.line, self.column));
                self.advance(1);
            }
            '>' if self.starts_with(">>") => {
                self.push(Token::new(TokenKind::OptionsStart, self.line, self.column));
                self.advance(2);
            }
            '*' | '+' | '>' => {
                let kind = match c {
                    '*' => TokenKind::Option,
                    '+' => TokenKind::StickyOption,
                    _ => TokenKind::FallbackOption,
                };
                self.push(Token::new(kind, self.line, self.column));
                self.advance(1);
                self.modes.push(Mode::Option);
            }
            '[' if self.mode() == Mode::Option => {
                self.push(Token::new(TokenKind::SqrBracketOpen, self.line, self.column));
                self.advance(1);
            }
            ']' if self.mode() == Mode::Option => {
                self.push(Token::new(TokenKind::SqrBracketClose, self.line, self.column));
                self.advance(1);
            }
            '$' => self.handle_marker(TokenKind::LineId),
            '#' => self.handle_marker(TokenKind::Tag),
            _ => self.handle_text(),
        }
        Ok(())
    }

    fn handle_line_start(&mut self) -> Result<(), ParseError> {
        self.at_line_start = false;

        let mut width = 0;
        while matches!(self.peek_char(width), Some(' ') | Some('\t')) {
            width += 1;
        }

        match (self.peek_char(width), self.peek_char(width + 1)) {
            (None, _) | (Some('\n'), _) | (Some('\r'), _) => {
                self.advance(width);
                return Ok(());
            }
            (Some('-'), Some('-')) => {
                while let Some(c) = self.peek_char(0) {
                    self.position += 1;
                    if c == '\n' {
                        break;
                    }
                }
                self.line += 1;
                self.column = 0;
                self.at_line_start = true;
                return Ok(());
            }
            _ => {}
        }

        let current = self.indent.last().copied().unwrap_or(0);
        if width > current {
            self.push(Token::new(TokenKind::Indent, self.line, current));
            self.indent.push(width);
        } else {
            while width < self.indent.last().copied().unwrap_or(0) {
                self.indent.pop();
                self.push(Token::new(TokenKind::Dedent, self.line, width));
            }
            if width != self.indent.last().copied().unwrap_or(0) {
                return Err(ParseError::InvalidIndentation {
                    line: self.line + 1,
                    column: width + 1,
                });
            }
        }
        self.advance(width);
        Ok(())
    }

    fn handle_line_break(&mut self) {
        self.position += 1;
        self.line += 1;
        self.column = 0;
        if self.mode() == Mode::Logic {
            return;
        }
        if self.mode() == Mode::Option {
            self.pop_mode();
        }
        self.at_line_start = true;
        self.speaker_on_line = false;
    }

    fn handle_eof(&mut self) {
        while self.indent.len() > 1 {
            self.indent.pop();
            self.push(Token::new(TokenKind::Dedent, self.line, self.column));
        }
        self.push(Token::new(TokenKind::Eof, self.line, self.column));
        self.finished = true;
    }

    fn push_following_line_break(&mut self) {
        let mut offset = 0;
        while matches!(self.peek_char(offset), Some(' ') | Some('\t') | Some('\r')) {
            offset += 1;
        }
        if self.peek_char(offset) == Some('\n') {
            self.push(Token::new(
                TokenKind::LineBreak,
                self.line,
                self.column + offset,
            ));
        }
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek_char(0), Some(' ') | Some('\t')) {
            self.advance(1);
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut value = String::new();
        while let Some(c) = self.peek_char(0) {
            if c.is_alphanumeric() || c == '_' {
                value.push(c);
                self.advance(1);
            } else {
                break;
            }
        }
        value
    }

    fn handle_block(&mut self) {
        let (line, column) = (self.line, self.column);
        self.advance(2);
        self.skip_spaces();
        let name = self.read_identifier();
        self.push(Token::with_value(TokenKind::Block, line, column, name));
    }

    fn handle_divert(&mut self) {
        let (line, column) = (self.line, self.column);
        self.advance(2);
        self.skip_spaces();
        let target = self.read_identifier();
        self.push(Token::with_value(TokenKind::Divert, line, column, target));
        self.push_following_line_break();
    }

    fn handle_marker(&mut self, kind: TokenKind) {
        let (line, column) = (self.line, self.column);
        self.advance(1);
        let mut value = String::new();
        while let Some(c) = self.peek_char(0) {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                value.push(c);
                self.advance(1);
            } else {
                break;
            }
        }
        self.push(Token::with_value(kind, line, column, value));
    }

    fn handle_variations_start(&mut self) -> Result<(), ParseError> {
        self.push(Token::new(TokenKind::BracketOpen, self.line, self.column));
        self.advance(1);
        self.modes.push(Mode::Variations);

        self.skip_spaces();
        if !self.peek_char(0).is_some_and(|c| c.is_alphabetic()) {
            return Ok(());
        }

        let (line, column) = (self.line, self.column);
        let mut raw = String::new();
        while let Some(c) = self.peek_char(0) {
            if c == '\n' {
                break;
            }
            raw.push(c);
            self.advance(1);
        }
        let mode = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if VariationMode::from_name(&mode).is_none() {
            return Err(ParseError::InvalidVariationMode {
                mode,
                line: line + 1,
                column: column + 1,
            });
        }
        self.push(Token::with_value(TokenKind::VariationsMode, line, column, mode));
        Ok(())
    }

    fn handle_text(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut value = String::new();

        while let Some(c) = self.peek_char(0) {
            match c {
                '\n' | '$' | '#' | '{' => break,
                '[' | ']' if self.mode() == Mode::Option => break,
                '\\' => {
                    self.advance(1);
                    if let Some(escaped) = self.peek_char(0) {
                        value.push(if escaped == 'n' { '\n' } else { escaped });
                        self.advance(1);
                    }
                }
                ':' if !self.speaker_on_line => {
                    self.advance(1);
                    self.speaker_on_line = true;
                    self.push(Token::with_value(
                        TokenKind::Speaker,
                        line,
                        column,
                        value.trim(),
                    ));
                    return;
                }
                _ => {
                    value.push(c);
                    self.advance(1);
                }
            }
        }

        self.push(Token::with_value(TokenKind::Text, line, column, value.trim()));
    }

    fn handle_quoted_text(&mut self) -> Result<(), ParseError> {
        let (line, column) = self.quote_start;
        let mut value = String::new();

        loop {
            let Some(c) = self.peek_char(0) else {
                return Err(ParseError::UnterminatedString {
                    line: line + 1,
                    column: column + 1,
                });
            };
            match c {
                '"' => {
                    self.advance(1);
                    break;
                }
                '\\' => {
                    self.advance(1);
                    if let Some(escaped) = self.peek_char(0) {
                        value.push(if escaped == 'n' { '\n' } else { escaped });
                        self.advance(1);
                    }
                }
                '\n' => {
                    value.push(c);
                    self.position += 1;
                    self.line += 1;
                    self.column = 0;
                }
                _ => {
                    value.push(c);
                    self.advance(1);
                }
            }
        }

        self.pop_mode();
        self.push(Token::with_value(TokenKind::Text, line, column, value));
        Ok(())
    }

    fn handle_logic(&mut self, c: char) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column);

        if c == '}' {
            self.advance(1);
            self.pop_mode();
            self.push(Token::new(TokenKind::BraceClose, line, column));
            self.push_following_line_break();
            return Ok(());
        }

        if c == ' ' || c == '\t' || c == '\r' {
            self.advance(1);
            return Ok(());
        }

        if c == '"' || c == '\'' {
            return self.handle_logic_string(c);
        }

        if c.is_ascii_digit() {
            let mut value = String::new();
            while let Some(d) = self.peek_char(0) {
                let is_fraction = d == '.'
                    && !value.contains('.')
                    && self.peek_char(1).is_some_and(|n| n.is_ascii_digit());
                if d.is_ascii_digit() || is_fraction {
                    value.push(d);
                    self.advance(1);
                } else {
                    break;
                }
            }
            self.push(Token::with_value(
                TokenKind::NumberLiteral,
                line,
                column,
                value,
            ));
            return Ok(());
        }

        if c.is_alphabetic() || c == '_' {
            let name = self.read_identifier();
            let token = match name.to_lowercase().as_str() {
                "is" => Token::new(TokenKind::Equal, line, column),
                "isnt" => Token::new(TokenKind::NotEqual, line, column),
                "or" => Token::new(TokenKind::Or, line, column),
                "and" => Token::new(TokenKind::And, line, column),
                "not" => Token::new(TokenKind::Not, line, column),
                "set" => Token::new(TokenKind::KeywordSet, line, column),
                "trigger" => Token::new(TokenKind::KeywordTrigger, line, column),
                "when" => Token::new(TokenKind::KeywordWhen, line, column),
                "null" => Token::new(TokenKind::NullLiteral, line, column),
                lowered @ ("true" | "false") => {
                    Token::with_value(TokenKind::BooleanLiteral, line, column, lowered)
                }
                _ => Token::with_value(TokenKind::Identifier, line, column, name),
            };
            self.push(token);
            return Ok(());
        }

        let two: String = [Some(c), self.peek_char(1)].iter().flatten().collect();
        let double = match two.as_str() {
            "==" => Some(TokenKind::Equal),
            "!=" => Some(TokenKind::NotEqual),
            "&&" => Some(TokenKind::And),
            "||" => Some(TokenKind::Or),
            ">=" => Some(TokenKind::GreaterOrEqual),
            "<=" => Some(TokenKind::LessOrEqual),
            "+=" => Some(TokenKind::AssignSum),
            "-=" => Some(TokenKind::AssignSub),
            "*=" => Some(TokenKind::AssignMult),
            "/=" => Some(TokenKind::AssignDiv),
            "^=" => Some(TokenKind::AssignPow),
            "%=" => Some(TokenKind::AssignMod),
            _ => None,
        };
        if let Some(kind) = double {
            self.advance(2);
            self.push(Token::new(kind, line, column));
            return Ok(());
        }

        let single = match c {
            '!' => TokenKind::Not,
            '>' => TokenKind::Greater,
            '<' => TokenKind::Less,
            '=' => TokenKind::Assign,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Mult,
            '/' => TokenKind::Div,
            '^' => TokenKind::Power,
            '%' => TokenKind::Mod,
            ',' => TokenKind::Comma,
            '(' => TokenKind::BracketOpen,
            ')' => TokenKind::BracketClose,
            _ => {
                return Err(ParseError::UnexpectedCharacter {
                    character: c,
                    line: line + 1,
                    column: column + 1,
                })
            }
        };
        self.advance(1);
        self.push(Token::new(single, line, column));
        Ok(())
    }

    fn handle_logic_string(&mut self, quote: char) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column);
        self.advance(1);
        let mut value = String::new();
        loop {
            match self.peek_char(0) {
                None | Some('\n') => {
                    return Err(ParseError::UnterminatedString {
                        line: line + 1,
                        column: column + 1,
                    })
                }
                Some('\\') => {
                    self.advance(1);
                    if let Some(escaped) = self.peek_char(0) {
                        value.push(escaped);
                        self.advance(1);
                    }
                }
                Some(c) if c == quote => {
                    self.advance(1);
                    break;
                }
                Some(c) => {
                    value.push(c);
                    self.advance(1);
                }
            }
        }
        self.push(Token::with_value(
            TokenKind::StringLiteral,
            line,
            column,
            value,
        ));
        Ok(())
    }
}

impl Iterator for Lexer {
    type Item = Result<Token, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }
            if self.finished {
                return None;
            }
            if let Err(err) = self.scan() {
                self.finished = true;
                self.pending.clear();
                return Some(Err(err));
            }
        }
    }
}
