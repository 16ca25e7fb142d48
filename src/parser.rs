use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::types::Value;

use TokenKind as T;

const OPTION_MARKERS: [TokenKind; 3] = [T::Option, T::StickyOption, T::FallbackOption];

const LINE_STARTS: [TokenKind; 11] = [
    T::Speaker,
    T::Text,
    T::Option,
    T::StickyOption,
    T::FallbackOption,
    T::OptionsStart,
    T::Divert,
    T::DivertParent,
    T::BracketOpen,
    T::BraceOpen,
    T::LineBreak,
];

const OPERAND_STARTS: [TokenKind; 8] = [
    T::Not,
    T::Minus,
    T::BracketOpen,
    T::NumberLiteral,
    T::StringLiteral,
    T::BooleanLiteral,
    T::NullLiteral,
    T::Identifier,
];

const ASSIGN_OPERATORS: [TokenKind; 7] = [
    T::Assign,
    T::AssignSum,
    T::AssignSub,
    T::AssignMult,
    T::AssignDiv,
    T::AssignPow,
    T::AssignMod,
];

/// Parses dialogue source into a document tree.
pub fn parse(input: &str) -> Result<Document, ParseError> {
    Parser::new(input).parse_document()
}

/// Contents of a `{ ... }` block before it is attached to what it governs.
enum LogicBlock {
    Action(Action),
    Condition(Expr),
}

impl LogicBlock {
    fn wrap(self, node: Node) -> Node {
        match self {
            LogicBlock::Action(action) => Node::ActionContent(ActionContent {
                action,
                content: Box::new(node),
            }),
            LogicBlock::Condition(conditions) => Node::ConditionalContent(ConditionalContent {
                conditions,
                content: Box::new(node),
            }),
        }
    }
}

/// What a standalone logic block ended up governing.
enum Governed {
    /// An option, possibly wrapped; belongs inside an options list.
    Item(Node),
    Statement(Node),
}

struct LineParts {
    value: String,
    speaker: Option<String>,
    id: Option<String>,
    tags: Vec<String>,
}

impl LineParts {
    fn into_line(self) -> Node {
        Node::Line(Line {
            value: self.value,
            speaker: self.speaker,
            id: self.id,
            tags: self.tags,
        })
    }

    fn into_options_header(self) -> Options {
        Options {
            name: Some(self.value),
            speaker: self.speaker,
            id: self.id,
            tags: self.tags,
            content: vec![],
        }
    }
}

struct Parser {
    lexer: Lexer,
    lookahead: Option<Token>,
    last: Token,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            lexer: Lexer::new(input),
            lookahead: None,
            last: Token {
                kind: T::Eof,
                line: 0,
                column: 0,
                value: None,
            },
        }
    }

    fn fill(&mut self) -> Result<&Token, ParseError> {
        if self.lookahead.is_none() {
            let token = match self.lexer.next() {
                Some(token) => token?,
                None => self.last.clone(),
            };
            self.last = token.clone();
            self.lookahead = Some(token);
        }
        Ok(self.lookahead.get_or_insert_with(|| self.last.clone()))
    }

    fn peek_kind(&mut self) -> Result<TokenKind, ParseError> {
        Ok(self.fill()?.kind)
    }

    fn next_is(&mut self, kinds: &[TokenKind]) -> Result<bool, ParseError> {
        let kind = self.peek_kind()?;
        Ok(kinds.contains(&kind))
    }

    fn unexpected(&mut self, expected: &[TokenKind]) -> ParseError {
        match self.fill() {
            Ok(token) => ParseError::UnexpectedToken {
                found: token.kind.hint().to_string(),
                line: token.line + 1,
                column: token.column + 1,
                expected: expected.iter().map(|k| k.hint().to_string()).collect(),
            },
            Err(err) => err,
        }
    }

    fn consume(&mut self, expected: &[TokenKind]) -> Result<Token, ParseError> {
        let token = self.fill()?.clone();
        if !expected.contains(&token.kind) {
            return Err(self.unexpected(expected));
        }
        self.lookahead = None;
        Ok(token)
    }

    fn skip(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.next_is(&[kind])? {
            self.consume(&[kind])?;
        }
        Ok(())
    }

    fn parse_document(&mut self) -> Result<Document, ParseError> {
        let mut document = Document::default();

        if self.next_is(&LINE_STARTS)? {
            document.content = self.parse_lines()?;
        }
        if self.next_is(&[T::Block])? {
            document.blocks = self.parse_blocks()?;
        }

        let mut expected = LINE_STARTS.to_vec();
        expected.extend([T::Block, T::Eof]);
        if !self.next_is(&[T::Eof])? {
            return Err(self.unexpected(&expected));
        }
        Ok(document)
    }

    fn parse_blocks(&mut self) -> Result<Vec<Block>, ParseError> {
        let mut blocks = Vec::new();
        while self.next_is(&[T::Block])? {
            let token = self.consume(&[T::Block])?;
            let content = if self.next_is(&[T::Indent])? {
                self.consume(&[T::Indent])?;
                let lines = self.parse_lines()?;
                self.consume(&[T::Dedent])?;
                lines
            } else {
                self.parse_lines()?
            };
            blocks.push(Block {
                name: token.value().to_string(),
                content: Content::new(content),
            });
        }
        Ok(blocks)
    }

    fn parse_lines(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut lines = Vec::new();
        loop {
            match self.peek_kind()? {
                T::Speaker | T::Text => self.parse_line_statement(&mut lines)?,
                T::Option | T::StickyOption | T::FallbackOption => {
                    let mut trailing = Vec::new();
                    let options = self.parse_options(Options::default(), None, &mut trailing)?;
                    lines.push(options);
                    lines.append(&mut trailing);
                }
                T::OptionsStart => self.parse_options_start(&mut lines)?,
                T::Divert | T::DivertParent => lines.push(self.parse_divert()?),
                T::BracketOpen => lines.push(self.parse_variations()?),
                T::BraceOpen => {
                    let block = self.parse_logic_block()?;
                    match self.parse_governed(block)? {
                        Governed::Statement(node) => lines.push(node),
                        Governed::Item(item) => {
                            let mut trailing = Vec::new();
                            let options =
                                self.parse_options(Options::default(), Some(item), &mut trailing)?;
                            lines.push(options);
                            lines.append(&mut trailing);
                        }
                    }
                }
                T::LineBreak => {
                    self.consume(&[T::LineBreak])?;
                }
                _ => break,
            }
        }
        Ok(lines)
    }

    fn parse_line_parts(&mut self) -> Result<LineParts, ParseError> {
        let mut speaker = None;
        if self.next_is(&[T::Speaker])? {
            speaker = Some(self.consume(&[T::Speaker])?.value().to_string());
        }
        let text = self.consume(&[T::Text])?;
        let mut parts = LineParts {
            value: text.value().to_string(),
            speaker,
            id: None,
            tags: vec![],
        };
        self.parse_line_markers(&mut parts)?;
        Ok(parts)
    }

    fn parse_line_markers(&mut self, parts: &mut LineParts) -> Result<(), ParseError> {
        while self.next_is(&[T::LineId, T::Tag])? {
            let token = self.consume(&[T::LineId, T::Tag])?;
            if token.kind == T::LineId {
                parts.id = Some(token.value().to_string());
            } else {
                parts.tags.push(token.value().to_string());
            }
        }
        Ok(())
    }

    fn parse_trailing_logic(&mut self) -> Result<Vec<LogicBlock>, ParseError> {
        let mut blocks = Vec::new();
        while self.next_is(&[T::BraceOpen])? {
            blocks.push(self.parse_logic_block()?);
        }
        self.skip(T::LineBreak)?;
        Ok(blocks)
    }

    fn wrap_all(blocks: Vec<LogicBlock>, node: Node) -> Node {
        blocks
            .into_iter()
            .rev()
            .fold(node, |node, block| block.wrap(node))
    }

    /// A dialogue line, its indented continuation, or the header of an
    /// indented options list.
    fn parse_line_statement(&mut self, out: &mut Vec<Node>) -> Result<(), ParseError> {
        let mut parts = self.parse_line_parts()?;
        let blocks = self.parse_trailing_logic()?;

        if !self.next_is(&[T::Indent])? {
            out.push(Self::wrap_all(blocks, parts.into_line()));
            return Ok(());
        }
        self.consume(&[T::Indent])?;

        let mut item_starts = OPTION_MARKERS.to_vec();
        item_starts.push(T::BraceOpen);
        if self.next_is(&item_starts)? {
            let mut trailing = Vec::new();
            let options = self.parse_options(parts.into_options_header(), None, &mut trailing)?;
            out.push(Self::wrap_all(blocks, options));
            out.append(&mut trailing);
            if !self.next_is(&[T::Dedent])? {
                let mut rest = self.parse_lines()?;
                out.append(&mut rest);
            }
            self.consume(&[T::Dedent])?;
            return Ok(());
        }

        while self.next_is(&[T::Text])? {
            let text = self.consume(&[T::Text])?;
            parts.value.push(' ');
            parts.value.push_str(text.value());
            self.parse_line_markers(&mut parts)?;
        }
        self.consume(&[T::Dedent])?;
        out.push(Self::wrap_all(blocks, parts.into_line()));
        Ok(())
    }

    fn parse_options_start(&mut self, out: &mut Vec<Node>) -> Result<(), ParseError> {
        self.consume(&[T::OptionsStart])?;
        let header = if self.next_is(&[T::Speaker, T::Text])? {
            self.parse_line_parts()?.into_options_header()
        } else {
            Options::default()
        };
        self.skip(T::LineBreak)?;

        let mut trailing = Vec::new();
        if self.next_is(&[T::Indent])? {
            self.consume(&[T::Indent])?;
            let options = self.parse_options(header, None, &mut trailing)?;
            out.push(options);
            out.append(&mut trailing);
            if !self.next_is(&[T::Dedent])? {
                let mut rest = self.parse_lines()?;
                out.append(&mut rest);
            }
            self.consume(&[T::Dedent])?;
        } else {
            let options = self.parse_options(header, None, &mut trailing)?;
            out.push(options);
            out.append(&mut trailing);
        }
        Ok(())
    }

    /// Collects consecutive options. A logic block that turns out not to
    /// govern an option ends the list and is handed back in `trailing`.
    fn parse_options(
        &mut self,
        mut header: Options,
        first: Option<Node>,
        trailing: &mut Vec<Node>,
    ) -> Result<Node, ParseError> {
        if let Some(item) = first {
            header.content.push(item);
        } else {
            let mut expected = OPTION_MARKERS.to_vec();
            expected.push(T::BraceOpen);
            if !self.next_is(&expected)? {
                return Err(self.unexpected(&expected));
            }
        }

        loop {
            match self.peek_kind()? {
                T::Option | T::StickyOption | T::FallbackOption => {
                    header.content.push(self.parse_option()?);
                }
                T::BraceOpen => {
                    let block = self.parse_logic_block()?;
                    match self.parse_governed(block)? {
                        Governed::Item(item) => header.content.push(item),
                        Governed::Statement(node) => {
                            trailing.push(node);
                            break;
                        }
                    }
                }
                T::LineBreak => {
                    self.consume(&[T::LineBreak])?;
                }
                _ => break,
            }
        }
        Ok(Node::Options(header))
    }

    fn parse_option(&mut self) -> Result<Node, ParseError> {
        let marker = self.consume(&OPTION_MARKERS)?;
        let mode = match marker.kind {
            T::StickyOption => OptionMode::Sticky,
            T::FallbackOption => OptionMode::Fallback,
            _ => OptionMode::Once,
        };

        let mut blocks = Vec::new();
        while self.next_is(&[T::BraceOpen])? {
            blocks.push(self.parse_logic_block()?);
        }

        let mut content = Vec::new();
        let parts = match self.peek_kind()? {
            T::SqrBracketOpen => {
                self.consume(&[T::SqrBracketOpen])?;
                let mut parts = self.parse_line_parts()?;
                self.consume(&[T::SqrBracketClose])?;
                self.parse_line_markers(&mut parts)?;
                if self.next_is(&[T::Text])? {
                    let text = self.consume(&[T::Text])?;
                    let mut shown = LineParts {
                        value: text.value().to_string(),
                        speaker: parts.speaker.clone(),
                        id: None,
                        tags: vec![],
                    };
                    self.parse_line_markers(&mut shown)?;
                    content.push(shown.into_line());
                }
                parts
            }
            T::Speaker | T::Text => {
                let parts = self.parse_line_parts()?;
                content.push(Node::Line(Line {
                    value: parts.value.clone(),
                    speaker: parts.speaker.clone(),
                    id: parts.id.clone(),
                    tags: parts.tags.clone(),
                }));
                parts
            }
            _ => {
                return Err(self.unexpected(&[
                    T::Speaker,
                    T::Text,
                    T::SqrBracketOpen,
                    T::BraceOpen,
                ]))
            }
        };

        blocks.extend(self.parse_trailing_logic()?);

        if self.next_is(&[T::Divert, T::DivertParent])? {
            content.push(self.parse_divert()?);
        }
        if self.next_is(&[T::Indent])? {
            self.consume(&[T::Indent])?;
            content.extend(self.parse_lines()?);
            self.consume(&[T::Dedent])?;
        }

        let option = Node::Option(OptionNode {
            name: parts.value,
            mode,
            content: Content::new(content),
            speaker: parts.speaker,
            id: parts.id,
            tags: parts.tags,
        });
        Ok(Self::wrap_all(blocks, option))
    }

    fn parse_divert(&mut self) -> Result<Node, ParseError> {
        let token = self.consume(&[T::Divert, T::DivertParent])?;
        let divert = match token.kind {
            T::Divert => Divert::new(token.value()),
            _ => Divert::parent(),
        };
        let blocks = self.parse_trailing_logic()?;
        Ok(Self::wrap_all(blocks, Node::Divert(divert)))
    }

    fn parse_variations(&mut self) -> Result<Node, ParseError> {
        self.consume(&[T::BracketOpen])?;
        let mode = if self.next_is(&[T::VariationsMode])? {
            let token = self.consume(&[T::VariationsMode])?;
            VariationMode::from_name(token.value()).unwrap_or_default()
        } else {
            VariationMode::default()
        };

        let mut alternatives = Vec::new();
        let mut depth = 0usize;
        loop {
            let token = self.consume(&[T::Indent, T::Dedent, T::LineBreak, T::Minus, T::BracketClose])?;
            match token.kind {
                T::Indent => depth += 1,
                T::Dedent => depth = depth.saturating_sub(1),
                T::Minus => {
                    let lines = if self.next_is(&[T::Indent])? {
                        self.consume(&[T::Indent])?;
                        let lines = self.parse_lines()?;
                        self.consume(&[T::Dedent])?;
                        lines
                    } else {
                        self.parse_lines()?
                    };
                    alternatives.push(Content::new(lines));
                }
                T::BracketClose => break,
                _ => {}
            }
        }

        // `)` may sit deeper than the opening `(`
        while depth > 0 && self.next_is(&[T::Dedent])? {
            self.consume(&[T::Dedent])?;
            depth -= 1;
        }

        Ok(Node::Variations(Variations {
            mode,
            content: alternatives,
        }))
    }

    fn parse_logic_block(&mut self) -> Result<LogicBlock, ParseError> {
        self.consume(&[T::BraceOpen])?;
        let block = match self.peek_kind()? {
            T::KeywordSet => LogicBlock::Action(Action::Assignments(self.parse_assignments()?)),
            T::KeywordTrigger => LogicBlock::Action(Action::Events(self.parse_events()?)),
            _ => {
                self.skip(T::KeywordWhen)?;
                LogicBlock::Condition(self.parse_expression(0)?)
            }
        };
        self.consume(&[T::BraceClose])?;
        Ok(block)
    }

    /// Attaches a standalone logic block to whatever follows it.
    fn parse_governed(&mut self, block: LogicBlock) -> Result<Governed, ParseError> {
        if self.next_is(&[T::LineBreak])? {
            self.consume(&[T::LineBreak])?;
            let condition = match block {
                LogicBlock::Action(Action::Assignments(assignments)) => {
                    return Ok(Governed::Statement(Node::Assignments(assignments)))
                }
                LogicBlock::Action(Action::Events(events)) => {
                    return Ok(Governed::Statement(Node::Events(events)))
                }
                LogicBlock::Condition(condition) => condition,
            };
            if self.next_is(&[T::Indent])? {
                self.consume(&[T::Indent])?;
                let content = self.parse_lines()?;
                self.consume(&[T::Dedent])?;
                let block = LogicBlock::Condition(condition);
                return Ok(Governed::Statement(block.wrap(Node::Content { content })));
            }
            return self.parse_governed(LogicBlock::Condition(condition));
        }

        if let LogicBlock::Action(action) = block {
            if self.next_is(&[T::Eof, T::Dedent])? {
                let node = match action {
                    Action::Assignments(assignments) => Node::Assignments(assignments),
                    Action::Events(events) => Node::Events(events),
                };
                return Ok(Governed::Statement(node));
            }
            return self.parse_governed_target(LogicBlock::Action(action));
        }
        self.parse_governed_target(block)
    }

    fn parse_governed_target(&mut self, block: LogicBlock) -> Result<Governed, ParseError> {
        match self.peek_kind()? {
            T::Option | T::StickyOption | T::FallbackOption => {
                Ok(Governed::Item(block.wrap(self.parse_option()?)))
            }
            T::BraceOpen => {
                let inner = self.parse_logic_block()?;
                Ok(match self.parse_governed(inner)? {
                    Governed::Item(node) => Governed::Item(block.wrap(node)),
                    Governed::Statement(node) => Governed::Statement(block.wrap(node)),
                })
            }
            T::Speaker | T::Text => {
                let mut nodes = Vec::new();
                self.parse_line_statement(&mut nodes)?;
                let node = if nodes.len() == 1 {
                    nodes.remove(0)
                } else {
                    Node::Content { content: nodes }
                };
                Ok(Governed::Statement(block.wrap(node)))
            }
            T::Divert | T::DivertParent => Ok(Governed::Statement(block.wrap(self.parse_divert()?))),
            T::BracketOpen => Ok(Governed::Statement(block.wrap(self.parse_variations()?))),
            T::OptionsStart => {
                let mut nodes = Vec::new();
                self.parse_options_start(&mut nodes)?;
                let node = if nodes.len() == 1 {
                    nodes.remove(0)
                } else {
                    Node::Content { content: nodes }
                };
                Ok(Governed::Statement(block.wrap(node)))
            }
            _ => Err(self.unexpected(&[
                T::Speaker,
                T::Text,
                T::Option,
                T::StickyOption,
                T::FallbackOption,
                T::OptionsStart,
                T::Divert,
                T::DivertParent,
                T::BracketOpen,
                T::BraceOpen,
            ])),
        }
    }

    fn parse_assignments(&mut self) -> Result<Assignments, ParseError> {
        self.consume(&[T::KeywordSet])?;
        let mut assignments = vec![self.parse_assignment()?];
        while self.next_is(&[T::Comma])? {
            self.consume(&[T::Comma])?;
            assignments.push(self.parse_assignment()?);
        }
        Ok(Assignments { assignments })
    }

    fn parse_assignment(&mut self) -> Result<Assignment, ParseError> {
        let variable = self.consume(&[T::Identifier])?;
        let operator = self.consume(&ASSIGN_OPERATORS)?;
        Ok(Assignment {
            variable: Variable {
                name: variable.value().to_string(),
            },
            operation: assign_operation(operator.kind),
            value: Box::new(self.parse_assignment_value()?),
        })
    }

    /// Right side of an assignment. A bare variable followed by another
    /// assignment operator chains to the right: `a = b = 1`.
    fn parse_assignment_value(&mut self) -> Result<AssignmentValue, ParseError> {
        let expr = self.parse_expression(0)?;
        if let Expr::Variable { name } = &expr {
            if self.next_is(&ASSIGN_OPERATORS)? {
                let operator = self.consume(&ASSIGN_OPERATORS)?;
                return Ok(AssignmentValue::Assignment(Assignment {
                    variable: Variable { name: name.clone() },
                    operation: assign_operation(operator.kind),
                    value: Box::new(self.parse_assignment_value()?),
                }));
            }
        }
        Ok(AssignmentValue::Expr(expr))
    }

    fn parse_events(&mut self) -> Result<Events, ParseError> {
        self.consume(&[T::KeywordTrigger])?;
        let mut events = vec![Event {
            name: self.consume(&[T::Identifier])?.value().to_string(),
        }];
        while self.next_is(&[T::Comma])? {
            self.consume(&[T::Comma])?;
            events.push(Event {
                name: self.consume(&[T::Identifier])?.value().to_string(),
            });
        }
        Ok(Events { events })
    }

    fn parse_expression(&mut self, min_precedence: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_operand()?;
        loop {
            let kind = self.peek_kind()?;
            let Some((operator, precedence, right_assoc)) = binary_operator(kind) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.consume(&[kind])?;
            let next = if right_assoc { precedence } else { precedence + 1 };
            let right = self.parse_expression(next)?;
            left = Expr::binary(operator, left, right);
        }
        Ok(left)
    }

    fn parse_operand(&mut self) -> Result<Expr, ParseError> {
        let token = self.consume(&OPERAND_STARTS)?;
        let expr = match token.kind {
            T::Not => Expr::unary(Operator::Not, self.parse_operand()?),
            T::Minus => {
                let number = self.consume(&[T::NumberLiteral])?;
                Expr::literal(Value::Number(-parse_number(&number)?))
            }
            T::BracketOpen => {
                let inner = self.parse_expression(0)?;
                self.consume(&[T::BracketClose])?;
                inner
            }
            T::NumberLiteral => Expr::literal(Value::Number(parse_number(&token)?)),
            T::StringLiteral => Expr::literal(Value::String(token.value().to_string())),
            T::BooleanLiteral => Expr::literal(Value::Bool(token.value() == "true")),
            T::NullLiteral => Expr::literal(Value::Null),
            _ => Expr::variable(token.value()),
        };
        Ok(expr)
    }
}

fn parse_number(token: &Token) -> Result<f64, ParseError> {
    token
        .value()
        .parse()
        .map_err(|_| ParseError::UnexpectedToken {
            found: token.value().to_string(),
            line: token.line + 1,
            column: token.column + 1,
            expected: vec![T::NumberLiteral.hint().to_string()],
        })
}

/// Operator, precedence and right associativity for binary operator tokens.
fn binary_operator(kind: TokenKind) -> Option<(Operator, u8, bool)> {
    let entry = match kind {
        T::Or => (Operator::Or, 1, false),
        T::And => (Operator::And, 1, false),
        T::Equal => (Operator::Equal, 2, false),
        T::NotEqual => (Operator::NotEqual, 2, false),
        T::Greater => (Operator::GreaterThan, 2, false),
        T::GreaterOrEqual => (Operator::GreaterOrEqual, 2, false),
        T::Less => (Operator::LessThan, 2, false),
        T::LessOrEqual => (Operator::LessOrEqual, 2, false),
        T::Plus => (Operator::Add, 3, false),
        T::Minus => (Operator::Sub, 3, false),
        T::Mod => (Operator::Mod, 4, false),
        T::Mult => (Operator::Mult, 5, false),
        T::Div => (Operator::Div, 5, false),
        T::Power => (Operator::Power, 7, true),
        _ => return None,
    };
    Some(entry)
}

fn assign_operation(kind: TokenKind) -> AssignOp {
    match kind {
        T::AssignSum => AssignOp::AddAssign,
        T::AssignSub => AssignOp::SubAssign,
        T::AssignMult => AssignOp::MultAssign,
        T::AssignDiv => AssignOp::DivAssign,
        T::AssignPow => AssignOp::PowAssign,
        T::AssignMod => AssignOp::ModAssign,
        _ => AssignOp::Assign,
    }
}
