use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::types::Value;

pub const DIVERT_PARENT: &str = "<parent>";
pub const DIVERT_END: &str = "<end>";

const NODE_TYPES: [&str; 17] = [
    "document",
    "block",
    "content",
    "line",
    "options",
    "option",
    "divert",
    "variations",
    "conditional_content",
    "action_content",
    "assignments",
    "assignment",
    "expression",
    "variable",
    "literal",
    "events",
    "event",
];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename = "document")]
pub struct Document {
    pub content: Vec<Node>,
    pub blocks: Vec<Block>,
}

impl Document {
    /// Decodes a document tree produced by external tooling.
    ///
    /// Node kinds this crate does not know about are reported by name
    /// instead of surfacing a generic decode error.
    pub fn from_json(json: &str) -> Result<Self, RuntimeError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        check_node_types(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<String, RuntimeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, RuntimeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn check_node_types(value: &serde_json::Value) -> Result<(), RuntimeError> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(kind)) = map.get("type") {
                if !NODE_TYPES.contains(&kind.as_str()) {
                    return Err(RuntimeError::UnknownNodeType(kind.clone()));
                }
            }
            map.values().try_for_each(check_node_types)
        }
        serde_json::Value::Array(items) => items.iter().try_for_each(check_node_types),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "block")]
pub struct Block {
    pub name: String,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename = "content")]
pub struct Content {
    pub content: Vec<Node>,
}

impl Content {
    pub fn new(content: Vec<Node>) -> Self {
        Self { content }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Content { content: Vec<Node> },
    Line(Line),
    Options(Options),
    Option(OptionNode),
    Divert(Divert),
    Variations(Variations),
    ConditionalContent(ConditionalContent),
    ActionContent(ActionContent),
    Assignments(Assignments),
    Events(Events),
}

impl From<Content> for Node {
    fn from(c: Content) -> Self {
        Node::Content { content: c.content }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Line {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Options {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub content: Vec<Node>, // Option, or conditional/action wrapped Option
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionNode {
    pub name: String,
    #[serde(default)]
    pub mode: OptionMode,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionMode {
    #[default]
    Once,
    Sticky,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divert {
    pub target: String, // block name, `<parent>` or `<end>`
}

impl Divert {
    pub fn new(target: &str) -> Self {
        let target = if target == "END" { DIVERT_END } else { target };
        Self {
            target: target.to_string(),
        }
    }

    pub fn parent() -> Self {
        Self {
            target: DIVERT_PARENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variations {
    pub mode: VariationMode,
    pub content: Vec<Content>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VariationMode {
    #[default]
    #[serde(rename = "sequence")]
    Sequence,
    #[serde(rename = "once")]
    Once,
    #[serde(rename = "cycle")]
    Cycle,
    #[serde(rename = "shuffle")]
    Shuffle,
    #[serde(rename = "shuffle sequence")]
    ShuffleSequence,
    #[serde(rename = "shuffle once")]
    ShuffleOnce,
    #[serde(rename = "shuffle cycle")]
    ShuffleCycle,
}

impl VariationMode {
    pub const NAMES: [&'static str; 7] = [
        "sequence",
        "once",
        "cycle",
        "shuffle",
        "shuffle sequence",
        "shuffle once",
        "shuffle cycle",
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let mode = match name {
            "sequence" => VariationMode::Sequence,
            "once" => VariationMode::Once,
            "cycle" => VariationMode::Cycle,
            "shuffle" => VariationMode::Shuffle,
            "shuffle sequence" => VariationMode::ShuffleSequence,
            "shuffle once" => VariationMode::ShuffleOnce,
            "shuffle cycle" => VariationMode::ShuffleCycle,
            _ => return None,
        };
        Some(mode)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalContent {
    pub conditions: Expr,
    pub content: Box<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionContent {
    pub action: Action,
    pub content: Box<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Assignments(Assignments),
    Events(Events),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignments {
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "assignment")]
pub struct Assignment {
    pub variable: Variable,
    pub operation: AssignOp,
    pub value: Box<AssignmentValue>,
}

/// Right-hand side of an assignment; chained assignments nest here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssignmentValue {
    Assignment(Assignment),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MultAssign,
    DivAssign,
    PowAssign,
    ModAssign,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "variable")]
pub struct Variable {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    Expression(Expression),
    Variable { name: String },
    Literal(Literal),
}

impl Expr {
    pub fn variable(name: impl Into<String>) -> Self {
        Expr::Variable { name: name.into() }
    }

    pub fn literal(value: Value) -> Self {
        Expr::Literal(Literal::new(value))
    }

    pub fn binary(name: Operator, left: Expr, right: Expr) -> Self {
        Expr::Expression(Expression {
            name,
            elements: vec![left, right],
        })
    }

    pub fn unary(name: Operator, operand: Expr) -> Self {
        Expr::Expression(Expression {
            name,
            elements: vec![operand],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub name: Operator,
    pub elements: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    And,
    Or,
    Not,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    Power,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub name: LiteralKind,
    pub value: Value,
}

impl Literal {
    pub fn new(value: Value) -> Self {
        let name = match value {
            Value::Null => LiteralKind::Null,
            Value::Bool(_) => LiteralKind::Boolean,
            Value::Number(_) => LiteralKind::Number,
            Value::String(_) => LiteralKind::String,
        };
        Self { name, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralKind {
    Number,
    Boolean,
    String,
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Events {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "event")]
pub struct Event {
    pub name: String,
}
