//! Flat arena view of a [`Document`].
//!
//! Interpreters never walk the serde tree directly. [`Program::new`] copies
//! it once into an arena where every node has a [`NodeId`] and a structural
//! index derived from its ancestry:
//!
//! * the document root is `1`;
//! * a child at position `p` of a document, block or content node with
//!   index `i` gets `10 * i + p`;
//! * an option or a variation alternative at position `p` gets `100 * i + p`;
//! * conditional and action wrappers hand their own index to what they wrap;
//! * an option's content shares the option's index.
//!
//! Blocks are numbered as document children placed after the top-level
//! content. Memory is keyed by these indices, so a snapshot stays valid for
//! any program built from the same source.

use std::collections::HashMap;

use crate::ast::{
    Action, Assignments, Divert, Document, Events, Expr, Line, Node, OptionMode, VariationMode,
};

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct OptionsHeader {
    pub name: Option<String>,
    pub speaker: Option<String>,
    pub id: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionEntry {
    pub name: String,
    pub mode: OptionMode,
    pub speaker: Option<String>,
    pub id: Option<String>,
    pub tags: Vec<String>,
    /// Content node pushed when the option is chosen.
    pub content: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document { children: Vec<NodeId> },
    Block { name: String, children: Vec<NodeId> },
    Content { children: Vec<NodeId> },
    Line(Line),
    Options { header: OptionsHeader, items: Vec<NodeId> },
    Option(OptionEntry),
    Divert(Divert),
    Variations { mode: VariationMode, alternatives: Vec<NodeId> },
    Conditional { conditions: Expr, content: NodeId },
    Action { action: Action, content: NodeId },
    Assignments(Assignments),
    Events(Events),
}

impl NodeKind {
    /// Children walked in order by a container frame.
    pub fn children(&self) -> &[NodeId] {
        match self {
            NodeKind::Document { children }
            | NodeKind::Block { children, .. }
            | NodeKind::Content { children } => children,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ProgramNode {
    index: u64,
    kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    nodes: Vec<ProgramNode>,
    blocks: HashMap<String, NodeId>,
    root: NodeId,
}

fn child_index(parent: u64, position: usize) -> u64 {
    parent.wrapping_mul(10).wrapping_add(position as u64)
}

fn item_index(parent: u64, position: usize) -> u64 {
    parent.wrapping_mul(100).wrapping_add(position as u64)
}

impl Program {
    pub fn new(document: &Document) -> Self {
        let mut program = Program {
            nodes: Vec::new(),
            blocks: HashMap::new(),
            root: 0,
        };

        let root = program.reserve(1);
        let children: Vec<NodeId> = document
            .content
            .iter()
            .enumerate()
            .map(|(p, node)| program.add(node, child_index(1, p)))
            .collect();

        let offset = document.content.len();
        for (b, block) in document.blocks.iter().enumerate() {
            let index = child_index(1, offset + b);
            let id = program.reserve(index);
            let block_children = program.add_children(&block.content.content, index);
            program.nodes[id].kind = NodeKind::Block {
                name: block.name.clone(),
                children: block_children,
            };
            program.blocks.insert(block.name.clone(), id);
        }

        program.nodes[root].kind = NodeKind::Document { children };
        program.root = root;
        program
    }

    fn reserve(&mut self, index: u64) -> NodeId {
        self.nodes.push(ProgramNode {
            index,
            kind: NodeKind::Content { children: vec![] },
        });
        self.nodes.len() - 1
    }

    fn push(&mut self, index: u64, kind: NodeKind) -> NodeId {
        self.nodes.push(ProgramNode { index, kind });
        self.nodes.len() - 1
    }

    fn add_children(&mut self, nodes: &[Node], parent: u64) -> Vec<NodeId> {
        nodes
            .iter()
            .enumerate()
            .map(|(p, node)| self.add(node, child_index(parent, p)))
            .collect()
    }

    fn add(&mut self, node: &Node, index: u64) -> NodeId {
        match node {
            Node::Content { content } => {
                let children = self.add_children(content, index);
                self.push(index, NodeKind::Content { children })
            }
            Node::Line(line) => self.push(index, NodeKind::Line(line.clone())),
            Node::Options(options) => {
                let items = options
                    .content
                    .iter()
                    .enumerate()
                    .map(|(p, item)| self.add(item, item_index(index, p)))
                    .collect();
                let header = OptionsHeader {
                    name: options.name.clone(),
                    speaker: options.speaker.clone(),
                    id: options.id.clone(),
                    tags: options.tags.clone(),
                };
                self.push(index, NodeKind::Options { header, items })
            }
            Node::Option(option) => {
                let children = self.add_children(&option.content.content, index);
                let content = self.push(index, NodeKind::Content { children });
                self.push(
                    index,
                    NodeKind::Option(OptionEntry {
                        name: option.name.clone(),
                        mode: option.mode,
                        speaker: option.speaker.clone(),
                        id: option.id.clone(),
                        tags: option.tags.clone(),
                        content,
                    }),
                )
            }
            Node::Divert(divert) => self.push(index, NodeKind::Divert(divert.clone())),
            Node::Variations(variations) => {
                let alternatives = variations
                    .content
                    .iter()
                    .enumerate()
                    .map(|(p, alternative)| {
                        let alt_index = item_index(index, p);
                        let children = self.add_children(&alternative.content, alt_index);
                        self.push(alt_index, NodeKind::Content { children })
                    })
                    .collect();
                self.push(
                    index,
                    NodeKind::Variations {
                        mode: variations.mode,
                        alternatives,
                    },
                )
            }
            Node::ConditionalContent(conditional) => {
                let content = self.add(&conditional.content, index);
                self.push(
                    index,
                    NodeKind::Conditional {
                        conditions: conditional.conditions.clone(),
                        content,
                    },
                )
            }
            Node::ActionContent(action) => {
                let content = self.add(&action.content, index);
                self.push(
                    index,
                    NodeKind::Action {
                        action: action.action.clone(),
                        content,
                    },
                )
            }
            Node::Assignments(assignments) => {
                self.push(index, NodeKind::Assignments(assignments.clone()))
            }
            Node::Events(events) => self.push(index, NodeKind::Events(events.clone())),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn index_of(&self, id: NodeId) -> u64 {
        self.nodes[id].index
    }

    pub fn block(&self, name: &str) -> Option<NodeId> {
        self.blocks.get(name).copied()
    }
}
