use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{Document, OptionMode, VariationMode, DIVERT_END, DIVERT_PARENT};
use crate::error::{ClydeError, RuntimeError};
use crate::events::{DialogueEvent, EventBus, EventKind, ListenerId};
use crate::logic::Logic;
use crate::memory::{InternalValue, Memory, MemoryData, OPTIONS_COUNT};
use crate::parser::parse;
use crate::program::{NodeId, NodeKind, OptionsHeader, Program};
use crate::text::interpolate;
use crate::types::{DialogueContent, DialogueLine, DialogueOption, DialogueOptions, Value};

const RANDOM_STATE: &str = "RANDOM_STATE";

#[derive(Debug, Clone, Default)]
pub struct InterpreterOptions {
    /// Memory snapshot to resume from.
    pub data: Option<MemoryData>,
    /// Line id to display text overrides.
    pub dictionary: HashMap<String, String>,
    /// Seed for shuffle variations. Without one the clock is used.
    pub random_seed: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: NodeId,
    cursor: isize,
}

impl Frame {
    fn new(node: NodeId) -> Self {
        Self { node, cursor: -1 }
    }
}

enum Flow {
    Emit(DialogueContent),
    Continue,
    Finished,
}

/// A visible option together with the action wrappers to run on selection.
struct Choice {
    option: NodeId,
    actions: Vec<NodeId>,
}

/// Walks a dialogue one beat at a time.
pub struct Interpreter {
    program: Arc<Program>,
    stack: Vec<Frame>,
    memory: Memory,
    dictionary: HashMap<String, String>,
    events: EventBus,
    rng_state: u32,
}

impl Interpreter {
    pub fn new(document: &Document) -> Self {
        Self::with_options(document, InterpreterOptions::default())
    }

    pub fn with_options(document: &Document, options: InterpreterOptions) -> Self {
        Self::from_program(Arc::new(Program::new(document)), options)
    }

    /// Builds an interpreter over an arena shared with other interpreters.
    pub fn from_program(program: Arc<Program>, options: InterpreterOptions) -> Self {
        let root = program.root();
        let mut interpreter = Self {
            program,
            stack: vec![Frame::new(root)],
            memory: Memory::new(),
            dictionary: options.dictionary,
            events: EventBus::new(),
            rng_state: options.random_seed.unwrap_or_else(clock_seed),
        };
        if let Some(data) = options.data {
            interpreter.load_data(data);
        }
        interpreter
    }

    /// Decodes a document tree from JSON and builds an interpreter over it.
    pub fn from_json(json: &str, options: InterpreterOptions) -> Result<Self, RuntimeError> {
        let document = Document::from_json(json)?;
        Ok(Self::with_options(&document, options))
    }

    /// Parses source text and builds an interpreter over it.
    pub fn from_source(source: &str, options: InterpreterOptions) -> Result<Self, ClydeError> {
        let document = parse(source)?;
        Ok(Self::with_options(&document, options))
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// Restarts from the document root, or from the named block.
    pub fn start(&mut self, block: Option<&str>) -> Result<(), RuntimeError> {
        let node = match block {
            Some(name) => self
                .program
                .block(name)
                .ok_or_else(|| RuntimeError::UnknownBlock(name.to_string()))?,
            None => self.program.root(),
        };
        self.stack = vec![Frame::new(node)];
        Ok(())
    }

    /// Advances one step. Returns `None` once the dialogue is over, and on
    /// every call after that.
    pub fn get_content(&mut self) -> Result<Option<DialogueContent>, RuntimeError> {
        loop {
            match self.resume()? {
                Flow::Emit(content) => return Ok(Some(content)),
                Flow::Finished => return Ok(None),
                Flow::Continue => {}
            }
        }
    }

    pub fn choose(&mut self, index: usize) -> Result<(), RuntimeError> {
        let program = Arc::clone(&self.program);
        let frame = self.stack.last().copied().ok_or(RuntimeError::NothingToSelect)?;
        let NodeKind::Options { items, .. } = program.kind(frame.node) else {
            return Err(RuntimeError::NothingToSelect);
        };
        let visible = self.visible_options(items);
        let choice = visible.get(index).ok_or(RuntimeError::InvalidOption(index))?;
        self.select(choice);
        Ok(())
    }

    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) -> Value {
        self.logic().set_variable(name, value.into())
    }

    pub fn get_variable(&self, name: &str) -> Value {
        self.memory.get_variable(name, Value::Null)
    }

    pub fn get_data(&self) -> MemoryData {
        let mut data = self.memory.get_all();
        data.internal.insert(
            RANDOM_STATE.to_string(),
            InternalValue::Int(i64::from(self.rng_state)),
        );
        data
    }

    pub fn load_data(&mut self, data: MemoryData) {
        if let Some(InternalValue::Int(state)) = data.internal.get(RANDOM_STATE) {
            if let Ok(state) = u32::try_from(*state) {
                self.rng_state = state;
            }
        }
        self.memory.load(data);
    }

    pub fn clear_data(&mut self) {
        self.memory.clear();
    }

    pub fn load_dictionary(&mut self, dictionary: HashMap<String, String>) {
        self.dictionary = dictionary;
    }

    pub fn on<F>(&mut self, kind: EventKind, callback: F) -> ListenerId
    where
        F: FnMut(&DialogueEvent) + 'static,
    {
        self.events.on(kind, callback)
    }

    pub fn off(&mut self, id: ListenerId) -> Result<(), RuntimeError> {
        self.events.off(id)
    }

    pub fn get_content_json(&mut self) -> Result<String, RuntimeError> {
        let content = self.get_content()?;
        Ok(serde_json::to_string(&content)?)
    }

    pub fn get_data_json(&self) -> Result<String, RuntimeError> {
        Ok(serde_json::to_string(&self.get_data())?)
    }

    pub fn load_data_json(&mut self, json: &str) -> Result<(), RuntimeError> {
        let data: MemoryData = serde_json::from_str(json)?;
        self.load_data(data);
        Ok(())
    }

    fn logic(&mut self) -> Logic<'_> {
        Logic::new(&mut self.memory, &mut self.events)
    }

    fn resume(&mut self) -> Result<Flow, RuntimeError> {
        let Some(frame) = self.stack.last().copied() else {
            return Ok(Flow::Finished);
        };
        let program = Arc::clone(&self.program);
        let kind = program.kind(frame.node);

        if let NodeKind::Options { header, items } = kind {
            return Ok(self.handle_options(header, items));
        }

        let children = kind.children();
        let next = frame.cursor + 1;
        if let Some(&child) = children.get(next as usize) {
            if let Some(top) = self.stack.last_mut() {
                top.cursor = next;
            }
            return self.enter(child);
        }

        if self.stack.len() == 1 {
            if let Some(top) = self.stack.last_mut() {
                top.cursor = children.len() as isize;
            }
            return Ok(Flow::Finished);
        }
        self.stack.pop();
        Ok(Flow::Continue)
    }

    fn enter(&mut self, id: NodeId) -> Result<Flow, RuntimeError> {
        let program = Arc::clone(&self.program);
        match program.kind(id) {
            NodeKind::Line(line) => Ok(Flow::Emit(DialogueContent::Dialogue(DialogueLine {
                text: self.render(line.id.as_deref(), &line.value),
                speaker: line.speaker.clone(),
                id: line.id.clone(),
                tags: line.tags.clone(),
            }))),
            NodeKind::Document { .. } | NodeKind::Block { .. } | NodeKind::Content { .. } => {
                self.stack.push(Frame::new(id));
                Ok(Flow::Continue)
            }
            NodeKind::Options { header, items } => {
                self.stack.push(Frame::new(id));
                Ok(self.handle_options(header, items))
            }
            // options are only reachable through their list
            NodeKind::Option(_) => Ok(Flow::Continue),
            NodeKind::Divert(divert) => self.handle_divert(&divert.target),
            NodeKind::Variations { mode, alternatives } => {
                self.handle_variations(id, *mode, alternatives);
                Ok(Flow::Continue)
            }
            NodeKind::Conditional {
                conditions,
                content,
            } => {
                if self.logic().check_condition(conditions) {
                    self.enter(*content)
                } else {
                    Ok(Flow::Continue)
                }
            }
            NodeKind::Action { action, content } => {
                self.logic().run_action(action);
                self.enter(*content)
            }
            NodeKind::Assignments(assignments) => {
                self.logic().execute_assignments(assignments);
                Ok(Flow::Continue)
            }
            NodeKind::Events(events) => {
                self.logic().trigger(events);
                Ok(Flow::Continue)
            }
        }
    }

    fn handle_divert(&mut self, target: &str) -> Result<Flow, RuntimeError> {
        match target {
            DIVERT_PARENT => {
                while self.stack.len() > 1 && !self.top_is_anchor() {
                    self.stack.pop();
                }
                if self.stack.len() > 1 {
                    self.stack.pop();
                }
            }
            DIVERT_END => {
                let root = self.program.root();
                let end = self.program.kind(root).children().len() as isize;
                self.stack = vec![Frame {
                    node: root,
                    cursor: end,
                }];
            }
            name => {
                let block = self
                    .program
                    .block(name)
                    .ok_or_else(|| RuntimeError::UnknownBlock(name.to_string()))?;
                self.stack.push(Frame::new(block));
            }
        }
        Ok(Flow::Continue)
    }

    fn top_is_anchor(&self) -> bool {
        self.stack.last().is_some_and(|frame| {
            matches!(
                self.program.kind(frame.node),
                NodeKind::Document { .. }
                    | NodeKind::Block { .. }
                    | NodeKind::Option(_)
                    | NodeKind::Options { .. }
            )
        })
    }

    fn handle_options(&mut self, header: &OptionsHeader, items: &[NodeId]) -> Flow {
        let visible = self.visible_options(items);

        if visible.is_empty() {
            self.stack.pop();
            return Flow::Continue;
        }

        if let [only] = visible.as_slice() {
            let lone_fallback = matches!(
                self.program.kind(only.option),
                NodeKind::Option(entry) if entry.mode == OptionMode::Fallback
            );
            if lone_fallback {
                self.select(only);
                return Flow::Continue;
            }
        }

        let options = visible
            .iter()
            .filter_map(|choice| match self.program.kind(choice.option) {
                NodeKind::Option(entry) => Some(DialogueOption {
                    label: self.render(entry.id.as_deref(), &entry.name),
                    speaker: entry.speaker.clone(),
                    id: entry.id.clone(),
                    tags: entry.tags.clone(),
                }),
                _ => None,
            })
            .collect();

        Flow::Emit(DialogueContent::Options(DialogueOptions {
            name: header
                .name
                .as_ref()
                .map(|name| self.render(header.id.as_deref(), name)),
            speaker: header.speaker.clone(),
            id: header.id.clone(),
            tags: header.tags.clone(),
            options,
        }))
    }

    /// Options the caller may pick right now. Fallback options only show
    /// up when nothing else is available.
    fn visible_options(&mut self, items: &[NodeId]) -> Vec<Choice> {
        self.memory
            .set_internal(OPTIONS_COUNT, InternalValue::Int(items.len() as i64));

        let program = Arc::clone(&self.program);
        let mut regular = Vec::new();
        let mut fallbacks = Vec::new();
        for &item in items {
            let mut actions = Vec::new();
            let Some(option) = self.resolve_option(item, &mut actions) else {
                continue;
            };
            let NodeKind::Option(entry) = program.kind(option) else {
                continue;
            };
            if entry.mode != OptionMode::Sticky && self.memory.was_accessed(program.index_of(option))
            {
                continue;
            }
            let choice = Choice { option, actions };
            match entry.mode {
                OptionMode::Fallback => fallbacks.push(choice),
                _ => regular.push(choice),
            }
        }

        let visible = if regular.is_empty() { fallbacks } else { regular };
        self.memory
            .set_internal(OPTIONS_COUNT, InternalValue::Int(visible.len() as i64));
        visible
    }

    /// Unwraps conditional and action wrappers around an option.
    fn resolve_option(&mut self, id: NodeId, actions: &mut Vec<NodeId>) -> Option<NodeId> {
        let program = Arc::clone(&self.program);
        match program.kind(id) {
            NodeKind::Option(_) => Some(id),
            NodeKind::Conditional {
                conditions,
                content,
            } => {
                if self.logic().check_condition(conditions) {
                    self.resolve_option(*content, actions)
                } else {
                    None
                }
            }
            NodeKind::Action { content, .. } => {
                actions.push(id);
                self.resolve_option(*content, actions)
            }
            _ => None,
        }
    }

    fn select(&mut self, choice: &Choice) {
        let program = Arc::clone(&self.program);
        let NodeKind::Option(entry) = program.kind(choice.option) else {
            return;
        };

        self.memory.set_as_accessed(program.index_of(choice.option));
        if entry.mode != OptionMode::Sticky {
            let count = self.memory.get_internal_int(OPTIONS_COUNT).unwrap_or(0);
            self.memory
                .set_internal(OPTIONS_COUNT, InternalValue::Int((count - 1).max(0)));
        }

        for &wrapper in &choice.actions {
            if let NodeKind::Action { action, .. } = program.kind(wrapper) {
                self.logic().run_action(action);
            }
        }
        self.stack.push(Frame::new(entry.content));
    }

    fn handle_variations(&mut self, id: NodeId, mode: VariationMode, alternatives: &[NodeId]) {
        let index = self.program.index_of(id);
        for _ in 0..alternatives.len() {
            let Some(pick) = self.next_variation(index, mode, alternatives.len()) else {
                return;
            };
            let Some(&alternative) = alternatives.get(pick) else {
                return;
            };
            if self.is_unmet_condition(alternative) {
                continue;
            }
            self.stack.push(Frame::new(alternative));
            return;
        }
    }

    /// True when the alternative holds nothing but a failing conditional.
    fn is_unmet_condition(&mut self, alternative: NodeId) -> bool {
        let program = Arc::clone(&self.program);
        match program.kind(alternative).children() {
            [only] => match program.kind(*only) {
                NodeKind::Conditional { conditions, .. } => !self.logic().check_condition(conditions),
                _ => false,
            },
            _ => false,
        }
    }

    /// Picks the next alternative, or `None` when the variation is spent.
    fn next_variation(&mut self, index: u64, mode: VariationMode, len: usize) -> Option<usize> {
        let cursor_key = format!("{index}.cursor");
        let cursor = self.memory.get_internal_int(&cursor_key).unwrap_or(-1);
        let last = len as i64 - 1;

        let pick = match mode {
            VariationMode::Sequence => (cursor + 1).min(last),
            VariationMode::Once => {
                if cursor >= last {
                    return None;
                }
                cursor + 1
            }
            VariationMode::Cycle => {
                if cursor >= last {
                    0
                } else {
                    cursor + 1
                }
            }
            VariationMode::Shuffle
            | VariationMode::ShuffleCycle
            | VariationMode::ShuffleSequence
            | VariationMode::ShuffleOnce => {
                let visited_key = format!("{index}.visited");
                let mut visited = self.memory.get_internal_set(&visited_key);
                if visited.len() >= len {
                    match mode {
                        VariationMode::ShuffleOnce => return None,
                        VariationMode::ShuffleSequence => return usize::try_from(cursor).ok(),
                        _ => visited.clear(),
                    }
                }
                let remaining: Vec<usize> = (0..len).filter(|i| !visited.contains(i)).collect();
                let pick = remaining.get(self.random_below(remaining.len())).copied()?;
                visited.push(pick);
                self.memory
                    .set_internal(&visited_key, InternalValue::Set(visited));
                pick as i64
            }
        };

        self.memory.set_internal(&cursor_key, InternalValue::Int(pick));
        usize::try_from(pick).ok()
    }

    fn random_below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        next_random_bounded(&mut self.rng_state, bound as u32) as usize
    }

    /// Display text for a line or option: dictionary override by id, then
    /// variable interpolation.
    fn render(&self, id: Option<&str>, text: &str) -> String {
        let text = id
            .and_then(|id| self.dictionary.get(id))
            .map(String::as_str)
            .unwrap_or(text);
        interpolate(text, |name| self.memory.get_variable(name, Value::Null))
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn clock_seed() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
        .unwrap_or(1)
}

#[cfg(target_arch = "wasm32")]
fn clock_seed() -> u32 {
    1
}

fn next_random_u32(state: &mut u32) -> u32 {
    let mut next = state.wrapping_add(0x6d2b79f5);
    *state = next;
    next = (next ^ (next >> 15)).wrapping_mul(next | 1);
    next ^= next.wrapping_add((next ^ (next >> 7)).wrapping_mul(next | 61));
    next ^ (next >> 14)
}

fn next_random_bounded(state: &mut u32, bound: u32) -> u32 {
    let threshold = (u64::from(u32::MAX) + 1) / u64::from(bound) * u64::from(bound);
    loop {
        let candidate = next_random_u32(state);
        if u64::from(candidate) < threshold {
            return candidate % bound;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn interpreter(source: &str) -> Interpreter {
        Interpreter::with_options(
            &parse(source).expect("parse"),
            InterpreterOptions {
                random_seed: Some(7),
                ..Default::default()
            },
        )
    }

    fn text(dialogue: &mut Interpreter) -> Option<String> {
        match dialogue.get_content().expect("step") {
            Some(DialogueContent::Dialogue(line)) => Some(line.text),
            Some(other) => panic!("expected a line, got {other:?}"),
            None => None,
        }
    }

    fn labels(dialogue: &mut Interpreter) -> Vec<String> {
        match dialogue.get_content().expect("step") {
            Some(DialogueContent::Options(options)) => {
                options.options.into_iter().map(|o| o.label).collect()
            }
            other => panic!("expected options, got {other:?}"),
        }
    }

    fn restart_and_read(dialogue: &mut Interpreter) -> Option<String> {
        dialogue.start(None).unwrap();
        text(dialogue)
    }

    #[test]
    fn lines_then_exhaustion() {
        let mut dialogue = interpreter("npc: a #t\nb\n");
        assert_eq!(
            dialogue.get_content().unwrap(),
            Some(DialogueContent::Dialogue(DialogueLine {
                text: "a".to_string(),
                speaker: Some("npc".to_string()),
                id: None,
                tags: vec!["t".to_string()],
            }))
        );
        assert_eq!(text(&mut dialogue).as_deref(), Some("b"));
        assert_eq!(text(&mut dialogue), None);
        assert_eq!(text(&mut dialogue), None);
    }

    #[test]
    fn options_repeat_until_parent_divert() {
        let mut dialogue = interpreter(
            "npc: question\n  * a\n    got a\n  + b\n    got b\n    <-\nend\n",
        );
        match dialogue.get_content().unwrap() {
            Some(DialogueContent::Options(options)) => {
                assert_eq!(options.name.as_deref(), Some("question"));
                assert_eq!(options.speaker.as_deref(), Some("npc"));
                assert_eq!(options.options.len(), 2);
            }
            other => panic!("expected options, got {other:?}"),
        }
        dialogue.choose(0).unwrap();
        assert_eq!(text(&mut dialogue).as_deref(), Some("a"));
        assert_eq!(text(&mut dialogue).as_deref(), Some("got a"));

        assert_eq!(labels(&mut dialogue), vec!["b"]);
        dialogue.choose(0).unwrap();
        assert_eq!(text(&mut dialogue).as_deref(), Some("b"));
        assert_eq!(text(&mut dialogue).as_deref(), Some("got b"));
        assert_eq!(text(&mut dialogue).as_deref(), Some("end"));
        assert_eq!(text(&mut dialogue), None);
    }

    #[test]
    fn display_only_labels_are_not_spoken() {
        let mut dialogue = interpreter("* [yes]\n  ok\n");
        assert_eq!(labels(&mut dialogue), vec!["yes"]);
        dialogue.choose(0).unwrap();
        assert_eq!(text(&mut dialogue).as_deref(), Some("ok"));
        assert_eq!(text(&mut dialogue), None);
    }

    #[test]
    fn lone_fallback_is_selected_automatically() {
        let mut dialogue = interpreter("* a\n  A\n> fb\n  FB\nafter\n");
        assert_eq!(labels(&mut dialogue), vec!["a"]);
        dialogue.choose(0).unwrap();
        assert_eq!(text(&mut dialogue).as_deref(), Some("a"));
        assert_eq!(text(&mut dialogue).as_deref(), Some("A"));
        assert_eq!(text(&mut dialogue).as_deref(), Some("fb"));
        assert_eq!(text(&mut dialogue).as_deref(), Some("FB"));
        assert_eq!(text(&mut dialogue).as_deref(), Some("after"));
    }

    #[test]
    fn conditional_options_and_option_actions() {
        let mut dialogue = interpreter(
            "* { has_key } open\n  opened\n* knock { set knocked = true }\n  nobody\n",
        );
        assert_eq!(labels(&mut dialogue), vec!["knock"]);
        dialogue.choose(0).unwrap();
        assert_eq!(dialogue.get_variable("knocked"), Value::Bool(true));

        dialogue.set_variable("has_key", true);
        dialogue.start(None).unwrap();
        assert_eq!(labels(&mut dialogue), vec!["open"]);
    }

    #[test]
    fn options_count_tracks_visible_options() {
        let mut dialogue = interpreter("* a\n  %OPTIONS_COUNT% left\n* b\n");
        assert_eq!(labels(&mut dialogue), vec!["a", "b"]);
        assert_eq!(dialogue.get_variable(OPTIONS_COUNT), Value::Number(2.0));
        dialogue.choose(0).unwrap();
        assert_eq!(text(&mut dialogue).as_deref(), Some("a"));
        assert_eq!(text(&mut dialogue).as_deref(), Some("1 left"));
    }

    #[test]
    fn choose_errors() {
        let mut dialogue = interpreter("hi\n* a\n");
        assert!(matches!(dialogue.choose(0), Err(RuntimeError::NothingToSelect)));
        assert_eq!(text(&mut dialogue).as_deref(), Some("hi"));
        assert_eq!(labels(&mut dialogue), vec!["a"]);
        assert!(matches!(dialogue.choose(3), Err(RuntimeError::InvalidOption(3))));
        dialogue.choose(0).unwrap();
        assert!(matches!(dialogue.choose(0), Err(RuntimeError::NothingToSelect)));
    }

    #[test]
    fn diverts_to_blocks_and_back() {
        let mut dialogue = interpreter("start\n-> greet\nback\n== greet\nhello\n<-\nnever\n");
        assert_eq!(text(&mut dialogue).as_deref(), Some("start"));
        assert_eq!(text(&mut dialogue).as_deref(), Some("hello"));
        assert_eq!(text(&mut dialogue).as_deref(), Some("back"));
        assert_eq!(text(&mut dialogue), None);
    }

    #[test]
    fn end_divert_finishes_dialogue() {
        let mut dialogue = interpreter("a\n-> END\nb\n");
        assert_eq!(text(&mut dialogue).as_deref(), Some("a"));
        assert_eq!(text(&mut dialogue), None);
        assert_eq!(text(&mut dialogue), None);
    }

    #[test]
    fn unknown_divert_target_is_an_error() {
        let mut dialogue = interpreter("-> nowhere\n");
        assert!(matches!(
            dialogue.get_content(),
            Err(RuntimeError::UnknownBlock(name)) if name == "nowhere"
        ));
    }

    #[test]
    fn start_at_block() {
        let mut dialogue = interpreter("root line\n== other\nin other\n");
        dialogue.start(Some("other")).unwrap();
        assert_eq!(text(&mut dialogue).as_deref(), Some("in other"));
        assert_eq!(text(&mut dialogue), None);
        assert!(matches!(
            dialogue.start(Some("missing")),
            Err(RuntimeError::UnknownBlock(_))
        ));
    }

    #[test]
    fn sequence_holds_at_last() {
        let mut dialogue = interpreter("(\n  - a\n  - b\n)\n");
        let seen: Vec<_> = (0..4).map(|_| restart_and_read(&mut dialogue)).collect();
        assert_eq!(
            seen,
            vec![
                Some("a".to_string()),
                Some("b".to_string()),
                Some("b".to_string()),
                Some("b".to_string()),
            ]
        );
    }

    #[test]
    fn once_variation_runs_out() {
        let mut dialogue = interpreter("( once\n  - a\n  - b\n)\n");
        let seen: Vec<_> = (0..3).map(|_| restart_and_read(&mut dialogue)).collect();
        assert_eq!(seen, vec![Some("a".to_string()), Some("b".to_string()), None]);
    }

    #[test]
    fn cycle_visits_each_alternative_twice() {
        let mut dialogue = interpreter("( cycle\n  - a\n  - b\n  - c\n)\n");
        let seen: Vec<_> = (0..6)
            .map(|_| restart_and_read(&mut dialogue).unwrap())
            .collect();
        assert_eq!(seen, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn shuffle_modes() {
        let source = |mode: &str| format!("( {mode}\n  - a\n  - b\n  - c\n)\n");
        let sorted = |mut v: Vec<String>| {
            v.sort();
            v
        };

        let mut once = interpreter(&source("shuffle once"));
        let first: Vec<String> = (0..3).map(|_| restart_and_read(&mut once).unwrap()).collect();
        assert_eq!(sorted(first), vec!["a", "b", "c"]);
        assert_eq!(restart_and_read(&mut once), None);
        assert_eq!(restart_and_read(&mut once), None);

        let mut cycle = interpreter(&source("shuffle"));
        let first: Vec<String> = (0..3).map(|_| restart_and_read(&mut cycle).unwrap()).collect();
        let second: Vec<String> = (0..3).map(|_| restart_and_read(&mut cycle).unwrap()).collect();
        assert_eq!(sorted(first), vec!["a", "b", "c"]);
        assert_eq!(sorted(second), vec!["a", "b", "c"]);

        let mut sequence = interpreter(&source("shuffle sequence"));
        let first: Vec<String> = (0..3)
            .map(|_| restart_and_read(&mut sequence).unwrap())
            .collect();
        let last = first[2].clone();
        assert_eq!(sorted(first), vec!["a", "b", "c"]);
        assert_eq!(restart_and_read(&mut sequence), Some(last.clone()));
        assert_eq!(restart_and_read(&mut sequence), Some(last));
    }

    #[test]
    fn unmet_conditional_alternative_is_skipped() {
        let mut dialogue = interpreter("( once\n  - { missing } hidden\n  - shown\n)\n");
        assert_eq!(restart_and_read(&mut dialogue).as_deref(), Some("shown"));
        assert_eq!(restart_and_read(&mut dialogue), None);
    }

    #[test]
    fn events_and_variable_changes_reach_listeners() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dialogue = interpreter("{ trigger door_open }\nhi { set hp = 3 }\n");

        let sink = Rc::clone(&log);
        let triggered = dialogue.on(EventKind::EventTriggered, move |e| sink.borrow_mut().push(e.clone()));
        let sink = Rc::clone(&log);
        dialogue.on(EventKind::VariableChanged, move |e| sink.borrow_mut().push(e.clone()));

        assert_eq!(text(&mut dialogue).as_deref(), Some("hi"));
        dialogue.set_variable("hp", 4);

        assert_eq!(
            *log.borrow(),
            vec![
                DialogueEvent::EventTriggered {
                    name: "door_open".to_string()
                },
                DialogueEvent::VariableChanged {
                    name: "hp".to_string(),
                    value: Value::Number(3.0),
                    previous: Value::Null,
                },
                DialogueEvent::VariableChanged {
                    name: "hp".to_string(),
                    value: Value::Number(4.0),
                    previous: Value::Number(3.0),
                },
            ]
        );

        dialogue.off(triggered).unwrap();
        assert!(matches!(dialogue.off(triggered), Err(RuntimeError::ListenerNotFound)));
    }

    #[test]
    fn dictionary_overrides_text_by_id() {
        let mut dialogue = interpreter("hello $h1\nq $q1\n  * yes $o1\n");
        dialogue.load_dictionary(HashMap::from([
            ("h1".to_string(), "hola".to_string()),
            ("o1".to_string(), "si".to_string()),
            ("q1".to_string(), "pregunta %name%".to_string()),
        ]));
        dialogue.set_variable("name", "Ana");
        assert_eq!(text(&mut dialogue).as_deref(), Some("hola"));
        match dialogue.get_content().unwrap() {
            Some(DialogueContent::Options(options)) => {
                assert_eq!(options.name.as_deref(), Some("pregunta Ana"));
                assert_eq!(options.options[0].label, "si");
                assert_eq!(options.options[0].id.as_deref(), Some("o1"));
            }
            other => panic!("expected options, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_resumes_memory_and_random_state() {
        let source = "* a\n  A\n* b\n  B\n";
        let document = parse(source).unwrap();
        let mut first = Interpreter::with_options(
            &document,
            InterpreterOptions {
                random_seed: Some(3),
                ..Default::default()
            },
        );
        assert_eq!(labels(&mut first), vec!["a", "b"]);
        first.choose(0).unwrap();
        first.set_variable("x", "kept");

        let json = first.get_data_json().unwrap();
        let mut second = Interpreter::new(&document);
        second.load_data_json(&json).unwrap();
        assert_eq!(labels(&mut second), vec!["b"]);
        assert_eq!(second.get_variable("x"), Value::from("kept"));

        second.clear_data();
        second.start(None).unwrap();
        assert_eq!(labels(&mut second), vec!["a", "b"]);
    }

    #[test]
    fn shuffled_output_is_reproducible_from_snapshot() {
        let document = parse("( shuffle\n  - a\n  - b\n  - c\n  - d\n)\n").unwrap();
        let mut original = Interpreter::with_options(
            &document,
            InterpreterOptions {
                random_seed: Some(11),
                ..Default::default()
            },
        );
        restart_and_read(&mut original);
        let data = original.get_data();

        let mut reloaded = Interpreter::with_options(
            &document,
            InterpreterOptions {
                data: Some(data),
                ..Default::default()
            },
        );
        let continued: Vec<_> = (0..6).map(|_| restart_and_read(&mut original)).collect();
        let resumed: Vec<_> = (0..6).map(|_| restart_and_read(&mut reloaded)).collect();
        assert_eq!(continued, resumed);
    }

    #[test]
    fn out_of_range_random_state_is_ignored() {
        let mut dialogue = interpreter("hi\n");
        let mut data = dialogue.get_data();
        data.internal
            .insert(RANDOM_STATE.to_string(), InternalValue::Int(-5));
        dialogue.load_data(data);
        assert_eq!(
            dialogue.get_data().internal.get(RANDOM_STATE),
            Some(&InternalValue::Int(7))
        );

        let mut data = dialogue.get_data();
        data.internal.insert(
            RANDOM_STATE.to_string(),
            InternalValue::Int(i64::from(u32::MAX) + 1),
        );
        dialogue.load_data(data);
        assert_eq!(
            dialogue.get_data().internal.get(RANDOM_STATE),
            Some(&InternalValue::Int(7))
        );
    }

    #[test]
    fn random_bound_is_respected() {
        let mut state = 42;
        for bound in 1..20 {
            assert!(next_random_bounded(&mut state, bound) < bound);
        }
    }
}
