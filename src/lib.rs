#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
use pyo3::prelude::*;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod ast;
pub mod error;
pub mod events;
pub mod interpreter;
pub mod lexer;
pub mod logic;
pub mod memory;
pub mod parser;
pub mod program;
mod text;
pub mod types;

pub use ast::Document;
pub use error::{ClydeError, ParseError, RuntimeError};
pub use events::{DialogueEvent, EventKind, ListenerId};
pub use interpreter::{Interpreter, InterpreterOptions};
pub use memory::MemoryData;
pub use parser::parse;
pub use program::Program;
pub use types::{DialogueContent, DialogueLine, DialogueOption, DialogueOptions, Value};

/// Parses source text into the JSON document tree.
pub fn parse_to_json(text: &str) -> Result<String, ClydeError> {
    let document = parse(text)?;
    Ok(document.to_json_pretty()?)
}

#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
fn py_err(e: impl std::fmt::Display) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(e.to_string())
}

#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
#[pyfunction]
fn parse_text(text: String) -> PyResult<String> {
    parse_to_json(&text).map_err(py_err)
}

#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
#[pyclass(unsendable)]
struct Dialogue {
    inner: Interpreter,
}

#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
#[pymethods]
impl Dialogue {
    #[new]
    #[pyo3(signature = (source, data_json=None))]
    fn new(source: &str, data_json: Option<&str>) -> PyResult<Self> {
        let mut inner =
            Interpreter::from_source(source, InterpreterOptions::default()).map_err(py_err)?;
        if let Some(json) = data_json {
            inner.load_data_json(json).map_err(py_err)?;
        }
        Ok(Self { inner })
    }

    /// Next dialogue unit as JSON, `null` when finished.
    fn get_content(&mut self) -> PyResult<String> {
        self.inner.get_content_json().map_err(py_err)
    }

    fn choose(&mut self, index: usize) -> PyResult<()> {
        self.inner.choose(index).map_err(py_err)
    }

    fn set_variable(&mut self, name: &str, value: &Bound<'_, PyAny>) -> PyResult<()> {
        let value = if value.is_none() {
            Value::Null
        } else if let Ok(b) = value.extract::<bool>() {
            Value::Bool(b)
        } else if let Ok(n) = value.extract::<f64>() {
            Value::Number(n)
        } else {
            Value::String(value.extract::<String>()?)
        };
        self.inner.set_variable(name, value);
        Ok(())
    }

    /// Variable value as JSON.
    fn get_variable(&self, name: &str) -> PyResult<String> {
        serde_json::to_string(&self.inner.get_variable(name)).map_err(py_err)
    }

    fn get_data(&self) -> PyResult<String> {
        self.inner.get_data_json().map_err(py_err)
    }

    fn load_data(&mut self, data_json: &str) -> PyResult<()> {
        self.inner.load_data_json(data_json).map_err(py_err)
    }

    fn clear_data(&mut self) {
        self.inner.clear_data();
    }

    fn load_dictionary(&mut self, dictionary: std::collections::HashMap<String, String>) {
        self.inner.load_dictionary(dictionary);
    }

    #[pyo3(signature = (block=None))]
    fn start(&mut self, block: Option<&str>) -> PyResult<()> {
        self.inner.start(block).map_err(py_err)
    }
}

#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
#[pymodule]
fn clyde_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(parse_text, m)?)?;
    m.add_class::<Dialogue>()?;
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn parse_text_wasm(text: &str) -> Result<String, JsValue> {
    parse_to_json(text).map_err(js_err)
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub struct WasmDialogue {
    inner: Interpreter,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl WasmDialogue {
    #[wasm_bindgen(constructor)]
    pub fn new(
        source: &str,
        data_json: Option<String>,
        random_seed: Option<u32>,
    ) -> Result<WasmDialogue, JsValue> {
        let options = InterpreterOptions {
            random_seed,
            ..Default::default()
        };
        let mut inner = Interpreter::from_source(source, options).map_err(js_err)?;
        if let Some(json) = data_json {
            inner.load_data_json(&json).map_err(js_err)?;
        }
        Ok(WasmDialogue { inner })
    }

    pub fn get_content(&mut self) -> Result<String, JsValue> {
        self.inner.get_content_json().map_err(js_err)
    }

    pub fn choose(&mut self, index: usize) -> Result<(), JsValue> {
        self.inner.choose(index).map_err(js_err)
    }

    /// `value_json` is any JSON scalar.
    pub fn set_variable(&mut self, name: &str, value_json: &str) -> Result<(), JsValue> {
        let value: Value = serde_json::from_str(value_json).map_err(js_err)?;
        self.inner.set_variable(name, value);
        Ok(())
    }

    pub fn get_variable(&self, name: &str) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.get_variable(name)).map_err(js_err)
    }

    pub fn get_data(&self) -> Result<String, JsValue> {
        self.inner.get_data_json().map_err(js_err)
    }

    pub fn load_data(&mut self, data_json: &str) -> Result<(), JsValue> {
        self.inner.load_data_json(data_json).map_err(js_err)
    }

    pub fn clear_data(&mut self) {
        self.inner.clear_data();
    }

    pub fn load_dictionary(&mut self, dictionary_json: &str) -> Result<(), JsValue> {
        let dictionary = serde_json::from_str(dictionary_json).map_err(js_err)?;
        self.inner.load_dictionary(dictionary);
        Ok(())
    }

    pub fn start(&mut self, block: Option<String>) -> Result<(), JsValue> {
        self.inner.start(block.as_deref()).map_err(js_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn seeded() -> InterpreterOptions {
        InterpreterOptions {
            random_seed: Some(1),
            ..Default::default()
        }
    }

    fn dialogue(source: &str) -> Interpreter {
        Interpreter::from_source(source, seeded()).unwrap()
    }

    fn line(text: &str) -> Option<DialogueContent> {
        Some(DialogueContent::Dialogue(DialogueLine {
            text: text.to_string(),
            ..Default::default()
        }))
    }

    #[test]
    fn assignment_then_interpolation() {
        let mut d =
            dialogue("lets set a variable {set something=\"the\"}\nthis is %something% variable\n");
        assert_eq!(d.get_content().unwrap(), line("lets set a variable"));
        assert_eq!(d.get_content().unwrap(), line("this is the variable"));
        assert_eq!(d.get_content().unwrap(), None);
    }

    #[test]
    fn options_block_then_choose_first() {
        let mut d = dialogue(">> pick one\n  * yes\n    you said yes\n  * no\n    you said no\n");
        let content = d.get_content().unwrap().unwrap();
        assert_eq!(
            serde_json::to_value(&content).unwrap(),
            json!({
                "type": "options",
                "name": "pick one",
                "options": [{"label": "yes"}, {"label": "no"}]
            })
        );
        d.choose(0).unwrap();
        assert_eq!(d.get_content().unwrap(), line("yes"));
        assert_eq!(d.get_content().unwrap(), line("you said yes"));
    }

    #[test]
    fn single_line_document_is_exhausted_after_one_step() {
        let mut d = dialogue("Hi!\n");
        assert_eq!(d.get_content().unwrap(), line("Hi!"));
        assert_eq!(d.get_content().unwrap(), None);
        assert_eq!(d.get_content_json().unwrap(), "null");
    }

    #[test]
    fn unknown_node_type_in_json_is_reported_by_name() {
        let json = r#"{"type": "document", "content": [{"type": "teleport"}], "blocks": []}"#;
        match Interpreter::from_json(json, seeded()) {
            Err(RuntimeError::UnknownNodeType(name)) => assert_eq!(name, "teleport"),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn chained_assignment() {
        let mut d = dialogue("{ set a = 1, a += 5, b = c = a, b -= 1 }\ndone\n");
        assert_eq!(d.get_content().unwrap(), line("done"));
        assert_eq!(d.get_variable("a"), Value::Number(6.0));
        assert_eq!(d.get_variable("b"), Value::Number(5.0));
        assert_eq!(d.get_variable("c"), Value::Number(6.0));
    }

    #[test]
    fn cycle_over_twice_the_alternatives() {
        let mut d = dialogue("( cycle\n  - one\n  - two\n)\n");
        let mut seen = Vec::new();
        for _ in 0..4 {
            d.start(None).unwrap();
            seen.push(d.get_content().unwrap().and_then(|c| c.text().map(str::to_string)));
        }
        let seen: Vec<_> = seen.into_iter().flatten().collect();
        assert_eq!(seen, vec!["one", "two", "one", "two"]);
    }

    #[test]
    fn shuffle_once_stops_after_every_alternative() {
        let mut d = dialogue("( shuffle once\n  - one\n  - two\n  - three\n)\n");
        let mut seen = Vec::new();
        for _ in 0..5 {
            d.start(None).unwrap();
            if let Some(content) = d.get_content().unwrap() {
                seen.push(content.text().unwrap_or_default().to_string());
            }
        }
        seen.sort();
        assert_eq!(seen, vec!["one", "three", "two"]);
    }

    #[test]
    fn once_options_never_reappear() {
        let mut d = dialogue("* first\n* second\n+ always\n");
        assert_eq!(
            d.get_content().unwrap().unwrap().labels(),
            vec!["first", "second", "always"]
        );
        d.choose(0).unwrap();
        assert_eq!(d.get_content().unwrap(), line("first"));
        for _ in 0..3 {
            let labels = d.get_content().unwrap().unwrap();
            assert!(!labels.labels().contains(&"first"));
            d.choose(labels.labels().len() - 1).unwrap();
            assert_eq!(d.get_content().unwrap(), line("always"));
        }
    }

    #[test]
    fn snapshot_reload_reproduces_output() {
        let source = "( shuffle\n  - a\n  - b\n  - c\n)\n* x\n  X\n* y\n  Y\n";
        let mut original = dialogue(source);
        original.get_content().unwrap();
        let snapshot = original.get_data_json().unwrap();

        let mut reloaded = Interpreter::from_source(source, InterpreterOptions::default()).unwrap();
        reloaded.load_data_json(&snapshot).unwrap();

        let run = |d: &mut Interpreter| {
            let mut out = Vec::new();
            for _ in 0..3 {
                d.start(None).unwrap();
                out.push(d.get_content().unwrap());
                out.push(d.get_content().unwrap());
            }
            out
        };
        assert_eq!(run(&mut original), run(&mut reloaded));
    }

    #[test]
    fn parsing_is_deterministic() {
        let source = "npc: hi $id1 #a\n* opt\n  { set x += 1 } ok\n-> blk\n== blk\n( once\n  - v\n)\n";
        assert_eq!(parse_to_json(source).unwrap(), parse_to_json(source).unwrap());
        assert_eq!(parse(source).unwrap(), parse(source).unwrap());
    }

    #[test]
    fn interpreters_sharing_a_program_keep_separate_state() {
        let program = Arc::new(Program::new(&parse("* a\n  A\n* b\n").unwrap()));
        let mut first = Interpreter::from_program(Arc::clone(&program), seeded());
        let mut second = Interpreter::from_program(program, seeded());
        assert!(Arc::ptr_eq(first.program(), second.program()));

        first.get_content().unwrap();
        first.choose(0).unwrap();
        first.set_variable("seen", true);
        first.get_content().unwrap();
        first.get_content().unwrap();

        assert_eq!(
            second.get_content().unwrap().unwrap().labels(),
            vec!["a", "b"]
        );
        assert_eq!(second.get_variable("seen"), Value::Null);
    }

    #[test]
    fn parse_errors_surface_through_the_umbrella_error() {
        assert!(matches!(
            Interpreter::from_source("( bogus\n  - a\n)\n", seeded()),
            Err(ClydeError::Parse(ParseError::InvalidVariationMode { .. }))
        ));
    }
}
