use std::cmp::Ordering;

use crate::ast::{Action, AssignOp, Assignment, AssignmentValue, Assignments, Events, Expr, Operator};
use crate::events::{DialogueEvent, EventBus};
use crate::memory::Memory;
use crate::types::Value;

/// Evaluates conditions and runs assignments against one memory.
///
/// Every variable write goes through [`Logic::set_variable`] so that
/// `VARIABLE_CHANGED` listeners see it.
pub struct Logic<'a> {
    memory: &'a mut Memory,
    events: &'a mut EventBus,
}

impl<'a> Logic<'a> {
    pub fn new(memory: &'a mut Memory, events: &'a mut EventBus) -> Self {
        Self { memory, events }
    }

    pub fn check_condition(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Expression(expression) => {
                let operand = |i: usize| expression.elements.get(i);
                match expression.name {
                    Operator::And => {
                        operand(0).is_some_and(|e| self.check_condition(e))
                            && operand(1).is_some_and(|e| self.check_condition(e))
                    }
                    Operator::Or => {
                        operand(0).is_some_and(|e| self.check_condition(e))
                            || operand(1).is_some_and(|e| self.check_condition(e))
                    }
                    Operator::Not => !operand(0).is_some_and(|e| self.check_condition(e)),
                    _ => self.evaluate(expr).is_truthy(),
                }
            }
            _ => self.evaluate(expr).is_truthy(),
        }
    }

    pub fn evaluate(&self, expr: &Expr) -> Value {
        let expression = match expr {
            Expr::Literal(literal) => return literal.value.clone(),
            Expr::Variable { name } => return self.memory.get_variable(name, Value::Null),
            Expr::Expression(expression) => expression,
        };

        if matches!(expression.name, Operator::And | Operator::Or | Operator::Not) {
            return Value::Bool(self.check_condition(expr));
        }

        let left = expression
            .elements
            .first()
            .map(|e| self.evaluate(e))
            .unwrap_or_default();
        let right = expression
            .elements
            .get(1)
            .map(|e| self.evaluate(e))
            .unwrap_or_default();

        match expression.name {
            Operator::Equal => Value::Bool(left == right),
            Operator::NotEqual => Value::Bool(left != right),
            Operator::GreaterThan => Value::Bool(compare(&left, &right) == Some(Ordering::Greater)),
            Operator::GreaterOrEqual => Value::Bool(matches!(
                compare(&left, &right),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            Operator::LessThan => Value::Bool(compare(&left, &right) == Some(Ordering::Less)),
            Operator::LessOrEqual => Value::Bool(matches!(
                compare(&left, &right),
                Some(Ordering::Less | Ordering::Equal)
            )),
            Operator::Add => add(&left, &right),
            Operator::Sub => Value::Number(left.as_number() - right.as_number()),
            Operator::Mult => Value::Number(left.as_number() * right.as_number()),
            Operator::Div => Value::Number(left.as_number() / right.as_number()),
            Operator::Mod => Value::Number(left.as_number() % right.as_number()),
            Operator::Power => Value::Number(left.as_number().powf(right.as_number())),
            Operator::And | Operator::Or | Operator::Not => Value::Bool(self.check_condition(expr)),
        }
    }

    pub fn run_action(&mut self, action: &Action) {
        match action {
            Action::Assignments(assignments) => self.execute_assignments(assignments),
            Action::Events(events) => self.trigger(events),
        }
    }

    pub fn execute_assignments(&mut self, assignments: &Assignments) {
        for assignment in &assignments.assignments {
            self.assign(assignment);
        }
    }

    /// Runs one assignment, nested ones first, and returns the stored value.
    pub fn assign(&mut self, assignment: &Assignment) -> Value {
        let value = match assignment.value.as_ref() {
            AssignmentValue::Assignment(inner) => self.assign(inner),
            AssignmentValue::Expr(expr) => self.evaluate(expr),
        };

        let name = &assignment.variable.name;
        let start = match value {
            Value::String(_) => Value::String(String::new()),
            _ => Value::Number(0.0),
        };
        let current = || self.memory.get_variable(name, start.clone());

        let result = match assignment.operation {
            AssignOp::Assign => value,
            AssignOp::AddAssign => add(&current(), &value),
            AssignOp::SubAssign => Value::Number(current().as_number() - value.as_number()),
            AssignOp::MultAssign => Value::Number(current().as_number() * value.as_number()),
            AssignOp::DivAssign => Value::Number(current().as_number() / value.as_number()),
            AssignOp::PowAssign => Value::Number(current().as_number().powf(value.as_number())),
            AssignOp::ModAssign => Value::Number(current().as_number() % value.as_number()),
        };

        self.set_variable(name, result)
    }

    pub fn trigger(&mut self, events: &Events) {
        for event in &events.events {
            self.events.emit(&DialogueEvent::EventTriggered {
                name: event.name.clone(),
            });
        }
    }

    pub fn set_variable(&mut self, name: &str, value: Value) -> Value {
        let previous = self.memory.set_variable(name, value.clone());
        self.events.emit(&DialogueEvent::VariableChanged {
            name: name.to_string(),
            value: value.clone(),
            previous,
        });
        value
    }
}

fn add(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::String(_), _) | (_, Value::String(_)) => Value::String(format!("{left}{right}")),
        _ => Value::Number(left.as_number() + right.as_number()),
    }
}

/// Strings compare lexically, everything else numerically.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.as_number().partial_cmp(&right.as_number()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::parser::parse;
    use crate::ast::Node;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn condition(source: &str) -> Expr {
        let doc = parse(&format!("{{ {source} }} x\n")).unwrap();
        match &doc.content[0] {
            Node::ConditionalContent(c) => c.conditions.clone(),
            other => panic!("expected condition, got {other:?}"),
        }
    }

    fn assignments(source: &str) -> Assignments {
        let doc = parse(&format!("{{ set {source} }}\n")).unwrap();
        match &doc.content[0] {
            Node::Assignments(a) => a.clone(),
            other => panic!("expected assignments, got {other:?}"),
        }
    }

    fn eval(memory: &mut Memory, source: &str) -> Value {
        let mut events = EventBus::new();
        Logic::new(memory, &mut events).evaluate(&condition(source))
    }

    #[test]
    fn arithmetic_and_precedence() {
        let mut memory = Memory::new();
        assert_eq!(eval(&mut memory, "1 + 2 * 3"), Value::Number(7.0));
        assert_eq!(eval(&mut memory, "2 ^ 3 ^ 2"), Value::Number(512.0));
        assert_eq!(eval(&mut memory, "7 % 4"), Value::Number(3.0));
        assert_eq!(eval(&mut memory, "1 / 4"), Value::Number(0.25));
        assert_eq!(eval(&mut memory, "(1 + 2) * 3"), Value::Number(9.0));
    }

    #[test]
    fn string_concatenation_and_comparison() {
        let mut memory = Memory::new();
        memory.set_variable("name", Value::from("ana"));
        assert_eq!(eval(&mut memory, "name + \"!\""), Value::from("ana!"));
        assert_eq!(eval(&mut memory, "name + 1"), Value::from("ana1"));
        assert_eq!(eval(&mut memory, "\"abc\" < \"abd\""), Value::Bool(true));
        assert_eq!(eval(&mut memory, "name is \"ana\""), Value::Bool(true));
    }

    #[test]
    fn equality_is_type_aware() {
        let mut memory = Memory::new();
        assert_eq!(eval(&mut memory, "1 == \"1\""), Value::Bool(false));
        assert_eq!(eval(&mut memory, "undefined_var == null"), Value::Bool(true));
        assert_eq!(eval(&mut memory, "true isnt false"), Value::Bool(true));
    }

    #[test]
    fn conditions_use_truthiness_and_short_circuit() {
        let mut memory = Memory::new();
        let mut events = EventBus::new();
        memory.set_variable("hp", Value::from(0));
        memory.set_variable("name", Value::from("x"));
        let logic = Logic::new(&mut memory, &mut events);
        assert!(!logic.check_condition(&condition("hp")));
        assert!(logic.check_condition(&condition("name")));
        assert!(logic.check_condition(&condition("not hp")));
        assert!(logic.check_condition(&condition("hp or name")));
        assert!(!logic.check_condition(&condition("name and missing")));
        assert!(logic.check_condition(&condition("hp >= 0 && name != \"y\"")));
    }

    #[test]
    fn chained_assignments() {
        let mut memory = Memory::new();
        let mut events = EventBus::new();
        Logic::new(&mut memory, &mut events)
            .execute_assignments(&assignments("a = 1, a += 5, b = c = a, b -= 1"));
        assert_eq!(memory.get_variable("a", Value::Null), Value::Number(6.0));
        assert_eq!(memory.get_variable("b", Value::Null), Value::Number(5.0));
        assert_eq!(memory.get_variable("c", Value::Null), Value::Number(6.0));
    }

    #[test]
    fn compound_assignments_start_from_neutral_values() {
        let mut memory = Memory::new();
        let mut events = EventBus::new();
        Logic::new(&mut memory, &mut events).execute_assignments(&assignments(
            "n += 2, n *= 5, n /= 4, n ^= 2, n %= 4, s += \"hi\"",
        ));
        assert_eq!(memory.get_variable("n", Value::Null), Value::Number(2.25));
        assert_eq!(memory.get_variable("s", Value::Null), Value::from("hi"));
    }

    #[test]
    fn writes_notify_listeners_with_previous_value() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut memory = Memory::new();
        let mut events = EventBus::new();
        let sink = Rc::clone(&seen);
        events.on(EventKind::VariableChanged, move |e| sink.borrow_mut().push(e.clone()));

        Logic::new(&mut memory, &mut events).execute_assignments(&assignments("a = 1, a += 1"));

        assert_eq!(
            *seen.borrow(),
            vec![
                DialogueEvent::VariableChanged {
                    name: "a".to_string(),
                    value: Value::Number(1.0),
                    previous: Value::Null,
                },
                DialogueEvent::VariableChanged {
                    name: "a".to_string(),
                    value: Value::Number(2.0),
                    previous: Value::Number(1.0),
                },
            ]
        );
    }
}
