use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Reserved variable name reporting how many options are currently visible.
pub const OPTIONS_COUNT: &str = "OPTIONS_COUNT";

/// Bookkeeping stored next to user variables: variation cursors, shuffle
/// visited-sets and the visible options count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InternalValue {
    Int(i64),
    Set(Vec<usize>),
}

/// Snapshot of everything an interpreter remembers.
///
/// This is the only unit of save/restore; it serializes to plain JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryData {
    #[serde(default)]
    pub access: BTreeMap<u64, bool>,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub internal: BTreeMap<String, InternalValue>,
}

#[derive(Debug, Clone, Default)]
pub struct Memory {
    data: MemoryData,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: MemoryData) -> Self {
        Self { data }
    }

    /// Reads a user variable, or `default` when it was never set.
    pub fn get_variable(&self, name: &str, default: Value) -> Value {
        if name == OPTIONS_COUNT {
            return match self.data.internal.get(OPTIONS_COUNT) {
                Some(InternalValue::Int(count)) => Value::Number(*count as f64),
                _ => default,
            };
        }
        self.data.variables.get(name).cloned().unwrap_or(default)
    }

    /// Stores a user variable and returns the value it replaced.
    pub fn set_variable(&mut self, name: &str, value: Value) -> Value {
        self.data
            .variables
            .insert(name.to_string(), value)
            .unwrap_or_default()
    }

    pub fn get_internal_int(&self, key: &str) -> Option<i64> {
        match self.data.internal.get(key) {
            Some(InternalValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_internal_set(&self, key: &str) -> Vec<usize> {
        match self.data.internal.get(key) {
            Some(InternalValue::Set(values)) => values.clone(),
            _ => vec![],
        }
    }

    pub fn set_internal(&mut self, key: &str, value: InternalValue) {
        self.data.internal.insert(key.to_string(), value);
    }

    pub fn was_accessed(&self, index: u64) -> bool {
        self.data.access.get(&index).copied().unwrap_or(false)
    }

    pub fn set_as_accessed(&mut self, index: u64) {
        self.data.access.insert(index, true);
    }

    pub fn get_all(&self) -> MemoryData {
        self.data.clone()
    }

    pub fn load(&mut self, data: MemoryData) {
        self.data = data;
    }

    pub fn clear(&mut self) {
        self.data = MemoryData::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_fall_back_to_default() {
        let mut memory = Memory::new();
        assert_eq!(memory.get_variable("hp", Value::from(10)), Value::Number(10.0));
        assert_eq!(memory.set_variable("hp", Value::from(3)), Value::Null);
        assert_eq!(memory.set_variable("hp", Value::from(4)), Value::Number(3.0));
        assert_eq!(memory.get_variable("hp", Value::Null), Value::Number(4.0));
    }

    #[test]
    fn options_count_reads_internal_store() {
        let mut memory = Memory::new();
        memory.set_variable(OPTIONS_COUNT, Value::from(99));
        assert_eq!(memory.get_variable(OPTIONS_COUNT, Value::Null), Value::Null);
        memory.set_internal(OPTIONS_COUNT, InternalValue::Int(2));
        assert_eq!(
            memory.get_variable(OPTIONS_COUNT, Value::Null),
            Value::Number(2.0)
        );
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut memory = Memory::new();
        memory.set_variable("name", Value::from("Vincent"));
        memory.set_variable("flag", Value::from(true));
        memory.set_as_accessed(1002);
        memory.set_internal("12.cursor", InternalValue::Int(-1));
        memory.set_internal("12.visited", InternalValue::Set(vec![0, 2]));

        let json = serde_json::to_string(&memory.get_all()).unwrap();
        let restored: MemoryData = serde_json::from_str(&json).unwrap();
        let restored = Memory::from_data(restored);

        assert!(restored.was_accessed(1002));
        assert!(!restored.was_accessed(1003));
        assert_eq!(restored.get_internal_int("12.cursor"), Some(-1));
        assert_eq!(restored.get_internal_set("12.visited"), vec![0, 2]);
        assert_eq!(
            restored.get_variable("name", Value::Null),
            Value::from("Vincent")
        );
    }

    #[test]
    fn clear_resets_everything() {
        let mut memory = Memory::new();
        memory.set_variable("a", Value::from(1));
        memory.set_as_accessed(10);
        memory.clear();
        assert_eq!(memory.get_all(), MemoryData::default());
    }
}
