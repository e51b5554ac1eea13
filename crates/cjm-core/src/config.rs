use serde_json::{Map, Value};

/// Untyped configuration tree shared by every stage of the pipeline.
///
/// Stages read typed views from it once per invocation (`LayoutConfig::from_config`,
/// `RenderOptions::from_config`, [`crate::merge::MergeOptions::from_config`]). Keys are dotted
/// paths such as `layout.block_width` or `merge.min_chain_len`.
#[derive(Debug, Clone, PartialEq)]
pub struct CjmConfig(Value);

impl Default for CjmConfig {
    fn default() -> Self {
        Self::empty_object()
    }
}

impl CjmConfig {
    pub fn empty_object() -> Self {
        Self(Value::Object(Map::new()))
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn get(&self, dotted_path: &str) -> Option<&Value> {
        let mut cur = &self.0;
        for segment in dotted_path.split('.') {
            cur = cur.as_object()?.get(segment)?;
        }
        Some(cur)
    }

    pub fn get_str(&self, dotted_path: &str) -> Option<&str> {
        self.get(dotted_path)?.as_str()
    }

    pub fn get_bool(&self, dotted_path: &str) -> Option<bool> {
        self.get(dotted_path)?.as_bool()
    }

    pub fn get_f64(&self, dotted_path: &str) -> Option<f64> {
        self.get(dotted_path)?.as_f64()
    }

    pub fn get_i64(&self, dotted_path: &str) -> Option<i64> {
        self.get(dotted_path)?.as_i64()
    }

    /// Whether new procedures get `TURN OUT` markers synthesized from their branch keys.
    pub fn implicit_turn_out(&self) -> bool {
        self.get_bool("model.implicit_turn_out").unwrap_or(true)
    }

    pub fn set_value(&mut self, dotted_path: &str, value: Value) {
        // A config built via `from_value` may hold a non-object root; replace it rather than
        // panic on user input.
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }

        let Value::Object(ref mut root) = self.0 else {
            return;
        };
        let mut cur: &mut Map<String, Value> = root;
        let mut segments = dotted_path.split('.').peekable();
        while let Some(seg) = segments.next() {
            if segments.peek().is_none() {
                cur.insert(seg.to_string(), value);
                return;
            }
            let slot = cur
                .entry(seg)
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Some(next) = slot.as_object_mut() else {
                return;
            };
            cur = next;
        }
    }

    pub fn deep_merge(&mut self, other: &Value) {
        deep_merge_value(&mut self.0, other);
    }
}

fn deep_merge_value(base: &mut Value, incoming: &Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(in_map)) => {
            for (key, in_value) in in_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge_value(base_value, in_value),
                    None => {
                        base_map.insert(key.clone(), in_value.clone());
                    }
                }
            }
        }
        (base_slot, in_value) => {
            *base_slot = in_value.clone();
        }
    }
}
