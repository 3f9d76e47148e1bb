//! Payload inflation: grows an object template by a target byte budget while
//! preserving the rest of its structure.

use serde_json::{Map, Value};

use crate::error::{HarnessError, Result};

// Every generated entry serializes to 1000 bytes of JSON:
//   annotations:  ,"<10 digits>":"<984 chars>"
//   body array:   ,"dummy-<991 digits>"
const ANNOTATION_KEY_WIDTH: usize = 10;
const ANNOTATION_VALUE_LEN: usize = 984;
const BODY_SUFFIX_WIDTH: usize = 991;

/// Returns a copy of `template` whose serialized size grows by roughly
/// `size_kb` kilobytes at `path`. Metadata-rooted paths get an
/// annotation-style string map; any other path gets a string array, since
/// metadata has no good array candidate. Same inputs always produce the same
/// serialized size.
pub fn inflate(template: &Value, size_kb: usize, path: &[&str]) -> Result<Value> {
    if path.is_empty() {
        return Err(HarnessError::Config(
            "payload inflation path cannot be empty".to_string(),
        ));
    }

    let mut document = template.clone();
    let filler = if path[0] == "metadata" {
        let mut entries = Map::new();
        for i in 0..size_kb {
            entries.insert(
                format!("{:0width$}", i, width = ANNOTATION_KEY_WIDTH),
                Value::String("x".repeat(ANNOTATION_VALUE_LEN)),
            );
        }
        Value::Object(entries)
    } else {
        let entries: Vec<Value> = (0..size_kb)
            .map(|i| Value::String(format!("dummy-{:0width$}", i, width = BODY_SUFFIX_WIDTH)))
            .collect();
        Value::Array(entries)
    };

    set_nested(&mut document, path, filler)?;
    Ok(document)
}

/// Serialized JSON size of a document, used to verify sizing behavior
pub fn serialized_size(document: &Value) -> Result<usize> {
    Ok(serde_json::to_vec(document)?.len())
}

fn set_nested(root: &mut Value, path: &[&str], leaf: Value) -> Result<()> {
    let mut cursor = root;
    for segment in &path[..path.len() - 1] {
        let map = cursor.as_object_mut().ok_or_else(|| {
            HarnessError::Serialization(format!("template field {segment} is not a mapping"))
        })?;
        cursor = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let last = path[path.len() - 1];
    let map = cursor.as_object_mut().ok_or_else(|| {
        HarnessError::Serialization(format!("parent of template field {last} is not a mapping"))
    })?;
    map.insert(last.to_string(), leaf);
    Ok(())
}
