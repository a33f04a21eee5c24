//! # Cloud → Store Field Transformation
//!
//! The cloud speaks camelCase JSON with occasional per-entity quirks; the
//! store speaks snake_case columns. Each pull plan entry carries a small
//! rename table for the quirks (applied first), and everything else goes
//! through the mechanical camelCase→snake_case rule. Keys that do not map
//! to a known column are dropped.
//!
//! Type coercion (booleans to 0/1, objects/arrays to TEXT) happens at bind
//! time in the store layer; this module is purely about names.

use serde_json::{Map, Value};

/// Mechanical camelCase → snake_case.
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Normalizes one cloud item into a store row map restricted to `columns`.
///
/// Returns `None` when the item is not a JSON object (a per-row data
/// error: logged and skipped by the caller, never fatal to the batch).
pub fn transform_item(
    item: &Value,
    columns: &[&str],
    renames: &[(&str, &str)],
) -> Option<Map<String, Value>> {
    let object = item.as_object()?;
    let mut row = Map::new();

    for (key, value) in object {
        let column = renames
            .iter()
            .find(|(cloud, _)| cloud == key)
            .map(|(_, col)| (*col).to_string())
            .unwrap_or_else(|| camel_to_snake(key));

        if columns.contains(&column.as_str()) {
            row.insert(column, value.clone());
        }
    }

    Some(row)
}
