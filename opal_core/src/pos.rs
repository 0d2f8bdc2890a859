//! Source-position rendering.
//!
//! Instruction objects may carry a `src_pos` annotation: an object with
//! `line_no` / `col_no` int32 fields and an optional `src_name` string. The
//! execution core treats the shape as opaque apart from this renderer, which
//! is used only to prefix error messages.

use crate::value::Value;

/// Render a `src_pos` annotation as `name@line:col` (or `line:col` when no
/// source name is present). Returns `None` for values that do not look like
/// a position object.
pub fn pos_to_string(pos: Value) -> Option<String> {
    let obj = pos.as_object()?;
    let line = obj.get_field("line_no")?.as_int32()?;
    let col = obj.get_field("col_no")?.as_int32()?;
    match obj.get_field("src_name").and_then(|v| v.as_str()) {
        Some(name) => Some(format!("{}@{}:{}", name.to_utf8_lossy(), line, col)),
        None => Some(format!("{}:{}", line, col)),
    }
}
