//! Report → human/json string formatting.
//!
//! Two modes:
//! - **Human** (default): indented field listing, e.g. `#1 (int) 3`
//! - **JSON** (`--json`): `serde_json::to_string_pretty`

use std::path::PathBuf;

use savestate_core::{Fields, SaveDocument, Value};
use savestate_durability::BlobHeader;
use serde_json::{json, Map};

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Result of verifying one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub file: String,
    pub result: Result<VerifySummary, String>,
}

/// What a successful verification found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifySummary {
    pub schema_version: u32,
    pub fields: usize,
    pub opaque_fields: usize,
}

/// Format an error.
pub fn format_error(message: &str, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(&json!({ "error": message }))
            .unwrap_or_else(|_| format!("{{\"error\": \"{}\"}}", message)),
        OutputMode::Human => format!("(error) {}", message),
    }
}

/// Format `inspect` output.
pub fn format_inspect(header: &BlobHeader, document: &SaveDocument, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => {
            let out = json!({
                "magic": String::from_utf8_lossy(&header.magic),
                "format_revision": header.format_revision,
                "schema_version": header.schema_version,
                "payload_len": header.payload_len,
                "payload_checksum": format!("{:016x}", header.payload_checksum),
                "fields": fields_to_json(document.fields()),
            });
            serde_json::to_string_pretty(&out).unwrap_or_else(|e| format_error(&e.to_string(), mode))
        }
        OutputMode::Human => {
            let mut out = String::new();
            out.push_str(&format!(
                "magic:            {}\n",
                String::from_utf8_lossy(&header.magic)
            ));
            out.push_str(&format!("format revision:  {}\n", header.format_revision));
            out.push_str(&format!("schema version:   {}\n", header.schema_version));
            out.push_str(&format!("payload length:   {}\n", header.payload_len));
            out.push_str(&format!("payload checksum: {:016x}\n", header.payload_checksum));
            out.push_str(&format!("fields:           {}\n", document.len()));
            format_fields_human(&mut out, document.fields(), 1);
            out.trim_end().to_string()
        }
    }
}

/// Format `verify` output.
pub fn format_verify(outcomes: &[VerifyOutcome], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => {
            let items: Vec<serde_json::Value> = outcomes
                .iter()
                .map(|o| match &o.result {
                    Ok(s) => json!({
                        "file": o.file,
                        "ok": true,
                        "schema_version": s.schema_version,
                        "fields": s.fields,
                        "opaque_fields": s.opaque_fields,
                    }),
                    Err(e) => json!({ "file": o.file, "ok": false, "error": e }),
                })
                .collect();
            serde_json::to_string_pretty(&items).unwrap_or_else(|e| format_error(&e.to_string(), mode))
        }
        OutputMode::Human => outcomes
            .iter()
            .map(|o| match &o.result {
                Ok(s) if s.opaque_fields > 0 => format!(
                    "OK    {} (v{}, {} fields, {} opaque)",
                    o.file, s.schema_version, s.fields, s.opaque_fields
                ),
                Ok(s) => format!("OK    {} (v{}, {} fields)", o.file, s.schema_version, s.fields),
                Err(e) => format!("FAIL  {}: {}", o.file, e),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Format `clean` output.
pub fn format_clean(removed: &[PathBuf], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => {
            let paths: Vec<String> = removed.iter().map(|p| p.display().to_string()).collect();
            serde_json::to_string_pretty(&json!({ "removed": paths }))
                .unwrap_or_else(|e| format_error(&e.to_string(), mode))
        }
        OutputMode::Human if removed.is_empty() => "(empty) no orphaned temp files".to_string(),
        OutputMode::Human => removed
            .iter()
            .map(|p| format!("removed {}", p.display()))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn fields_to_json(fields: &Fields) -> serde_json::Value {
    let mut map = Map::new();
    for (id, value) in fields {
        map.insert(id.get().to_string(), value_to_json(value));
    }
    serde_json::Value::Object(map)
}

/// Render a value as JSON.
///
/// Non-finite floats become strings, bytes become lowercase hex.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::UInt(u) => json!(u),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| json!(f.to_string())),
        Value::String(s) => json!(s),
        Value::Bytes(b) => json!({ "bytes": hex(b) }),
        Value::Document(fields) => fields_to_json(fields),
        Value::Sequence(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        Value::Variant { case, value } => json!({ "case": case, "value": value_to_json(value) }),
        Value::Opaque { tag, bytes } => json!({ "opaque_tag": tag, "len": bytes.len() }),
    }
}

fn format_fields_human(out: &mut String, fields: &Fields, depth: usize) {
    let indent = "  ".repeat(depth);
    for (id, value) in fields {
        match value {
            Value::Document(inner) => {
                out.push_str(&format!("{}{} (document)\n", indent, id));
                format_fields_human(out, inner, depth + 1);
            }
            other => out.push_str(&format!(
                "{}{} ({}) {}\n",
                indent,
                id,
                other.kind(),
                format_value_human(other)
            )),
        }
    }
}

fn format_value_human(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => format!("{:?}", s),
        Value::Bytes(b) => format!("0x{}", hex(b)),
        Value::Document(fields) => format!("{{{} fields}}", fields.len()),
        Value::Sequence(items) => format!(
            "[{}]",
            items
                .iter()
                .map(format_value_human)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Value::Variant { case, value } => format!("case {}: {}", case, format_value_human(value)),
        Value::Opaque { tag, bytes } => format!("<tag {:#04x}, {} bytes>", tag, bytes.len()),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
