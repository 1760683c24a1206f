//! Result export
//!
//! [`export`] is a pure function of a job's result list: no I/O and no job
//! state. Text formats come back as strings; `json`, `xlsx` and `pdf` come
//! back as structured values. [`encode`] turns any payload into the bytes
//! served over HTTP.
//!
//! Only `xml` and `pdf` carry a `generated_at` timestamp. Every other
//! format is byte-identical across repeated exports of the same results.

pub mod encode;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt::Write as _;

pub use encode::{encode, EncodeError};

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    #[serde(alias = "md")]
    Markdown,
    Html,
    Xml,
    Txt,
    Xlsx,
    Pdf,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 8] = [
        ExportFormat::Json,
        ExportFormat::Csv,
        ExportFormat::Markdown,
        ExportFormat::Html,
        ExportFormat::Xml,
        ExportFormat::Txt,
        ExportFormat::Xlsx,
        ExportFormat::Pdf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Markdown => "markdown",
            ExportFormat::Html => "html",
            ExportFormat::Xml => "xml",
            ExportFormat::Txt => "txt",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }

    /// File extension used in the attachment name.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            other => other.as_str(),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Markdown => "text/markdown",
            ExportFormat::Html => "text/html",
            ExportFormat::Xml => "application/xml",
            ExportFormat::Txt => "text/plain",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Pdf => "application/pdf",
        }
    }

    /// `generation_<job_id>.<ext>`
    pub fn filename(&self, job_id: &str) -> String {
        format!("generation_{}.{}", job_id, self.extension())
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "html" => Ok(ExportFormat::Html),
            "xml" => Ok(ExportFormat::Xml),
            "txt" => Ok(ExportFormat::Txt),
            "xlsx" => Ok(ExportFormat::Xlsx),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(format!("Unsupported export format: {}", other)),
        }
    }
}

/// Exporter output before byte encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportPayload {
    Text(String),
    Structured(Value),
}

impl ExportPayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ExportPayload::Text(text) => Some(text),
            ExportPayload::Structured(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ExportPayload::Structured(value) => Some(value),
            ExportPayload::Text(_) => None,
        }
    }
}

type Item = Map<String, Value>;

/// Export `results` stamped with the current time.
pub fn export(results: &[Item], format: ExportFormat) -> ExportPayload {
    export_at(results, format, Utc::now())
}

/// Export with an explicit `generated_at`.
pub fn export_at(results: &[Item], format: ExportFormat, generated_at: DateTime<Utc>) -> ExportPayload {
    let stamp = generated_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    match format {
        ExportFormat::Json => ExportPayload::Structured(Value::Array(
            results.iter().cloned().map(Value::Object).collect(),
        )),
        ExportFormat::Csv => ExportPayload::Text(to_csv(results)),
        ExportFormat::Markdown => ExportPayload::Text(to_markdown(results)),
        ExportFormat::Html => ExportPayload::Text(to_html(results)),
        ExportFormat::Xml => ExportPayload::Text(to_xml(results, &stamp)),
        ExportFormat::Txt => ExportPayload::Text(to_txt(results)),
        ExportFormat::Xlsx => ExportPayload::Structured(json!({
            "sheets": [{
                "name": "Results",
                "data": results.iter().map(|r| Value::Object(flatten(r))).collect::<Vec<_>>(),
            }]
        })),
        ExportFormat::Pdf => ExportPayload::Structured(json!({
            "title": "Generation Results",
            "generated_at": stamp,
            "results": results,
        })),
    }
}

/// Flatten nested objects into dotted keys. Arrays become one JSON-encoded
/// string value.
pub fn flatten(item: &Item) -> Item {
    let mut out = Map::new();
    flatten_into(item, "", &mut out);
    out
}

fn flatten_into(item: &Item, prefix: &str, out: &mut Item) {
    for (key, value) in item {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(nested) => flatten_into(nested, &name, out),
            Value::Array(_) => {
                out.insert(name, Value::String(value.to_string()));
            }
            scalar => {
                out.insert(name, scalar.clone());
            }
        }
    }
}

/// Scalar display text. Strings are unquoted, null is empty.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn to_csv(results: &[Item]) -> String {
    if results.is_empty() {
        return String::new();
    }
    let rows: Vec<Item> = results.iter().map(flatten).collect();
    let columns: BTreeSet<&String> = rows.iter().flat_map(|r| r.keys()).collect();

    let mut out = String::new();
    let header: Vec<String> = columns.iter().map(|c| csv_field(c)).collect();
    out.push_str(&header.join(","));
    out.push_str("\r\n");
    for row in &rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| row.get(*c).map(scalar_text).unwrap_or_default())
            .map(|cell| csv_field(&cell))
            .collect();
        out.push_str(&cells.join(","));
        out.push_str("\r\n");
    }
    out
}

fn to_markdown(results: &[Item]) -> String {
    if results.is_empty() {
        return "# No Results\n".to_string();
    }
    let mut lines = vec!["# Generation Results".to_string()];
    for (i, result) in results.iter().enumerate() {
        lines.push(String::new());
        lines.push(format!("## Result {}", i + 1));
        lines.push(String::new());
        markdown_lines(result, 0, &mut lines);
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn markdown_lines(item: &Item, level: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(level);
    for (key, value) in item {
        match value {
            Value::Object(nested) => {
                lines.push(format!("{}- **{}**:", indent, key));
                markdown_lines(nested, level + 1, lines);
            }
            Value::Array(_) => lines.push(format!("{}- **{}**: {}", indent, key, value)),
            scalar => lines.push(format!("{}- **{}**: {}", indent, key, scalar_text(scalar))),
        }
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Every result has the same key set and only scalar values.
fn is_tabular(results: &[Item]) -> bool {
    let Some(first) = results.first() else {
        return false;
    };
    let keys: BTreeSet<&String> = first.keys().collect();
    results.iter().all(|r| {
        r.keys().collect::<BTreeSet<_>>() == keys
            && r.values().all(|v| !v.is_object() && !v.is_array())
    })
}

const HTML_HEAD: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Generation Results</title>\
<style>body{font-family:Arial,sans-serif;margin:20px;}\
table{border-collapse:collapse;width:100%;margin:20px 0;}\
th,td{border:1px solid #ddd;padding:8px;text-align:left;}\
th{background-color:#f2f2f2;}</style></head><body><h1>Generation Results</h1>";

fn to_html(results: &[Item]) -> String {
    if results.is_empty() {
        return "<html><body><h1>No Results</h1></body></html>".to_string();
    }
    let mut out = String::from(HTML_HEAD);
    if is_tabular(results) {
        let keys: BTreeSet<&String> = results[0].keys().collect();
        out.push_str("<table><thead><tr>");
        for key in &keys {
            let _ = write!(out, "<th>{}</th>", escape_html(key));
        }
        out.push_str("</tr></thead><tbody>");
        for result in results {
            out.push_str("<tr>");
            for key in &keys {
                let cell = result.get(*key).map(scalar_text).unwrap_or_default();
                let _ = write!(out, "<td>{}</td>", escape_html(&cell));
            }
            out.push_str("</tr>");
        }
        out.push_str("</tbody></table>");
    } else {
        for (i, result) in results.iter().enumerate() {
            let pretty = serde_json::to_string_pretty(result).unwrap_or_default();
            let _ = write!(out, "<h2>Result {}</h2><pre>{}</pre>", i + 1, escape_html(&pretty));
        }
    }
    out.push_str("</body></html>");
    out
}

/// Make a key usable as an XML element name. Spaces and hyphens become
/// underscores; other illegal characters too, and a leading non-letter
/// gets an underscore prefix.
pub(crate) fn xml_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !name.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn xml_elements(item: &Item, out: &mut String) {
    for (key, value) in item {
        let name = xml_name(key);
        match value {
            Value::Object(nested) => {
                let _ = write!(out, "<{}>", name);
                xml_elements(nested, out);
                let _ = write!(out, "</{}>", name);
            }
            Value::Array(_) => {
                let _ = write!(out, "<{0}>{1}</{0}>", name, escape_xml(&value.to_string()));
            }
            scalar => {
                let _ = write!(out, "<{0}>{1}</{0}>", name, escape_xml(&scalar_text(scalar)));
            }
        }
    }
}

fn to_xml(results: &[Item], generated_at: &str) -> String {
    let mut out = format!("<results generated_at=\"{}\">", escape_xml(generated_at));
    for (i, result) in results.iter().enumerate() {
        let _ = write!(out, "<result index=\"{}\">", i + 1);
        xml_elements(result, &mut out);
        out.push_str("</result>");
    }
    out.push_str("</results>");
    out
}

fn text_lines(item: &Item, level: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(level);
    for (key, value) in item {
        match value {
            Value::Object(nested) => {
                lines.push(format!("{}{}:", indent, key));
                text_lines(nested, level + 1, lines);
            }
            Value::Array(_) => lines.push(format!("{}{}: {}", indent, key, value)),
            scalar => lines.push(format!("{}{}: {}", indent, key, scalar_text(scalar))),
        }
    }
}

fn to_txt(results: &[Item]) -> String {
    if results.is_empty() {
        return "No results generated.".to_string();
    }
    let mut lines = vec!["Generation Results".to_string(), "=".repeat(50), String::new()];
    for (i, result) in results.iter().enumerate() {
        lines.push(format!("Result {}:", i + 1));
        lines.push("-".repeat(30));
        text_lines(result, 0, &mut lines);
        lines.push(String::new());
    }
    lines.join("\n")
}
