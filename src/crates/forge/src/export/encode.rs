//! Byte encoding of export payloads
//!
//! Text payloads are served as UTF-8. `xlsx` is written as a minimal
//! SpreadsheetML package with inline strings; `pdf` as a plain Helvetica
//! text document, 50 lines per page.

use super::{flatten, scalar_text, ExportFormat, ExportPayload};
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload does not match format {0}")]
    UnexpectedPayload(ExportFormat),
}

/// Encode a payload for `format`.
pub fn encode(format: ExportFormat, payload: &ExportPayload) -> Result<Vec<u8>, EncodeError> {
    match (format, payload) {
        (ExportFormat::Xlsx, ExportPayload::Structured(value)) => encode_xlsx(value),
        (ExportFormat::Pdf, ExportPayload::Structured(value)) => Ok(encode_pdf(value)),
        (ExportFormat::Json, ExportPayload::Structured(value)) => Ok(serde_json::to_vec_pretty(value)?),
        (ExportFormat::Xlsx | ExportFormat::Pdf | ExportFormat::Json, ExportPayload::Text(_)) => {
            Err(EncodeError::UnexpectedPayload(format))
        }
        (_, ExportPayload::Text(text)) => Ok(text.as_bytes().to_vec()),
        (_, ExportPayload::Structured(_)) => Err(EncodeError::UnexpectedPayload(format)),
    }
}

fn xml_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Spreadsheet column name for a 0-based index: A, B, ..., Z, AA, ...
fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

fn sheet_cell(out: &mut String, reference: &str, value: &Value) {
    match value {
        Value::Number(n) => {
            let _ = write!(out, "<c r=\"{}\"><v>{}</v></c>", reference, n);
        }
        Value::Bool(b) => {
            let _ = write!(out, "<c r=\"{}\" t=\"b\"><v>{}</v></c>", reference, u8::from(*b));
        }
        Value::Null => {}
        other => {
            let _ = write!(
                out,
                "<c r=\"{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                reference,
                xml_text(&scalar_text(other))
            );
        }
    }
}

fn worksheet_xml(rows: &[Map<String, Value>]) -> String {
    let columns: std::collections::BTreeSet<&String> = rows.iter().flat_map(|r| r.keys()).collect();
    let columns: Vec<&String> = columns.into_iter().collect();

    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>",
    );
    if !columns.is_empty() {
        out.push_str("<row r=\"1\">");
        for (c, name) in columns.iter().enumerate() {
            sheet_cell(&mut out, &format!("{}1", column_name(c)), &Value::String((*name).clone()));
        }
        out.push_str("</row>");
    }
    for (r, row) in rows.iter().enumerate() {
        let line = r + 2;
        let _ = write!(out, "<row r=\"{}\">", line);
        for (c, name) in columns.iter().enumerate() {
            if let Some(value) = row.get(*name) {
                sheet_cell(&mut out, &format!("{}{}", column_name(c), line), value);
            }
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData></worksheet>");
    out
}

const CONTENT_TYPES_HEAD: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>";

const ROOT_RELS: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>\
</Relationships>";

/// Write `{sheets: [{name, data: [row, ...]}]}` as an xlsx package.
pub fn encode_xlsx(value: &Value) -> Result<Vec<u8>, EncodeError> {
    let sheets: Vec<(String, Vec<Map<String, Value>>)> = value
        .get("sheets")
        .and_then(Value::as_array)
        .map(|sheets| {
            sheets
                .iter()
                .map(|sheet| {
                    let name = sheet
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("Sheet")
                        .to_string();
                    let rows = sheet
                        .get("data")
                        .and_then(Value::as_array)
                        .map(|rows| rows.iter().filter_map(|r| r.as_object().map(flatten)).collect())
                        .unwrap_or_default();
                    (name, rows)
                })
                .collect()
        })
        .unwrap_or_default();
    let sheets = if sheets.is_empty() {
        vec![("Results".to_string(), Vec::new())]
    } else {
        sheets
    };

    let mut content_types = String::from(CONTENT_TYPES_HEAD);
    let mut workbook = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\"><sheets>",
    );
    let mut workbook_rels = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        let n = i + 1;
        let _ = write!(
            content_types,
            "<Override PartName=\"/xl/worksheets/sheet{}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
            n
        );
        let _ = write!(
            workbook,
            "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
            xml_text(name),
            n,
            n
        );
        let _ = write!(
            workbook_rels,
            "<Relationship Id=\"rId{0}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet{0}.xml\"/>",
            n
        );
    }
    content_types.push_str("</Types>");
    workbook.push_str("</sheets></workbook>");
    workbook_rels.push_str("</Relationships>");

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types.as_bytes())?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS.as_bytes())?;
    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook.as_bytes())?;
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(workbook_rels.as_bytes())?;
    for (i, (_, rows)) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        zip.write_all(worksheet_xml(rows).as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

const LINES_PER_PAGE: usize = 50;

/// Escape a line for a PDF literal string. Non-ASCII becomes `?`.
fn pdf_text(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            '\t' => out.push_str("    "),
            _ => out.push('?'),
        }
    }
    out
}

fn pdf_lines(value: &Value) -> Vec<String> {
    let title = value
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Generation Results");
    let mut lines = vec![title.to_string()];
    if let Some(at) = value.get("generated_at").and_then(Value::as_str) {
        lines.push(format!("Generated at: {}", at));
    }
    lines.push(String::new());

    let results = value.get("results").and_then(Value::as_array);
    match results {
        Some(results) if !results.is_empty() => {
            for (i, result) in results.iter().enumerate() {
                lines.push(format!("Result {}", i + 1));
                if let Some(map) = result.as_object() {
                    for (key, cell) in flatten(map) {
                        let text = format!("  {}: {}", key, scalar_text(&cell));
                        lines.extend(text.lines().map(str::to_string));
                    }
                }
                lines.push(String::new());
            }
        }
        _ => lines.push("No results generated.".to_string()),
    }
    lines
}

/// Render `{title, generated_at, results}` as a text-only PDF.
pub fn encode_pdf(value: &Value) -> Vec<u8> {
    let lines = pdf_lines(value);
    let pages: Vec<&[String]> = lines.chunks(LINES_PER_PAGE).collect();

    // 1 catalog, 2 page tree, 3 font, then a (page, content) pair per page.
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + i * 2).collect();
    let mut objects: Vec<String> = Vec::new();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    let kids: Vec<String> = page_ids.iter().map(|id| format!("{} 0 R", id)).collect();
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

    for (page, id) in pages.iter().zip(&page_ids) {
        let mut stream = String::from("BT /F1 10 Tf 14 TL 50 800 Td\n");
        for line in page.iter() {
            let _ = writeln!(stream, "({}) '", pdf_text(line));
        }
        stream.push_str("ET");
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            id + 1
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(out.len());
        let _ = write!(out, "{} 0 obj\n{}\nendobj\n", i + 1, object);
    }
    let xref = out.len();
    let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(out, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    );
    out.into_bytes()
}
