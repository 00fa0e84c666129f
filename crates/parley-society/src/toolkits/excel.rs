//! Spreadsheet toolkit
//!
//! Reads `.xlsx` workbooks and `.csv` files into markdown tables and writes
//! minimal single-sheet `.xlsx` workbooks. Workbooks are handled directly as
//! OOXML zip archives; formulas are read as their cached values.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::file_write::resolve_in_output_dir;
use super::office::{attribute, escape_xml, read_parts};
use super::text::{decode_entities, resolve_path};
use super::{Tool, ToolArguments, ToolHandler, ToolParameters, ToolResult, Toolkit};
use crate::error::{Result, SocietyError};

const EXTRACT_TOOL: &str = "extract_excel_content";
const WRITE_TOOL: &str = "write_excel";

static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<row\b([^>]*?)(?:/>|>(.*?)</row>)").expect("static regex"));
static CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)").expect("static regex"));
static VALUE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<v>(.*?)</v>").expect("static regex"));
static TEXT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<t(?:\s[^>]*)?>(.*?)</t>").expect("static regex"));
static SHARED_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<si>(.*?)</si>").expect("static regex"));
static SHEET_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<sheet\b[^>]*>").expect("static regex"));
static RELATIONSHIP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Relationship\b[^>]*>").expect("static regex"));

/// Toolkit exposing `extract_excel_content` and `write_excel`
#[derive(Debug, Clone)]
pub struct ExcelToolkit {
    output_dir: PathBuf,
}

impl ExcelToolkit {
    /// Workbooks are written into `output_dir`; relative read paths are
    /// looked up there first, then in the working directory.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }
}

impl Toolkit for ExcelToolkit {
    fn name(&self) -> &'static str {
        "excel"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new(
                EXTRACT_TOOL,
                "Extract the content of an Excel (.xlsx) or CSV file as markdown tables, \
                 one table per sheet.",
                ToolParameters::new().add_property(
                    "document_path",
                    "string",
                    "Path of the .xlsx or .csv file",
                    true,
                ),
                Arc::new(ExtractExcelHandler { output_dir: self.output_dir.clone() }),
            ),
            Tool::new(
                WRITE_TOOL,
                "Write rows of values to a new .xlsx workbook in the output directory. The \
                 first row is usually the header.",
                ToolParameters::new()
                    .add_property("file_path", "string", "File name of the workbook, e.g. 'stats.xlsx'", true)
                    .add_array_property(
                        "rows",
                        json!({"type": "array", "items": {"type": ["string", "number", "boolean", "null"]}}),
                        "Table rows; each row is an array of cell values",
                        true,
                    )
                    .add_property("sheet_name", "string", "Worksheet name (defaults to 'Sheet1')", false),
                Arc::new(WriteExcelHandler { output_dir: self.output_dir.clone() }),
            ),
        ]
    }
}

struct ExtractExcelHandler {
    output_dir: PathBuf,
}

#[async_trait]
impl ToolHandler for ExtractExcelHandler {
    async fn execute(&self, args: &ToolArguments) -> Result<ToolResult> {
        let document_path = args.require_string("document_path")?;
        let path = locate(&self.output_dir, &document_path);
        if !path.exists() {
            return Err(SocietyError::tool(EXTRACT_TOOL, format!("File not found: {}", document_path)));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        debug!(path = %path.display(), extension = %extension, "Extracting spreadsheet");

        let content = match extension.as_str() {
            "csv" => {
                let text = tokio::fs::read_to_string(&path).await?;
                let rows = parse_csv(&text).map_err(|e| SocietyError::tool(EXTRACT_TOOL, e.to_string()))?;
                format!("Sheet: {}\n{}", file_stem(&path), render_table(&rows))
            }
            "xlsx" | "xlsm" => {
                let blocking_path = path.clone();
                let sheets = tokio::task::spawn_blocking(move || read_workbook(&blocking_path))
                    .await
                    .map_err(|e| SocietyError::tool(EXTRACT_TOOL, e.to_string()))?
                    .map_err(|e| SocietyError::tool(EXTRACT_TOOL, e))?;
                sheets
                    .iter()
                    .map(|(name, rows)| format!("Sheet: {}\n{}", name, render_table(rows)))
                    .collect::<Vec<_>>()
                    .join("\n\n")
            }
            other => {
                return Err(SocietyError::invalid_args(
                    EXTRACT_TOOL,
                    format!("Unsupported spreadsheet format '.{}'; expected .xlsx or .csv", other),
                ));
            }
        };

        Ok(ToolResult::success(content).with_metadata("file_path", path.display().to_string()))
    }
}

struct WriteExcelHandler {
    output_dir: PathBuf,
}

#[async_trait]
impl ToolHandler for WriteExcelHandler {
    async fn execute(&self, args: &ToolArguments) -> Result<ToolResult> {
        let file_path = args.require_string("file_path")?;
        let sheet_name = args.get_string("sheet_name").unwrap_or_else(|| "Sheet1".to_string());
        let rows = args
            .get_array("rows")
            .ok_or_else(|| SocietyError::invalid_args(WRITE_TOOL, "Missing required 'rows' argument"))?
            .iter()
            .map(|row| {
                row.as_array().cloned().ok_or_else(|| {
                    SocietyError::invalid_args(WRITE_TOOL, "Every row must be an array of values")
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut target = resolve_in_output_dir(&self.output_dir, &file_path, WRITE_TOOL)?;
        if target.extension().is_none() {
            target.set_extension("xlsx");
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let row_count = rows.len();
        let blocking_target = target.clone();
        tokio::task::spawn_blocking(move || write_workbook(&blocking_target, &sheet_name, &rows))
            .await
            .map_err(|e| SocietyError::tool(WRITE_TOOL, e.to_string()))?
            .map_err(|e| SocietyError::tool(WRITE_TOOL, e))?;

        debug!(path = %target.display(), rows = row_count, "Wrote workbook");
        Ok(ToolResult::success(format!("Wrote {} row(s) to {}", row_count, target.display()))
            .with_metadata("file_path", target.display().to_string()))
    }
}

fn locate(output_dir: &Path, document_path: &str) -> PathBuf {
    let in_output = resolve_path(output_dir, document_path);
    if in_output.exists() { in_output } else { PathBuf::from(document_path) }
}

fn file_stem(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("Sheet1").to_string()
}

/// Last column a worksheet can address (`XFD`).
const MAX_COLUMN: usize = 16_383;

/// Zero-based column index of a cell reference such as `AB12`.
///
/// References past `XFD` are rejected.
fn column_index(reference: &str) -> Option<usize> {
    let letters: String = reference.chars().take_while(char::is_ascii_alphabetic).collect();
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let index = letters
        .to_ascii_uppercase()
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + usize::from(b - b'A' + 1));
    Some(index - 1).filter(|i| *i <= MAX_COLUMN)
}

/// Column letters for a zero-based index.
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

fn concat_text_runs(fragment: &str) -> String {
    TEXT_RUN.captures_iter(fragment).map(|c| decode_entities(&c[1])).collect()
}

/// Sheets of a workbook as (name, rows), in workbook order.
fn read_workbook(path: &Path) -> std::result::Result<Vec<(String, Vec<Vec<String>>)>, String> {
    let parts = read_parts(path, |name| {
        name == "xl/workbook.xml"
            || name == "xl/_rels/workbook.xml.rels"
            || name == "xl/sharedStrings.xml"
            || (name.starts_with("xl/worksheets/") && name.ends_with(".xml"))
    })?;

    let shared: Vec<String> = parts
        .get("xl/sharedStrings.xml")
        .map(|xml| SHARED_STRING.captures_iter(xml).map(|c| concat_text_runs(&c[1])).collect())
        .unwrap_or_default();

    let targets: BTreeMap<String, String> = parts
        .get("xl/_rels/workbook.xml.rels")
        .map(|xml| {
            RELATIONSHIP_TAG
                .find_iter(xml)
                .filter_map(|m| {
                    let tag = m.as_str();
                    Some((attribute(tag, "Id")?, attribute(tag, "Target")?))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut sheets: Vec<(String, String)> = parts
        .get("xl/workbook.xml")
        .map(|xml| {
            SHEET_TAG
                .find_iter(xml)
                .filter_map(|m| {
                    let tag = m.as_str();
                    let name = attribute(tag, "name")?;
                    let target = targets.get(&attribute(tag, "r:id")?)?;
                    let target = target.trim_start_matches('/').trim_start_matches("xl/");
                    Some((name, format!("xl/{}", target)))
                })
                .collect()
        })
        .unwrap_or_default();

    // Workbooks without usable relationships: fall back to part order.
    if sheets.is_empty() {
        sheets = parts
            .keys()
            .filter(|name| name.starts_with("xl/worksheets/sheet"))
            .enumerate()
            .map(|(i, part)| (format!("Sheet{}", i + 1), part.clone()))
            .collect();
    }

    if sheets.is_empty() {
        return Err(format!("No worksheets found in {}", path.display()));
    }

    Ok(sheets
        .into_iter()
        .map(|(name, part)| {
            let rows = parts.get(&part).map(|xml| parse_sheet(xml, &shared)).unwrap_or_default();
            (name, rows)
        })
        .collect())
}

fn parse_sheet(xml: &str, shared: &[String]) -> Vec<Vec<String>> {
    let mut grid: BTreeMap<usize, BTreeMap<usize, String>> = BTreeMap::new();
    let mut next_row = 0usize;

    for row in ROW.captures_iter(xml) {
        let row_index = attribute(&row[1], "r")
            .and_then(|r| r.parse::<usize>().ok())
            .map_or(next_row, |r| r.saturating_sub(1));
        next_row = row_index + 1;
        let Some(body) = row.get(2) else { continue };

        let mut next_col = 0usize;
        for cell in CELL.captures_iter(body.as_str()) {
            let attrs = &cell[1];
            let col = attribute(attrs, "r").and_then(|r| column_index(&r)).unwrap_or(next_col);
            next_col = col + 1;
            let inner = cell.get(2).map_or("", |m| m.as_str());
            let raw = VALUE.captures(inner).map(|v| decode_entities(&v[1]));

            let value = match attribute(attrs, "t").as_deref() {
                Some("s") => raw
                    .and_then(|i| i.trim().parse::<usize>().ok())
                    .and_then(|i| shared.get(i).cloned())
                    .unwrap_or_default(),
                Some("inlineStr") => concat_text_runs(inner),
                Some("b") => match raw.as_deref() {
                    Some("1") => "TRUE".to_string(),
                    Some(_) => "FALSE".to_string(),
                    None => String::new(),
                },
                _ => raw.unwrap_or_default(),
            };
            if !value.is_empty() {
                grid.entry(row_index).or_default().insert(col, value);
            }
        }
    }

    let width = grid.values().filter_map(|cells| cells.keys().max()).max().map_or(0, |m| m + 1);
    grid.values()
        .map(|cells| (0..width).map(|c| cells.get(&c).cloned().unwrap_or_default()).collect())
        .collect()
}

/// CSV records as rows; quoted fields may span lines.
fn parse_csv(text: &str) -> std::result::Result<Vec<Vec<String>>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Render rows as a markdown table; the first row is the header.
fn render_table(rows: &[Vec<String>]) -> String {
    let Some(width) = rows.iter().map(Vec::len).max().filter(|w| *w > 0) else {
        return "(empty sheet)".to_string();
    };
    let line = |row: &[String]| {
        let cells: Vec<String> = (0..width)
            .map(|i| row.get(i).map_or(String::new(), |c| c.replace('|', "\\|").replace('\n', " ")))
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut out = vec![line(rows[0].as_slice()), format!("|{}", " --- |".repeat(width))];
    out.extend(rows[1..].iter().map(|row| line(row.as_slice())));
    out.join("\n")
}

fn cell_xml(reference: &str, value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(format!(r#"<c r="{}"><v>{}</v></c>"#, reference, n)),
        Value::Bool(b) => Some(format!(r#"<c r="{}" t="b"><v>{}</v></c>"#, reference, u8::from(*b))),
        Value::String(s) => Some(format!(
            r#"<c r="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
            reference,
            escape_xml(s)
        )),
        other => Some(format!(
            r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
            reference,
            escape_xml(&other.to_string())
        )),
    }
}

fn write_workbook(path: &Path, sheet_name: &str, rows: &[Vec<Value>]) -> std::result::Result<(), String> {
    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, value) in row.iter().enumerate() {
            if let Some(cell) = cell_xml(&format!("{}{}", column_name(c), r + 1), value) {
                sheet.push_str(&cell);
            }
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        escape_xml(sheet_name)
    );

    let parts: [(&str, &str); 5] = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#,
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
        ),
        ("xl/workbook.xml", workbook.as_str()),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#,
        ),
        ("xl/worksheets/sheet1.xml", sheet.as_str()),
    ];

    let file = File::create(path).map_err(|e| format!("Failed to create {}: {}", path.display(), e))?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in parts {
        writer.start_file(name, options).map_err(|e| format!("Failed to start zip file: {}", e))?;
        writer
            .write_all(content.as_bytes())
            .map_err(|e| format!("Failed to write zip file: {}", e))?;
    }
    writer.finish().map_err(|e| format!("Failed to finalize archive: {}", e))?;
    Ok(())
}
