// OOXML helpers: Office files are zip archives of XML parts

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

use super::text::decode_entities;

/// Office container formats we can read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OfficeFormat {
    Docx,
    Pptx,
    Xlsx,
}

impl OfficeFormat {
    pub(crate) fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "xlsx" | "xlsm" => Some(Self::Xlsx),
            _ => None,
        }
    }

    fn is_text_part(self, name: &str) -> bool {
        match self {
            Self::Docx => {
                name == "word/document.xml"
                    || name.starts_with("word/header")
                    || name.starts_with("word/footer")
            }
            Self::Pptx => name.starts_with("ppt/slides/slide") && name.ends_with(".xml"),
            Self::Xlsx => {
                name == "xl/sharedStrings.xml"
                    || (name.starts_with("xl/worksheets/sheet") && name.ends_with(".xml"))
            }
        }
    }
}

/// Read every XML part of the archive at `path` accepted by `keep`.
pub(crate) fn read_parts(
    path: &Path,
    keep: impl Fn(&str) -> bool,
) -> Result<BTreeMap<String, String>, String> {
    let file = File::open(path).map_err(|e| format!("Failed to open file {}: {}", path.display(), e))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| format!("Failed to open zip archive: {}", e))?;

    let mut parts = BTreeMap::new();
    for index in 0..archive.len() {
        let mut entry =
            archive.by_index(index).map_err(|e| format!("Failed to read zip entry: {}", e))?;
        let name = entry.name().to_string();
        if !keep(&name) {
            continue;
        }
        let mut xml = String::new();
        entry
            .read_to_string(&mut xml)
            .map_err(|e| format!("Failed to read XML entry {}: {}", name, e))?;
        parts.insert(name, xml);
    }
    Ok(parts)
}

/// Plain text of a docx, pptx or xlsx file, one section per XML part.
pub(crate) fn extract_text(path: &Path, format: OfficeFormat) -> Result<String, String> {
    let parts = read_parts(path, |name| format.is_text_part(name))?;
    if parts.is_empty() {
        return Err(format!("No readable XML parts found in {}", path.display()));
    }

    let chunks: Vec<String> = parts
        .iter()
        .filter_map(|(name, xml)| {
            let text = xml_to_text(xml);
            (!text.is_empty()).then(|| format!("# {}\n{}", name, text))
        })
        .collect();
    Ok(chunks.join("\n\n"))
}

/// Strip tags from an XML part, keeping paragraph and row breaks.
pub(crate) fn xml_to_text(xml: &str) -> String {
    let with_breaks = xml
        .replace("</w:p>", "\n")
        .replace("</a:p>", "\n")
        .replace("</row>", "\n")
        .replace("</si>", "\n")
        .replace("<w:tab/>", "\t")
        .replace("<w:br/>", "\n")
        .replace("<a:br/>", "\n");

    let mut result = String::with_capacity(with_breaks.len());
    let mut in_tag = false;
    for ch in with_breaks.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    decode_entities(&result)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escape text for inclusion in XML content or attributes.
pub(crate) fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Value of `name="..."` inside a start tag.
pub(crate) fn attribute(tag: &str, name: &str) -> Option<String> {
    let needle = format!("{}=\"", name);
    let mut search_from = 0;
    while let Some(found) = tag[search_from..].find(&needle) {
        let start = search_from + found;
        let preceded_by_space = tag[..start].ends_with(|c: char| c.is_whitespace());
        let value_start = start + needle.len();
        if preceded_by_space {
            let len = tag[value_start..].find('"')?;
            return Some(decode_entities(&tag[value_start..value_start + len]));
        }
        search_from = value_start;
    }
    None
}
