//! Markdown to notebook conversion.
//!
//! The exported document is split on horizontal rules surrounded by blank
//! lines; each section becomes one markdown cell of an nbformat 4.5
//! notebook. Conversion is total: input with no usable section yields a
//! single placeholder cell.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::RunId;

/// MIME type offered with the downloaded bundle
pub const NOTEBOOK_MIME_TYPE: &str = "application/x-ipynb+json";

/// Source of the cell emitted when the document has no content
pub const PLACEHOLDER_SOURCE: [&str; 2] = ["# TeamFlow Export\n\n", "No content was available.\n"];

static SECTION_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}---\n{2,}").expect("section break pattern is valid"));

/// A Jupyter notebook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,
    pub metadata: Map<String, Value>,
    pub nbformat: u32,
    pub nbformat_minor: u32,
}

/// One notebook cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub cell_type: String,
    pub metadata: Map<String, Value>,
    /// Lines of the cell, each but the last keeping its `\n`
    pub source: Vec<String>,
}

impl Cell {
    /// Markdown cell holding `text`
    pub fn markdown(text: &str) -> Self {
        Self {
            cell_type: "markdown".to_string(),
            metadata: Map::new(),
            source: source_lines(text),
        }
    }

    /// Cell content as one string
    pub fn text(&self) -> String {
        self.source.concat()
    }
}

impl Notebook {
    /// Serialize with two-space indentation
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Split a document into trimmed, non-empty sections
pub fn split_sections(markdown: &str) -> Vec<String> {
    let normalized = markdown.replace("\r\n", "\n");
    SECTION_BREAK
        .split(&normalized)
        .map(str::trim)
        .filter(|section| !section.is_empty())
        .map(str::to_string)
        .collect()
}

/// Convert an exported document into a notebook
///
/// `metadata` entries are merged over the fixed kernel metadata.
pub fn markdown_to_notebook(markdown: &str, metadata: Map<String, Value>) -> Notebook {
    let mut cells: Vec<Cell> = split_sections(markdown)
        .iter()
        .map(|section| Cell::markdown(&format!("{}\n", section)))
        .collect();

    if cells.is_empty() {
        cells.push(Cell {
            cell_type: "markdown".to_string(),
            metadata: Map::new(),
            source: PLACEHOLDER_SOURCE.iter().map(|s| s.to_string()).collect(),
        });
    }

    let mut merged = Map::new();
    merged.insert(
        "kernelspec".to_string(),
        json!({
            "display_name": "Python 3",
            "language": "python",
            "name": "python3",
        }),
    );
    merged.insert("language_info".to_string(), json!({ "name": "python" }));
    merged.extend(metadata);

    Notebook {
        cells,
        metadata: merged,
        nbformat: 4,
        nbformat_minor: 5,
    }
}

/// File name of the downloaded notebook for a run
pub fn notebook_file_name(run_id: &RunId) -> String {
    format!("teamflow_{}.ipynb", run_id)
}

fn source_lines(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let mut lines: Vec<String> = normalized.split_inclusive('\n').map(str::to_string).collect();
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_sections() {
        let notebook = markdown_to_notebook("A\n\n---\n\nB", Map::new());
        let texts: Vec<String> = notebook.cells.iter().map(Cell::text).collect();
        assert_eq!(texts, vec!["A\n", "B\n"]);
    }

    #[test]
    fn test_empty_document_gets_placeholder() {
        let notebook = markdown_to_notebook("", Map::new());
        assert_eq!(notebook.cells.len(), 1);
        assert_eq!(notebook.cells[0].source, PLACEHOLDER_SOURCE.to_vec());
    }

    #[test]
    fn test_rules_only_document_gets_placeholder() {
        let notebook = markdown_to_notebook("\n\n---\n\n   \n\n---\n\n", Map::new());
        assert_eq!(notebook.cells.len(), 1);
        assert_eq!(notebook.cells[0].text(), PLACEHOLDER_SOURCE.concat());
    }

    #[test]
    fn test_line_terminators_preserved() {
        let notebook = markdown_to_notebook("# PRD\r\n- one\r\n- two", Map::new());
        assert_eq!(notebook.cells.len(), 1);
        assert_eq!(notebook.cells[0].source, vec!["# PRD\n", "- one\n", "- two\n"]);
    }

    #[test]
    fn test_rule_without_blank_lines_does_not_split() {
        let sections = split_sections("Title\n---\nBody\n\n---\n\nNext");
        assert_eq!(sections, vec!["Title\n---\nBody", "Next"]);
    }

    #[test]
    fn test_metadata_merge() {
        let mut extra = Map::new();
        extra.insert("teamflow".to_string(), json!({ "runId": "run_1" }));
        extra.insert("language_info".to_string(), json!({ "name": "markdown" }));

        let notebook = markdown_to_notebook("A", extra);
        assert_eq!(notebook.nbformat, 4);
        assert_eq!(notebook.nbformat_minor, 5);
        assert_eq!(notebook.metadata["kernelspec"]["name"], "python3");
        assert_eq!(notebook.metadata["language_info"]["name"], "markdown");
        assert_eq!(notebook.metadata["teamflow"]["runId"], "run_1");
    }

    #[test]
    fn test_pretty_json_shape() {
        let notebook = markdown_to_notebook("A", Map::new());
        let json = notebook.to_pretty_json().unwrap();
        assert!(json.starts_with("{\n  \"cells\": ["));
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["cells"][0]["cell_type"], "markdown");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            notebook_file_name(&RunId::new("run_abc")),
            "teamflow_run_abc.ipynb"
        );
    }
}
