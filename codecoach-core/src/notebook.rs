//! Jupyter notebook input: the learner's editable code and the output of the
//! validation cell.
//!
//! Only nbformat 4 JSON is understood. Cells marked `"editable": false` in
//! their metadata are provided scaffolding and are not part of the learner's
//! code; the cell tagged `validation` is run by the activity to produce the
//! post-run signals.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::NotebookError;
use crate::pattern::SourceLines;

pub const VALIDATION_TAG: &str = "validation";

/// nbformat stores text either as one string or as a list of line strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MultilineText {
    One(String),
    Many(Vec<String>),
}

impl Default for MultilineText {
    fn default() -> Self {
        MultilineText::One(String::new())
    }
}

impl MultilineText {
    pub fn text(&self) -> String {
        match self {
            MultilineText::One(s) => s.clone(),
            MultilineText::Many(parts) => parts.concat(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
    Raw,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editable: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum CellOutput {
    Stream {
        name: String,
        #[serde(default)]
        text: MultilineText,
    },
    Error {
        ename: String,
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
    ExecuteResult {
        #[serde(default)]
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
        #[serde(default)]
        execution_count: Option<u32>,
    },
    DisplayData {
        #[serde(default)]
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookCell {
    pub cell_type: CellType,
    #[serde(default)]
    pub source: MultilineText,
    #[serde(default)]
    pub metadata: CellMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<CellOutput>,
    /// Remaining nbformat fields (`id`, `execution_count`, ...), kept so a
    /// snapshot reproduces the cell.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotebookCell {
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            cell_type: CellType::Code,
            source: MultilineText::One(source.into()),
            metadata: CellMetadata::default(),
            outputs: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.push(tag.into());
        self
    }

    pub fn locked(mut self) -> Self {
        self.metadata.editable = Some(false);
        self
    }

    pub fn with_output(mut self, output: CellOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn is_code(&self) -> bool {
        self.cell_type == CellType::Code
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.metadata.tags.iter().any(|t| t == tag)
    }

    pub fn is_editable(&self) -> bool {
        self.metadata.editable != Some(false)
    }

    pub fn source_text(&self) -> String {
        self.source.text()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<NotebookCell>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "default_nbformat")]
    pub nbformat: u32,
    #[serde(default)]
    pub nbformat_minor: u32,
}

fn default_nbformat() -> u32 {
    4
}

impl Notebook {
    pub fn new(cells: Vec<NotebookCell>) -> Self {
        Self {
            cells,
            metadata: Map::new(),
            nbformat: 4,
            nbformat_minor: 5,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, NotebookError> {
        let notebook: Self = serde_json::from_str(json).map_err(|e| NotebookError::Malformed {
            message: e.to_string(),
        })?;
        if notebook.nbformat != 4 {
            return Err(NotebookError::Malformed {
                message: format!("unsupported nbformat {}", notebook.nbformat),
            });
        }
        Ok(notebook)
    }

    pub fn load(path: &Path) -> Result<Self, NotebookError> {
        let json = std::fs::read_to_string(path).map_err(|e| NotebookError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    /// Learner-editable code cells, excluding the validation cell.
    pub fn editable_code_cells(&self) -> impl Iterator<Item = &NotebookCell> {
        self.cells
            .iter()
            .filter(|c| c.is_code() && c.is_editable() && !c.has_tag(VALIDATION_TAG))
    }

    pub fn user_code(&self) -> SourceLines {
        let sources: Vec<String> = self
            .editable_code_cells()
            .map(NotebookCell::source_text)
            .collect();
        SourceLines::from_cells(sources.iter().map(String::as_str))
    }

    pub fn validation_cell(&self) -> Option<&NotebookCell> {
        self.cells
            .iter()
            .find(|c| c.is_code() && c.has_tag(VALIDATION_TAG))
    }

    /// Serializable snapshot for experiment records.
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Text and JSON produced by running the validation cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutput {
    /// Stream output, error name/value/traceback and `text/plain` results,
    /// newline separated.
    pub text: String,
    /// Every `application/json` payload, in output order.
    pub json: Vec<Value>,
}

impl ValidationOutput {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            json: Vec::new(),
        }
    }

    pub fn from_cell(cell: &NotebookCell) -> Self {
        let mut text = Vec::new();
        let mut json = Vec::new();

        for output in &cell.outputs {
            match output {
                CellOutput::Stream { text: t, .. } => text.push(t.text()),
                CellOutput::Error {
                    ename,
                    evalue,
                    traceback,
                } => {
                    text.push(format!("{ename}: {evalue}"));
                    text.extend(traceback.iter().cloned());
                }
                CellOutput::ExecuteResult { data, .. } | CellOutput::DisplayData { data, .. } => {
                    if let Some(plain) = data.get("text/plain") {
                        match serde_json::from_value::<MultilineText>(plain.clone()) {
                            Ok(t) => text.push(t.text()),
                            Err(_) => text.push(plain.to_string()),
                        }
                    }
                    if let Some(payload) = data.get("application/json") {
                        json.push(payload.clone());
                    }
                }
            }
        }

        Self {
            text: text.join("\n"),
            json,
        }
    }

    pub fn with_json(mut self, value: Value) -> Self {
        self.json.push(value);
        self
    }

    pub fn lines(&self) -> SourceLines {
        SourceLines::from_output(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.json.is_empty()
    }
}
