//! Metadata embedded in every scene element.
//!
//! The payload is what makes a scene importable again: it names the procedure, block and
//! edge an element stands for, independent of where a user dragged it. Excalidraw stores it
//! under `customData.cjm`, Unidraw under a top-level `cjm` key.

use cjm_core::model::{Adjacency, EndType, ExternalId, Markup, ProcedureMeta};
use cjm_core::EdgeKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SCHEMA_VERSION: &str = "1.0";
pub const METADATA_KEY: &str = "cjm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    DiagramTitle,
    Frame,
    Block,
    BlockLabel,
    StartMarker,
    EndMarker,
    MarkerLabel,
    Edge,
    /// Dashed rule between two procedure components.
    Separator,
    ScenarioPanel,
    ScenarioTitle,
    /// Cycle count line, only on cyclic components.
    ScenarioCycle,
    ScenarioBody,
    ScenarioProceduresPanel,
    ScenarioProcedures,
}

impl Role {
    /// Drawn around the procedures without standing for any part of the markup.
    pub fn is_decoration(self) -> bool {
        matches!(
            self,
            Self::Separator
                | Self::ScenarioPanel
                | Self::ScenarioTitle
                | Self::ScenarioCycle
                | Self::ScenarioBody
                | Self::ScenarioProceduresPanel
                | Self::ScenarioProcedures
        )
    }
}

/// Document-level fields repeated on every element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub markup_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finedog_unit_id: Option<ExternalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<ExternalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
}

impl DocumentMeta {
    pub fn from_markup(markup: &Markup) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            markup_type: markup.markup_type.clone(),
            finedog_unit_id: markup.finedog_unit_id.clone(),
            service_name: markup.service_name.clone(),
            team_id: markup.team_id.clone(),
            team_name: markup.team_name.clone(),
        }
    }
}

/// Closed metadata record. Which optional fields are set depends on [`Role`]; unknown
/// fields in imported scenes are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementMeta {
    #[serde(flatten)]
    pub document: DocumentMeta,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_name: Option<String>,
    /// Declared end type of the block a block/label element stands for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_block_type: Option<EndType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<EdgeKind>,
    /// End type of an end marker, or of the marker an end connector points at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_type: Option<EndType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_procedure_id: Option<String>,
    /// Synthesized connector (implicit end, turn-out); skipped on import.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub implicit: bool,
    /// Branches a block graph superseded; only on frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Adjacency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_meta: Option<ProcedureMeta>,
    /// Only on the diagram title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finedog_unit_meta: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_procedure_graph: bool,
    /// 1-based component number of a summary panel element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator_index: Option<usize>,
}

impl ElementMeta {
    pub fn new(document: &DocumentMeta, role: Role) -> Self {
        Self {
            document: document.clone(),
            role,
            procedure_id: None,
            procedure_name: None,
            block_id: None,
            block_name: None,
            end_block_type: None,
            edge_type: None,
            end_type: None,
            source_block_id: None,
            target_block_id: None,
            target_procedure_id: None,
            implicit: false,
            branches: None,
            procedure_meta: None,
            finedog_unit_meta: None,
            has_procedure_graph: false,
            scenario_index: None,
            separator_index: None,
        }
    }

    pub fn in_procedure(document: &DocumentMeta, role: Role, procedure_id: &str) -> Self {
        Self {
            procedure_id: Some(procedure_id.to_string()),
            ..Self::new(document, role)
        }
    }

    pub fn to_value(&self) -> Value {
        // Plain strings, numbers and maps only; serialization cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Best-effort read of an embedded payload. `None` when the value is not an object or
    /// carries no usable `role`.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    pub fn is_current_schema(&self) -> bool {
        self.document.schema_version.is_empty() || self.document.schema_version == SCHEMA_VERSION
    }
}
