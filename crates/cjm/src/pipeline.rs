//! Forward, reverse and merge pipelines over [`crate::ports`].

use crate::ports::{LayoutPort, MarkupRepository, SceneImporter, SceneSerializer};
use crate::Result;
use cjm_core::{
    GraphModel, Markup, MergeBuilder, MergeOptions, MergeOutcome, MergeSelection, ModelOptions,
};
use cjm_render::Imported;
use serde_json::Value;

/// Markup → scene document. The markup is validated strictly first; nothing is produced for
/// invalid input.
pub fn forward(
    markup: &Markup,
    model_options: &ModelOptions,
    layout: &dyn LayoutPort,
    serializer: &dyn SceneSerializer,
) -> Result<Value> {
    let model = GraphModel::build(markup, model_options)?;
    let plan = layout.layout(&model);
    let document = serializer.serialize(&model, &plan);
    tracing::debug!(
        format = serializer.format_name(),
        procedures = model.procedures.len(),
        "converted markup"
    );
    Ok(document)
}

/// Scene document → markup. The rebuilt markup must pass the same validation as any input
/// document.
pub fn reverse(document: &Value, importer: &dyn SceneImporter) -> Result<Imported> {
    let imported = importer.import(document)?;
    imported.markup.validate()?;
    Ok(imported)
}

/// A merged, rendered document set.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedScene {
    pub document: Value,
    pub outcome: MergeOutcome,
}

impl MergedScene {
    /// Metrics payload shipped next to the scene.
    pub fn metrics_json(&self) -> Value {
        serde_json::json!({
            "metrics": self.outcome.metrics,
            "merge_nodes": self.outcome.merge_nodes,
            "elided": self.outcome.elided,
        })
    }
}

/// Loads every document of `repository`, merges the selection and renders the result.
pub fn merge(
    repository: &dyn MarkupRepository,
    selection: &MergeSelection,
    options: MergeOptions,
    model_options: &ModelOptions,
    layout: &dyn LayoutPort,
    serializer: &dyn SceneSerializer,
) -> Result<MergedScene> {
    let documents = repository.load_all()?;
    let outcome = MergeBuilder::new(&documents, options)?.build(selection)?;
    // Merged procedure graphs may still name procedures of unselected documents.
    let model = GraphModel::build_lenient(&outcome.markup, model_options)?;
    let plan = layout.layout(&model);
    let document = serializer.serialize(&model, &plan);
    tracing::debug!(
        documents = documents.len(),
        procedures = model.procedures.len(),
        merge_nodes = outcome.merge_nodes.len(),
        "rendered merged markup"
    );
    Ok(MergedScene { document, outcome })
}
