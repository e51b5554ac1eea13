use crate::error::{Error, Result};
use crate::model::{Markup, Procedure};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Let `procedure_graph` name procedures defined by other documents. Merge inputs need
    /// this; a document converted on its own does not.
    pub allow_external_procedures: bool,
}

impl ValidateOptions {
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn merge_input() -> Self {
        Self {
            allow_external_procedures: true,
        }
    }
}

impl Markup {
    pub fn validate(&self) -> Result<()> {
        validate_markup(self, ValidateOptions::strict())
    }
}

/// Structural checks that must pass before any layout or merge work starts. The first
/// offending identifier is reported.
pub fn validate_markup(markup: &Markup, options: ValidateOptions) -> Result<()> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for procedure in &markup.procedures {
        if procedure.id.trim().is_empty() {
            return Err(Error::EmptyIdentifier {
                procedure: procedure.id.clone(),
                what: "procedure",
            });
        }
        if !seen.insert(procedure.id.as_str()) {
            return Err(Error::DuplicateProcedure {
                procedure: procedure.id.clone(),
            });
        }
        validate_procedure(procedure)?;
    }

    let Some(graph) = &markup.procedure_graph else {
        return Ok(());
    };
    for (source, targets) in graph {
        for id in std::iter::once(source).chain(targets) {
            if id.trim().is_empty() {
                return Err(Error::EmptyIdentifier {
                    procedure: source.clone(),
                    what: "procedure graph",
                });
            }
            if !options.allow_external_procedures && !seen.contains(id.as_str()) {
                return Err(Error::UnknownProcedure {
                    procedure: id.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_procedure(procedure: &Procedure) -> Result<()> {
    let empty = |what: &'static str| Error::EmptyIdentifier {
        procedure: procedure.id.clone(),
        what,
    };

    if procedure.start_block_ids.iter().any(|b| b.trim().is_empty()) {
        return Err(empty("start block"));
    }
    for (key, targets) in &procedure.branches {
        if key.trim().is_empty() || targets.iter().any(|t| t.trim().is_empty()) {
            return Err(empty("branch block"));
        }
    }
    if let Some(bg) = &procedure.block_graph {
        for (key, targets) in bg {
            if key.trim().is_empty() || targets.iter().any(|t| t.trim().is_empty()) {
                return Err(empty("block graph block"));
            }
        }
    }
    procedure.end_specs()?;

    let mut known = procedure.referenced_block_ids();
    if let Some(bg) = &procedure.block_graph {
        known.extend(bg.values().flatten().map(String::as_str));
    }
    for block in procedure.block_id_to_block_name.keys() {
        if !known.contains(block.as_str()) {
            return Err(Error::UnknownBlock {
                procedure: procedure.id.clone(),
                block: block.clone(),
            });
        }
    }
    Ok(())
}
