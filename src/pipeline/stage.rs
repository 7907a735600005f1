use serde::{Deserialize, Serialize};
use std::fmt;

/// States a statement passes through on its way to a decision.
///
/// `Authorized` and `Denied` are terminal. A denied statement is never
/// retried; submitting it again starts over at `Received`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Text accepted from the caller.
    Received,
    /// Text parsed into a single statement.
    Parsed,
    /// Tables and columns extracted.
    Analyzed,
    /// Every referenced table granted for the statement's action.
    TableChecked,
    /// Every checked column granted.
    ColumnChecked,
    /// No table is row-denied; row conditions collected.
    RowChecked,
    /// Row conditions injected into the statement.
    Rewritten,
    /// Statement may be executed.
    Authorized,
    /// A check failed.
    Denied,
}

impl PipelineStage {
    /// True for `Authorized` and `Denied`.
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Authorized | PipelineStage::Denied)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Parsed => "parsed",
            PipelineStage::Analyzed => "analyzed",
            PipelineStage::TableChecked => "table_checked",
            PipelineStage::ColumnChecked => "column_checked",
            PipelineStage::RowChecked => "row_checked",
            PipelineStage::Rewritten => "rewritten",
            PipelineStage::Authorized => "authorized",
            PipelineStage::Denied => "denied",
        };
        f.write_str(name)
    }
}
