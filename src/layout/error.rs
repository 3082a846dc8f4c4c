use thiserror::Error;

use crate::ir::{PortId, SymbolId};

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("head symbol `{0}` is not in the symbol table")]
    MissingHead(SymbolId),
    #[error("head symbol `{id}` is a {kind}; expected a graphop or graphdata")]
    InvalidHead { id: SymbolId, kind: String },
    #[error("layout engine rejected the root scope")]
    RootRejected(#[source] EngineError),
}

/// Why a layout engine refused to lay out one scope.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("edge {edge} in scope `{scope}` references unknown port `{port}`")]
    DanglingPort {
        scope: String,
        edge: usize,
        port: PortId,
    },
    #[error("scope `{scope}` rejected: {reason}")]
    Rejected { scope: String, reason: String },
}
