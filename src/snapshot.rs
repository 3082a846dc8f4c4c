use std::path::Path;

use thiserror::Error;

use crate::ir::Snapshot;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid snapshot document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("snapshot does not name a head symbol")]
    MissingHead,
}

/// Parses a snapshot document: `{ "head", "revision"?, "symbolTable", "expansion"? }`.
pub fn parse_snapshot(text: &str) -> Result<Snapshot, SnapshotError> {
    let snapshot: Snapshot = serde_json::from_str(text)?;
    if snapshot.head.is_empty() {
        return Err(SnapshotError::MissingHead);
    }
    Ok(snapshot)
}

pub fn load_snapshot(path: &Path) -> Result<Snapshot, SnapshotError> {
    let text = std::fs::read_to_string(path)?;
    parse_snapshot(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SymbolKind;

    #[test]
    fn reads_camel_case_documents() {
        let snapshot = parse_snapshot(
            r#"{
                "head": "D0",
                "revision": 7,
                "symbolTable": {
                    "D0": {"type": "graphdata", "str": "tensor", "data": {"viewer": {"creatorop": null, "creatorpos": 0, "container": null}}}
                },
                "expansion": {"C": true}
            }"#,
        )
        .unwrap();
        assert_eq!(snapshot.revision, 7);
        assert!(snapshot.is_expanded("C", false));
        assert!(matches!(
            snapshot.symbol_table["D0"].kind,
            SymbolKind::Data { .. }
        ));
    }

    #[test]
    fn empty_heads_are_rejected() {
        let err = parse_snapshot(r#"{"head": "", "symbolTable": {}}"#).unwrap_err();
        assert!(matches!(err, SnapshotError::MissingHead));
    }

    #[test]
    fn malformed_documents_report_parse_errors() {
        let err = parse_snapshot("{\"head\": 3}").unwrap_err();
        assert!(matches!(err, SnapshotError::Parse(_)));
    }
}
