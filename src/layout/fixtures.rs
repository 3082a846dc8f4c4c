//! Snapshots shared by the unit tests of the layout stages.

use crate::ir::{Snapshot, Symbol};

/// `D0 <- O1(D1, None, D2, dim=D3)` with `O1` and its inputs inside container `C`.
pub(crate) fn scenario_a() -> Snapshot {
    let mut snapshot = Snapshot::new("D0");
    snapshot.insert("D0", Symbol::data(None, Some("O1"), 0));
    snapshot.insert(
        "O1",
        Symbol::op(Some("C"), &[Some("D1"), None, Some("D2")], &[("dim", "D3")]),
    );
    for id in ["D1", "D2", "D3"] {
        snapshot.insert(id, Symbol::data(Some("C"), None, 0));
    }
    snapshot.insert("C", Symbol::container(None, &["O1", "D1", "D2", "D3"], -1));
    snapshot
}

/// Two iterations `C1` (step 0) and `C2` (step 1); `D2` flows from the first into `O2`
/// in the second.
pub(crate) fn scenario_b() -> Snapshot {
    let mut snapshot = Snapshot::new("D3");
    snapshot.insert("D3", Symbol::data(Some("C2"), Some("O2"), 0));
    snapshot.insert("O2", Symbol::op(Some("C2"), &[Some("D2")], &[]));
    snapshot.insert("D2", Symbol::data(Some("C1"), Some("O1"), 0));
    snapshot.insert("O1", Symbol::op(Some("C1"), &[Some("D1")], &[]));
    snapshot.insert("D1", Symbol::data(Some("C1"), None, 0));
    snapshot.insert("C1", Symbol::container(None, &["O1", "D1", "D2"], 0));
    snapshot.insert("C2", Symbol::container(None, &["O2", "D3"], 1));
    snapshot
}

/// A two-step recurrence `H0 -> A0 -> H1 -> A1 -> H2` in iterations `T0` and `T1`. The
/// initial state `H0` and the weight `W` have no container; `W` feeds both steps.
pub(crate) fn shared_inputs() -> Snapshot {
    let mut snapshot = Snapshot::new("H2");
    snapshot.insert("W", Symbol::data(None, None, 0));
    snapshot.insert("H0", Symbol::data(None, None, 0));
    snapshot.insert("A0", Symbol::op(Some("T0"), &[Some("H0"), Some("W")], &[]));
    snapshot.insert("H1", Symbol::data(Some("T0"), Some("A0"), 0));
    snapshot.insert("A1", Symbol::op(Some("T1"), &[Some("H1"), Some("W")], &[]));
    snapshot.insert("H2", Symbol::data(Some("T1"), Some("A1"), 0));
    snapshot.insert("T0", Symbol::container(None, &["A0", "H1"], 0));
    snapshot.insert("T1", Symbol::container(None, &["A1", "H2"], 1));
    snapshot
}
