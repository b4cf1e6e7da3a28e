use model::{EffectiveCommand, RequestKind};

const NOT_FOUND_REASON: &str = "target not found; may have been removed out of band";

/// Map the declared lifecycle intent and the observed existence of the
/// target onto the command actually executed.
///
/// The mapping is total and deterministic, which is what makes duplicate or
/// drifted requests converge instead of erroring: a Create that finds its
/// target is treated as an update retry, an Update that finds nothing
/// recreates, and a Delete of an already-gone target succeeds quietly.
pub fn decide(kind: RequestKind, exists: bool) -> EffectiveCommand {
    match (kind, exists) {
        (RequestKind::Create, false) => EffectiveCommand::Create,
        (RequestKind::Create, true) => EffectiveCommand::Update,
        (RequestKind::Update, true) => EffectiveCommand::Update,
        (RequestKind::Update, false) => EffectiveCommand::Create,
        (RequestKind::Delete, true) => EffectiveCommand::Delete,
        (RequestKind::Delete, false) => EffectiveCommand::NoOp {
            reason: NOT_FOUND_REASON.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_total_and_deterministic() {
        assert_eq!(EffectiveCommand::Create, decide(RequestKind::Create, false));
        assert_eq!(EffectiveCommand::Update, decide(RequestKind::Create, true));
        assert_eq!(EffectiveCommand::Update, decide(RequestKind::Update, true));
        assert_eq!(EffectiveCommand::Create, decide(RequestKind::Update, false));
        assert_eq!(EffectiveCommand::Delete, decide(RequestKind::Delete, true));

        match decide(RequestKind::Delete, false) {
            EffectiveCommand::NoOp { reason } => {
                assert!(reason.starts_with("target not found"));
            }
            other => panic!("expected NoOp, got {other:?}"),
        }
    }
}
