//! Stack status sets deciding when a wait is over, per lifecycle command.
//!
//! `DELETE_COMPLETE` appears both as a delete success and a create failure:
//! a stack created with `OnFailure=DELETE` vanishes when its creation fails.

use model::RequestKind;

const CREATE_SUCCESS: &[&str] = &["CREATE_COMPLETE"];
const UPDATE_SUCCESS: &[&str] = &["CREATE_COMPLETE", "UPDATE_COMPLETE"];
const DELETE_SUCCESS: &[&str] = &["DELETE_COMPLETE"];

const CREATE_FAILURE: &[&str] = &[
    "CREATE_FAILED",
    "DELETE_FAILED",
    "UPDATE_FAILED",
    "ROLLBACK_FAILED",
    "DELETE_COMPLETE",
    "ROLLBACK_COMPLETE",
];
const UPDATE_FAILURE: &[&str] = &[
    "CREATE_FAILED",
    "DELETE_FAILED",
    "UPDATE_FAILED",
    "ROLLBACK_COMPLETE",
    "UPDATE_ROLLBACK_COMPLETE",
];
const DELETE_FAILURE: &[&str] = &["DELETE_FAILED"];

pub fn success_states(kind: RequestKind) -> &'static [&'static str] {
    match kind {
        RequestKind::Create => CREATE_SUCCESS,
        RequestKind::Update => UPDATE_SUCCESS,
        RequestKind::Delete => DELETE_SUCCESS,
    }
}

pub fn failure_states(kind: RequestKind) -> &'static [&'static str] {
    match kind {
        RequestKind::Create => CREATE_FAILURE,
        RequestKind::Update => UPDATE_FAILURE,
        RequestKind::Delete => DELETE_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_complete_succeeds_a_delete_but_fails_a_create() {
        assert!(success_states(RequestKind::Delete).contains(&"DELETE_COMPLETE"));
        assert!(failure_states(RequestKind::Create).contains(&"DELETE_COMPLETE"));
        assert!(!failure_states(RequestKind::Update).contains(&"DELETE_COMPLETE"));
    }
}
