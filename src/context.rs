//! Request context: the append-only event log and the state derived from it
use chrono::Utc;

use crate::calendar::TimeStamp;
use crate::chain::Stage;
use crate::request::{RequestKind, Signature, SignerRole};

/// The lifecycle position of a request, derived from its event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Draft,
    Pending(Stage),
    Approved,
    Rejected,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Approved | RequestState::Rejected)
    }
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct Event {
    #[n(0)]
    pub request_id: String,
    #[n(1)]
    pub actor_id: String,
    #[n(2)]
    pub timestamp: TimeStamp<Utc>,
    #[n(3)]
    pub kind: EventKind,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub enum EventKind {
    /// Draft created or edited; a fresh edit invalidates earlier signatures.
    #[n(0)]
    Draft {
        #[n(0)]
        details_hash: String,
    },
    #[n(1)]
    Sign {
        #[n(0)]
        role: SignerRole,
        #[n(1)]
        blob_hash: String,
    },
    #[n(2)]
    Submit {
        #[n(0)]
        details_hash: String,
    },
    #[n(3)]
    Approve {
        #[n(0)]
        stage: Stage,
    },
    #[n(4)]
    Reject {
        #[n(0)]
        stage: Stage,
        #[n(1)]
        reason: String,
    },
    /// Append-only audit note, the only event accepted on terminal states.
    #[n(5)]
    Note {
        #[n(0)]
        text: String,
    },
}

impl Event {
    pub fn new(
        request_id: String,
        actor_id: String,
        timestamp: TimeStamp<Utc>,
        kind: EventKind,
    ) -> Self {
        Self {
            request_id,
            actor_id,
            timestamp,
            kind,
        }
    }
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct RequestContext {
    #[n(0)]
    pub request_id: String,
    /// Human-readable, unique, assigned at creation (e.g. `LR-000042`).
    #[n(1)]
    pub request_number: String,
    #[n(2)]
    pub requester_id: String,
    #[n(3)]
    pub department: String,
    #[n(4)]
    pub kind: RequestKind,
    #[n(5)]
    pub event_set: Vec<Event>,
}

impl RequestContext {
    pub fn new(
        request_id: String,
        request_number: String,
        requester_id: String,
        department: String,
        kind: RequestKind,
    ) -> Self {
        Self {
            request_id,
            request_number,
            requester_id,
            department,
            kind,
            event_set: vec![],
        }
    }

    pub fn insert_event(&mut self, event: Event) {
        self.event_set.push(event);
    }

    /// Walk the event log and derive where the request stands. Stray
    /// events that make no sense in the current position are ignored, so
    /// the derivation never corrupts on a malformed log, and terminal
    /// states absorb everything but notes.
    pub fn current_state(&self) -> RequestState {
        let stages = self.kind.stages();
        let mut state = RequestState::Draft;
        let mut approvals = 0usize;

        for event in &self.event_set {
            match (state, &event.kind) {
                (RequestState::Draft, EventKind::Submit { .. }) => {
                    approvals = 0;
                    state = RequestState::Pending(stages[0]);
                }
                (RequestState::Pending(current), EventKind::Approve { stage })
                    if *stage == current =>
                {
                    approvals += 1;
                    state = if approvals == stages.len() {
                        RequestState::Approved
                    } else {
                        RequestState::Pending(stages[approvals])
                    };
                }
                (RequestState::Pending(current), EventKind::Reject { stage, .. })
                    if *stage == current =>
                {
                    state = RequestState::Rejected;
                }
                _ => {}
            }
        }

        state
    }

    pub fn current_stage(&self) -> Option<Stage> {
        match self.current_state() {
            RequestState::Pending(stage) => Some(stage),
            _ => None,
        }
    }

    /// Content address of the details the request currently points at.
    pub fn latest_details_hash(&self) -> Option<&str> {
        self.event_set.iter().rev().find_map(|e| match &e.kind {
            EventKind::Draft { details_hash } | EventKind::Submit { details_hash } => {
                Some(details_hash.as_str())
            }
            _ => None,
        })
    }

    // Signatures attached before the latest draft edit signed different
    // content and no longer count.
    fn signature_cut(&self) -> usize {
        self.event_set
            .iter()
            .rposition(|e| matches!(e.kind, EventKind::Draft { .. }))
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn has_signature(&self, role: SignerRole) -> bool {
        self.event_set[self.signature_cut()..]
            .iter()
            .any(|e| matches!(&e.kind, EventKind::Sign { role: r, .. } if *r == role))
    }

    /// The currently valid signature set, oldest first.
    pub fn signatures(&self) -> Vec<Signature> {
        self.event_set[self.signature_cut()..]
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Sign { role, blob_hash } => Some(Signature {
                    role: *role,
                    signer_id: e.actor_id.clone(),
                    signed_at: e.timestamp.clone(),
                    blob_hash: blob_hash.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Latest rejection reason, if the request was rejected.
    pub fn rejection_reason(&self) -> Option<&str> {
        self.event_set.iter().rev().find_map(|e| match &e.kind {
            EventKind::Reject { reason, .. } => Some(reason.as_str()),
            _ => None,
        })
    }

    pub fn history(&self) -> impl Iterator<Item = &Event> {
        self.event_set.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(request_id: &str, actor: &str, kind: EventKind) -> Event {
        Event::new(
            request_id.to_string(),
            actor.to_string(),
            TimeStamp::new(),
            kind,
        )
    }

    fn leave_context() -> RequestContext {
        RequestContext::new(
            "req_test".to_string(),
            "LR-000001".to_string(),
            "emp_alice".to_string(),
            "finance".to_string(),
            RequestKind::Leave,
        )
    }

    #[test]
    fn empty_log_is_a_draft() {
        assert_eq!(leave_context().current_state(), RequestState::Draft);
    }

    #[test]
    fn submit_enters_the_first_stage() {
        let mut ctx = leave_context();
        ctx.insert_event(event(
            "req_test",
            "emp_alice",
            EventKind::Submit {
                details_hash: "hash_abc".to_string(),
            },
        ));

        assert_eq!(
            ctx.current_state(),
            RequestState::Pending(Stage::DepartmentHead)
        );
    }

    #[test]
    fn approvals_advance_stage_by_stage() {
        let mut ctx = leave_context();
        ctx.insert_event(event(
            "req_test",
            "emp_alice",
            EventKind::Submit {
                details_hash: "hash_abc".to_string(),
            },
        ));
        ctx.insert_event(event(
            "req_test",
            "emp_head",
            EventKind::Approve {
                stage: Stage::DepartmentHead,
            },
        ));
        assert_eq!(ctx.current_state(), RequestState::Pending(Stage::Director));

        ctx.insert_event(event(
            "req_test",
            "emp_director",
            EventKind::Approve {
                stage: Stage::Director,
            },
        ));
        assert_eq!(ctx.current_state(), RequestState::Approved);
    }

    #[test]
    fn approve_for_the_wrong_stage_is_ignored() {
        let mut ctx = leave_context();
        ctx.insert_event(event(
            "req_test",
            "emp_alice",
            EventKind::Submit {
                details_hash: "hash_abc".to_string(),
            },
        ));
        // a director approval cannot skip the department head
        ctx.insert_event(event(
            "req_test",
            "emp_director",
            EventKind::Approve {
                stage: Stage::Director,
            },
        ));

        assert_eq!(
            ctx.current_state(),
            RequestState::Pending(Stage::DepartmentHead)
        );
    }

    #[test]
    fn draft_edit_invalidates_signatures() {
        let mut ctx = leave_context();
        ctx.insert_event(event(
            "req_test",
            "emp_alice",
            EventKind::Draft {
                details_hash: "hash_v1".to_string(),
            },
        ));
        ctx.insert_event(event(
            "req_test",
            "emp_alice",
            EventKind::Sign {
                role: SignerRole::Requester,
                blob_hash: "blob_1".to_string(),
            },
        ));
        assert!(ctx.has_signature(SignerRole::Requester));

        ctx.insert_event(event(
            "req_test",
            "emp_alice",
            EventKind::Draft {
                details_hash: "hash_v2".to_string(),
            },
        ));
        assert!(!ctx.has_signature(SignerRole::Requester));
        assert_eq!(ctx.latest_details_hash(), Some("hash_v2"));
    }

    #[test]
    fn terminal_states_absorb_later_events() {
        let mut ctx = leave_context();
        ctx.insert_event(event(
            "req_test",
            "emp_alice",
            EventKind::Submit {
                details_hash: "hash_abc".to_string(),
            },
        ));
        ctx.insert_event(event(
            "req_test",
            "emp_head",
            EventKind::Reject {
                stage: Stage::DepartmentHead,
                reason: "overlaps the audit week".to_string(),
            },
        ));
        assert_eq!(ctx.current_state(), RequestState::Rejected);

        ctx.insert_event(event(
            "req_test",
            "emp_head",
            EventKind::Approve {
                stage: Stage::DepartmentHead,
            },
        ));
        ctx.insert_event(event(
            "req_test",
            "emp_hr",
            EventKind::Note {
                text: "employee informed by phone".to_string(),
            },
        ));

        assert_eq!(ctx.current_state(), RequestState::Rejected);
        assert_eq!(ctx.rejection_reason(), Some("overlaps the audit week"));
    }
}
