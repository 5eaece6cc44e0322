use crate::chain::Stage;
use crate::context::RequestState;
use crate::request::SignerRole;

/// Workflow-level error taxonomy. Every variant is returned as a typed
/// result to the caller; none of them is retried by the engine itself.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ApprovalError {
    #[error("start date is after end date")]
    InvalidRange,
    #[error("requested {requested} working days but only {remaining} remain")]
    InsufficientBalance { requested: u16, remaining: u16 },
    #[error("ledger adjustment would drive used days negative")]
    InvalidAdjustment,
    #[error("no approver is configured for this request's current stage")]
    NoApproverConfigured,
    #[error("caller is not the resolved approver for stage {stage:?}")]
    UnauthorizedApprover { stage: Stage },
    #[error("required signature for {role:?} is not attached")]
    MissingSignature { role: SignerRole },
    #[error("lost a compare-and-swap race on the request status")]
    ConcurrentModification,
    #[error("request is already in terminal state {state:?}")]
    Terminal { state: RequestState },
    #[error("request is not in a pending stage")]
    NotPending,
    #[error("request is not a draft")]
    NotDraft,
    #[error("only the requester may act on a draft")]
    NotOwner,
    #[error("a rejection requires a non-empty reason")]
    EmptyRejectionReason,
    #[error("no request found under id {id}")]
    UnknownRequest { id: String },
    #[error("no leave balance recorded for {employee_id} in {year}")]
    UnknownBalance { employee_id: String, year: i32 },
}

/// Details-level validation failures raised while finalising a draft.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("mandatory field `{0}` is not set")]
    MissingField(&'static str),
    #[error("a procurement request needs at least one item")]
    EmptyItems,
    #[error("item `{0}` has zero quantity")]
    ZeroQuantity(String),
    #[error("item `{0}` has zero unit price")]
    ZeroUnitPrice(String),
    #[error("estimated value does not match the sum of the items")]
    EstimatedValueMismatch,
    #[error("start date <= end date failed")]
    DateOrder,
    #[error("title must not be empty")]
    EmptyTitle,
}
