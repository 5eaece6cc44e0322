//! Approver resolution: assignments, delegation windows and fallbacks
use chrono::Utc;

use crate::calendar::TimeStamp;
use crate::error::ApprovalError;

/// One approval step in a request's configured pipeline.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    #[n(0)]
    DepartmentHead,
    #[n(1)]
    Procurement,
    #[n(2)]
    Director,
}

/// What an assignment applies to. An individual mapping always wins over a
/// department-wide one.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum AssignmentScope {
    #[n(0)]
    Employee(#[n(0)] String),
    #[n(1)]
    Department(#[n(0)] String),
}

/// Maps requests at one stage to a designated approver, optionally
/// time-boxed to support temporary delegation.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ApprovalAssignment {
    #[n(0)]
    pub approver_id: String,
    #[n(1)]
    pub stage: Stage,
    #[n(2)]
    pub scope: AssignmentScope,
    #[n(3)]
    pub delegation_start: Option<TimeStamp<Utc>>,
    #[n(4)]
    pub delegation_end: Option<TimeStamp<Utc>>,
}

impl ApprovalAssignment {
    pub fn new(approver_id: String, stage: Stage, scope: AssignmentScope) -> Self {
        Self {
            approver_id,
            stage,
            scope,
            delegation_start: None,
            delegation_end: None,
        }
    }

    pub fn with_window(mut self, start: TimeStamp<Utc>, end: TimeStamp<Utc>) -> Self {
        self.delegation_start = Some(start);
        self.delegation_end = Some(end);
        self
    }

    // an assignment with no window is always active
    fn active_at(&self, now: &TimeStamp<Utc>) -> bool {
        if let Some(start) = &self.delegation_start {
            if now < start {
                return false;
            }
        }
        if let Some(end) = &self.delegation_end {
            if now > end {
                return false;
            }
        }
        true
    }
}

/// Outcome of chain resolution for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A designated approver from an active assignment.
    Designated(String),
    /// No assignment matched; any holder of the administrative override
    /// capability may act.
    AdminOverride(Vec<String>),
}

impl Resolved {
    /// The single approver id surfaced to callers asking "who is next".
    pub fn primary(&self) -> &str {
        match self {
            Resolved::Designated(id) => id,
            Resolved::AdminOverride(ids) => &ids[0],
        }
    }

    pub fn authorizes(&self, candidate: &str) -> bool {
        match self {
            Resolved::Designated(id) => id == candidate,
            Resolved::AdminOverride(ids) => ids.iter().any(|id| id == candidate),
        }
    }
}

/// Resolve who may act on a request at `stage` as of `now`.
///
/// Resolution order, first match wins: an active individual assignment for
/// the requester, an active department-level assignment, the admin
/// override capability set. No match is a configuration error the caller
/// must surface to HR, never an auto-approval.
pub fn resolve_approver(
    assignments: &[ApprovalAssignment],
    requester_id: &str,
    department: &str,
    stage: Stage,
    now: &TimeStamp<Utc>,
    admin_override: &[String],
) -> Result<Resolved, ApprovalError> {
    let active = |a: &ApprovalAssignment| a.stage == stage && a.active_at(now);

    let individual = assignments
        .iter()
        .filter(|a| active(a))
        .find(|a| a.scope == AssignmentScope::Employee(requester_id.to_string()));
    if let Some(a) = individual {
        return Ok(Resolved::Designated(a.approver_id.clone()));
    }

    let departmental = assignments
        .iter()
        .filter(|a| active(a))
        .find(|a| a.scope == AssignmentScope::Department(department.to_string()));
    if let Some(a) = departmental {
        return Ok(Resolved::Designated(a.approver_id.clone()));
    }

    if !admin_override.is_empty() {
        return Ok(Resolved::AdminOverride(admin_override.to_vec()));
    }

    Err(ApprovalError::NoApproverConfigured)
}
