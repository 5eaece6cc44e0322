//! Service layer API for request workflow operations
use std::sync::Arc;

use sled::transaction::{TransactionError, abort};
use sled::{Batch, Db};
use tracing::warn;

use crate::calendar::{CalendarDate, HolidaySet, TimeStamp, count_working_days};
use crate::chain::{ApprovalAssignment, Resolved, Stage, resolve_approver};
use crate::context::{Event, EventKind, RequestContext, RequestState};
use crate::error::ApprovalError;
use crate::ledger::LeaveBalance;
use crate::notify::{LogSink, NotificationSink, NotifyKind};
use crate::render::DocumentRenderer;
use crate::request::{RequestDetails, SignerRole};
use crate::utils;

const ASSIGNMENTS_KEY: &str = "assignments";
const HOLIDAYS_KEY: &str = "holidays";

fn balance_key(employee_id: &str, year: i32) -> String {
    format!("balance/{}/{}", employee_id, year)
}

/// An approver's verdict on the current stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

/// A manual, compensating ledger correction issued by HR. Terminal
/// requests are never reopened; this is the only correction path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Credit(u16),
    Debit(u16),
}

pub struct ApprovalService {
    instance: Arc<Db>,
    // capability set of principals allowed to act when no assignment matches
    admin_override: Vec<String>,
    sink: Box<dyn NotificationSink>,
}

impl ApprovalService {
    pub fn new(instance: Arc<Db>) -> Self {
        Self {
            instance,
            admin_override: vec![],
            sink: Box::new(LogSink),
        }
    }

    pub fn with_admin_override(mut self, principals: Vec<String>) -> Self {
        self.admin_override = principals;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Load a request context from the database
    fn load_context(&self, request_id: &str) -> anyhow::Result<RequestContext> {
        let stored =
            self.instance
                .get(request_id.as_bytes())?
                .ok_or(ApprovalError::UnknownRequest {
                    id: request_id.to_string(),
                })?;

        Ok(minicbor::decode(&stored)?)
    }

    fn load_details(&self, context: &RequestContext) -> anyhow::Result<RequestDetails> {
        let hash = context
            .latest_details_hash()
            .ok_or_else(|| anyhow::anyhow!("request has no details attached"))?;
        let stored = self
            .instance
            .get(hash.as_bytes())?
            .ok_or_else(|| anyhow::anyhow!("details record {} is missing from the store", hash))?;

        Ok(minicbor::decode(&stored)?)
    }

    /// Append one event and persist, compare-and-swap style: the stored
    /// log must still be exactly the one this transition was computed
    /// from, and any ledger write commits in the same transaction or not
    /// at all. A stale read loses the race instead of double-applying.
    fn commit_event(
        &self,
        current: &RequestContext,
        event: Event,
        balance: Option<&LeaveBalance>,
    ) -> anyhow::Result<RequestContext> {
        let expected = minicbor::to_vec(current)?;

        let mut next = current.clone();
        next.insert_event(event);
        let next_bytes = minicbor::to_vec(&next)?;

        let balance_entry = match balance {
            Some(b) => Some((balance_key(&b.employee_id, b.year), minicbor::to_vec(b)?)),
            None => None,
        };

        let key = next.request_id.clone();
        let result = self.instance.transaction(|tx| {
            let stored = tx.get(key.as_bytes())?;
            if stored.as_deref() != Some(expected.as_slice()) {
                return abort(ApprovalError::ConcurrentModification);
            }

            tx.insert(key.as_bytes(), next_bytes.clone())?;
            if let Some((balance_key, balance_bytes)) = &balance_entry {
                tx.insert(balance_key.as_bytes(), balance_bytes.clone())?;
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(next),
            Err(TransactionError::Abort(err)) => Err(err.into()),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    // Fire-and-forget: a sink failure must never roll back the committed
    // transition, so it is logged and swallowed here.
    fn notify_best_effort(&self, recipient_id: &str, kind: NotifyKind, request_id: &str) {
        if let Err(err) = self.sink.notify(recipient_id, kind, request_id) {
            warn!(request_id, recipient_id, error = %err, "notification sink failed");
        }
    }

    /// Create a new draft request owned by `requester_id`. Drafts may be
    /// incomplete; mandatory fields are only enforced at submit.
    pub fn create_draft(
        &self,
        details: RequestDetails,
        requester_id: String,
        department: String,
    ) -> anyhow::Result<RequestContext> {
        let details_cbor = minicbor::to_vec(&details)?;
        let details_hash = sha256::digest(&details_cbor);

        let request_id = utils::new_uuid_to_bech32("req")?;
        let sequence = self.instance.generate_id()?;
        let request_number = utils::format_request_number(details.kind().number_prefix(), sequence);

        let mut context = RequestContext::new(
            request_id.clone(),
            request_number,
            requester_id.clone(),
            department,
            details.kind(),
        );
        context.insert_event(Event::new(
            request_id,
            requester_id,
            TimeStamp::new(),
            EventKind::Draft {
                details_hash: details_hash.clone(),
            },
        ));

        // Batch insert: details record and context with its first event
        let mut batch = Batch::default();
        batch.insert(details_hash.as_bytes(), details_cbor);
        batch.insert(context.request_id.as_bytes(), minicbor::to_vec(&context)?);
        self.instance.apply_batch(batch)?;

        Ok(context)
    }

    /// Replace a draft's details. Owner-only; any signatures collected on
    /// the previous content stop counting.
    pub fn update_draft(
        &self,
        request_id: String,
        details: RequestDetails,
        actor_id: String,
    ) -> anyhow::Result<RequestContext> {
        let context = self.load_context(&request_id)?;
        self.ensure_draft_owned_by(&context, &actor_id)?;

        let details_cbor = minicbor::to_vec(&details)?;
        let details_hash = sha256::digest(&details_cbor);

        // content-addressed, so inserting the record ahead of the commit
        // is idempotent and leaves no dangling state on a lost race
        self.instance.insert(details_hash.as_bytes(), details_cbor)?;

        let event = Event::new(
            request_id,
            actor_id,
            TimeStamp::new(),
            EventKind::Draft { details_hash },
        );
        self.commit_event(&context, event, None)
    }

    /// Delete a draft. Owner-only, synchronous, no side effects. Submitted
    /// requests have no user-initiated cancellation path; only the current
    /// stage's approver can end them early by rejecting.
    pub fn delete_draft(&self, request_id: &str, actor_id: &str) -> anyhow::Result<()> {
        let context = self.load_context(request_id)?;
        self.ensure_draft_owned_by(&context, actor_id)?;

        self.instance.remove(request_id.as_bytes())?;
        Ok(())
    }

    fn ensure_draft_owned_by(
        &self,
        context: &RequestContext,
        actor_id: &str,
    ) -> anyhow::Result<()> {
        if context.current_state() != RequestState::Draft {
            return Err(ApprovalError::NotDraft.into());
        }
        if context.requester_id != actor_id {
            return Err(ApprovalError::NotOwner.into());
        }
        Ok(())
    }

    /// Attach a signature blob for one of the request's signature slots.
    /// The requester signs their own draft; stage approvers sign while the
    /// request is pending at their stage.
    pub fn attach_signature(
        &self,
        request_id: String,
        role: SignerRole,
        signer_id: String,
        blob: &[u8],
    ) -> anyhow::Result<RequestContext> {
        let context = self.load_context(&request_id)?;

        match role {
            SignerRole::Requester => {
                self.ensure_draft_owned_by(&context, &signer_id)?;
            }
            SignerRole::Stage(stage) => {
                match context.current_state() {
                    RequestState::Pending(current) if current == stage => {}
                    state if state.is_terminal() => {
                        return Err(ApprovalError::Terminal { state }.into());
                    }
                    _ => return Err(ApprovalError::NotPending.into()),
                }
                let resolved = self.resolve_stage_approver(&context, stage)?;
                if !resolved.authorizes(&signer_id) {
                    return Err(ApprovalError::UnauthorizedApprover { stage }.into());
                }
            }
        }

        let blob_hash = sha256::digest(blob);
        self.instance.insert(blob_hash.as_bytes(), blob)?;

        let event = Event::new(
            request_id,
            signer_id,
            TimeStamp::new(),
            EventKind::Sign { role, blob_hash },
        );
        self.commit_event(&context, event, None)
    }

    /// Submit a draft into its first pending stage. Validates mandatory
    /// fields, recomputes the derived fields, requires the requester's
    /// signature on leave requests, and pre-checks the leave balance
    /// without committing any debit. The debit happens only on final
    /// approval.
    pub fn submit_request(
        &self,
        request_id: String,
        actor_id: String,
    ) -> anyhow::Result<RequestContext> {
        let context = self.load_context(&request_id)?;
        self.ensure_draft_owned_by(&context, &actor_id)?;

        let details = self.load_details(&context)?;

        // derived fields are the engine's to compute, never the caller's
        let details = match details {
            RequestDetails::Leave(leave) => {
                let leave = match leave.span() {
                    Some((start, end)) => {
                        let holidays = self.holidays()?;
                        let days = count_working_days(start, end, &holidays)?;
                        leave.with_working_days(days)
                    }
                    // finalise below reports the missing dates
                    None => leave,
                };
                RequestDetails::Leave(leave)
            }
            other => other,
        };

        let (details_hash, details_cbor) = details.validate_and_finalise()?;

        if details.requires_requester_signature() && !context.has_signature(SignerRole::Requester)
        {
            return Err(ApprovalError::MissingSignature {
                role: SignerRole::Requester,
            }
            .into());
        }

        if let RequestDetails::Leave(leave) = &details {
            // finalise guarantees both are set
            if let (Some((start, _)), Some(days)) = (leave.span(), leave.working_days()) {
                let balance = self.get_balance(&context.requester_id, start.year())?;
                if days > balance.remaining() {
                    return Err(ApprovalError::InsufficientBalance {
                        requested: days,
                        remaining: balance.remaining(),
                    }
                    .into());
                }
            }
        }

        self.instance.insert(details_hash.as_bytes(), details_cbor)?;

        let event = Event::new(
            request_id,
            actor_id,
            TimeStamp::new(),
            EventKind::Submit { details_hash },
        );
        self.commit_event(&context, event, None)
    }

    /// Create and submit in one call, for flows without a draft step. The
    /// signature blob, when given, is attached for the requester before
    /// submission.
    pub fn submit_direct(
        &self,
        details: RequestDetails,
        requester_id: String,
        department: String,
        signature: Option<&[u8]>,
    ) -> anyhow::Result<RequestContext> {
        let context = self.create_draft(details, requester_id.clone(), department)?;

        if let Some(blob) = signature {
            self.attach_signature(
                context.request_id.clone(),
                SignerRole::Requester,
                requester_id.clone(),
                blob,
            )?;
        }

        self.submit_request(context.request_id, requester_id)
    }

    /// Record an approver's decision on the request's current stage.
    ///
    /// Approving the final stage commits the Approved state together with
    /// the leave-ledger debit in one transaction; approving earlier stages
    /// advances the pipeline with no ledger effect. Rejection is terminal
    /// from any stage and requires a reason.
    pub fn decide(
        &self,
        request_id: String,
        approver_id: String,
        decision: Decision,
    ) -> anyhow::Result<RequestContext> {
        let context = self.load_context(&request_id)?;

        let stage = match context.current_state() {
            RequestState::Pending(stage) => stage,
            state if state.is_terminal() => {
                return Err(ApprovalError::Terminal { state }.into());
            }
            _ => return Err(ApprovalError::NotPending.into()),
        };

        let resolved = self.resolve_stage_approver(&context, stage)?;
        if !resolved.authorizes(&approver_id) {
            return Err(ApprovalError::UnauthorizedApprover { stage }.into());
        }

        if !context.has_signature(SignerRole::Stage(stage)) {
            return Err(ApprovalError::MissingSignature {
                role: SignerRole::Stage(stage),
            }
            .into());
        }

        match decision {
            Decision::Reject { reason } => {
                if reason.trim().is_empty() {
                    return Err(ApprovalError::EmptyRejectionReason.into());
                }

                let event = Event::new(
                    request_id.clone(),
                    approver_id,
                    TimeStamp::new(),
                    EventKind::Reject { stage, reason },
                );
                let next = self.commit_event(&context, event, None)?;

                self.notify_best_effort(&next.requester_id, NotifyKind::Rejected, &request_id);
                Ok(next)
            }
            Decision::Approve => {
                let final_stage = context.kind.stages().last() == Some(&stage);

                // the debit rides in the same transaction as the terminal
                // transition, so they commit together or not at all
                let debited = if final_stage {
                    self.final_approval_debit(&context)?
                } else {
                    None
                };

                let event = Event::new(
                    request_id.clone(),
                    approver_id,
                    TimeStamp::new(),
                    EventKind::Approve { stage },
                );
                let next = self.commit_event(&context, event, debited.as_ref())?;

                if final_stage {
                    self.notify_best_effort(&next.requester_id, NotifyKind::Approved, &request_id);
                }
                Ok(next)
            }
        }
    }

    // A leave request entering Approved debits its working days; other
    // variants have no ledger effect.
    fn final_approval_debit(
        &self,
        context: &RequestContext,
    ) -> anyhow::Result<Option<LeaveBalance>> {
        let details = self.load_details(context)?;
        let RequestDetails::Leave(leave) = details else {
            return Ok(None);
        };

        let (start, _) = leave
            .span()
            .ok_or_else(|| anyhow::anyhow!("submitted leave request lost its dates"))?;
        let days = leave
            .working_days()
            .ok_or_else(|| anyhow::anyhow!("submitted leave request lost its working days"))?;

        let balance = self.get_balance(&context.requester_id, start.year())?;
        Ok(Some(balance.debit(days)?))
    }

    fn resolve_stage_approver(
        &self,
        context: &RequestContext,
        stage: Stage,
    ) -> anyhow::Result<Resolved> {
        let assignments = self.assignments()?;
        let resolved = resolve_approver(
            &assignments,
            &context.requester_id,
            &context.department,
            stage,
            &TimeStamp::new(),
            &self.admin_override,
        )?;
        Ok(resolved)
    }

    /// Who may act on the request next, as of now.
    pub fn get_approval_chain(&self, request_id: &str) -> anyhow::Result<String> {
        let context = self.load_context(request_id)?;
        let stage = context.current_stage().ok_or(ApprovalError::NotPending)?;

        let resolved = self.resolve_stage_approver(&context, stage)?;
        Ok(resolved.primary().to_string())
    }

    /// Append an audit note. Allowed in every state, including terminals.
    pub fn append_note(
        &self,
        request_id: String,
        author_id: String,
        text: String,
    ) -> anyhow::Result<RequestContext> {
        let context = self.load_context(&request_id)?;

        let event = Event::new(
            request_id,
            author_id,
            TimeStamp::new(),
            EventKind::Note { text },
        );
        self.commit_event(&context, event, None)
    }

    pub fn load_request(&self, request_id: &str) -> anyhow::Result<RequestContext> {
        self.load_context(request_id)
    }

    /// Render the durable document snapshot for a request by delegating to
    /// the external renderer. The bytes are returned, never persisted.
    pub fn render_document(
        &self,
        request_id: &str,
        renderer: &dyn DocumentRenderer,
    ) -> anyhow::Result<Vec<u8>> {
        let context = self.load_context(request_id)?;
        let details = self.load_details(&context)?;
        let signatures = context.signatures();

        renderer.render(&context, &details, &signatures)
    }

    pub fn get_balance(&self, employee_id: &str, year: i32) -> anyhow::Result<LeaveBalance> {
        let stored = self
            .instance
            .get(balance_key(employee_id, year).as_bytes())?
            .ok_or_else(|| ApprovalError::UnknownBalance {
                employee_id: employee_id.to_string(),
                year,
            })?;

        Ok(minicbor::decode(&stored)?)
    }

    /// Record an employee's balance for a fiscal year (year rollover or
    /// first leave grant).
    pub fn grant_balance(&self, balance: &LeaveBalance) -> anyhow::Result<()> {
        self.instance.insert(
            balance_key(&balance.employee_id, balance.year).as_bytes(),
            minicbor::to_vec(balance)?,
        )?;
        Ok(())
    }

    /// Manual HR correction of a balance, e.g. compensating for a request
    /// approved in error. There is no state reopen.
    pub fn adjust_balance(
        &self,
        employee_id: &str,
        year: i32,
        adjustment: Adjustment,
    ) -> anyhow::Result<LeaveBalance> {
        let balance = self.get_balance(employee_id, year)?;
        let adjusted = match adjustment {
            Adjustment::Credit(days) => balance.credit(days)?,
            Adjustment::Debit(days) => balance.debit(days)?,
        };

        self.grant_balance(&adjusted)?;
        Ok(adjusted)
    }

    /// Open the next fiscal year's balance from this year's remainder. The
    /// superseded record stays in place.
    pub fn carry_over_balance(
        &self,
        employee_id: &str,
        from_year: i32,
        total_next_year: u16,
        days: u16,
    ) -> anyhow::Result<LeaveBalance> {
        let balance = self.get_balance(employee_id, from_year)?;
        let next = balance.carry_over(total_next_year, days)?;

        self.grant_balance(&next)?;
        Ok(next)
    }

    pub fn add_assignment(&self, assignment: ApprovalAssignment) -> anyhow::Result<()> {
        let mut assignments = self.assignments()?;
        assignments.push(assignment);
        self.instance
            .insert(ASSIGNMENTS_KEY, minicbor::to_vec(&assignments)?)?;
        Ok(())
    }

    pub fn assignments(&self) -> anyhow::Result<Vec<ApprovalAssignment>> {
        match self.instance.get(ASSIGNMENTS_KEY)? {
            Some(stored) => Ok(minicbor::decode(&stored)?),
            None => Ok(vec![]),
        }
    }

    pub fn add_holiday(&self, date: CalendarDate) -> anyhow::Result<()> {
        let mut dates = self.holiday_list()?;
        if !dates.contains(&date) {
            dates.push(date);
        }
        self.instance
            .insert(HOLIDAYS_KEY, minicbor::to_vec(&dates)?)?;
        Ok(())
    }

    pub fn remove_holiday(&self, date: CalendarDate) -> anyhow::Result<()> {
        let dates: Vec<CalendarDate> = self
            .holiday_list()?
            .into_iter()
            .filter(|d| *d != date)
            .collect();
        self.instance
            .insert(HOLIDAYS_KEY, minicbor::to_vec(&dates)?)?;
        Ok(())
    }

    pub fn holidays(&self) -> anyhow::Result<HolidaySet> {
        Ok(self.holiday_list()?.into_iter().collect())
    }

    fn holiday_list(&self) -> anyhow::Result<Vec<CalendarDate>> {
        match self.instance.get(HOLIDAYS_KEY)? {
            Some(stored) => Ok(minicbor::decode(&stored)?),
            None => Ok(vec![]),
        }
    }
}
