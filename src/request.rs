//! Request variants, their draft builders and signatures
use chrono::Utc;

use crate::calendar::{CalendarDate, TimeStamp};
use crate::chain::Stage;
use crate::error::ValidationError;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveType {
    #[n(0)]
    Annual,
    #[n(1)]
    Sick,
    #[n(2)]
    Unpaid,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    #[n(0)]
    Goods,
    #[n(1)]
    Services,
    #[n(2)]
    Works,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    #[n(0)]
    Normal,
    #[n(1)]
    Urgent,
}

// Also used for constructing drafts; the stored record is the hash of this
// struct encoded into CBOR, so a draft edit produces a new address.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, Clone, PartialEq, Eq)]
pub struct LeaveDetails {
    #[n(0)]
    leave_type: Option<LeaveType>,
    #[n(1)]
    start_date: Option<CalendarDate>,
    #[n(2)]
    end_date: Option<CalendarDate>,
    // derived by the engine from the holiday set, never hand-set
    #[n(3)]
    working_days: Option<u16>,
    #[n(4)]
    replacement: Option<String>,
    #[n(5)]
    reason: Option<String>,
}

impl LeaveDetails {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_leave_type(mut self, leave_type: LeaveType) -> Self {
        self.leave_type = Some(leave_type);
        self
    }
    pub fn set_start_date(mut self, date: CalendarDate) -> Self {
        self.start_date = Some(date);
        self
    }
    pub fn set_end_date(mut self, date: CalendarDate) -> Self {
        self.end_date = Some(date);
        self
    }
    pub fn set_replacement(mut self, employee_id: &str) -> Self {
        self.replacement = Some(employee_id.to_string());
        self
    }
    pub fn set_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn span(&self) -> Option<(CalendarDate, CalendarDate)> {
        Some((self.start_date?, self.end_date?))
    }
    pub fn working_days(&self) -> Option<u16> {
        self.working_days
    }
    pub fn replacement(&self) -> Option<&str> {
        self.replacement.as_deref()
    }

    pub(crate) fn with_working_days(mut self, days: u16) -> Self {
        self.working_days = Some(days);
        self
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.leave_type.is_none() {
            return Err(ValidationError::MissingField("leave_type"));
        }
        let (start, end) = match (self.start_date, self.end_date) {
            (Some(s), Some(e)) => (s, e),
            (None, _) => return Err(ValidationError::MissingField("start_date")),
            (_, None) => return Err(ValidationError::MissingField("end_date")),
        };
        if start > end {
            return Err(ValidationError::DateOrder);
        }
        if self.working_days.is_none() {
            return Err(ValidationError::MissingField("working_days"));
        }
        Ok(())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ProcurementItem {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub quantity: u32,
    #[n(2)]
    pub unit: String,
    // minor currency units
    #[n(3)]
    pub unit_price: u64,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcurementDetails {
    #[n(0)]
    items: Vec<ProcurementItem>,
    // always Σ quantity × unit_price over items, re-verified at finalise
    #[n(1)]
    estimated_value: u64,
    #[n(2)]
    category: Option<Category>,
    #[n(3)]
    urgency: Option<Urgency>,
}

impl ProcurementDetails {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push_item(mut self, item: ProcurementItem) -> Self {
        self.items.push(item);
        self.estimated_value = self.recompute_value();
        self
    }
    pub fn set_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
    pub fn set_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = Some(urgency);
        self
    }

    pub fn items(&self) -> &[ProcurementItem] {
        &self.items
    }
    pub fn estimated_value(&self) -> u64 {
        self.estimated_value
    }

    fn recompute_value(&self) -> u64 {
        self.items
            .iter()
            .map(|i| u64::from(i.quantity) * i.unit_price)
            .sum()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.items.is_empty() {
            return Err(ValidationError::EmptyItems);
        }
        for item in &self.items {
            if item.quantity == 0 {
                return Err(ValidationError::ZeroQuantity(item.name.clone()));
            }
            if item.unit_price == 0 {
                return Err(ValidationError::ZeroUnitPrice(item.name.clone()));
            }
        }
        if self.estimated_value != self.recompute_value() {
            return Err(ValidationError::EstimatedValueMismatch);
        }
        if self.category.is_none() {
            return Err(ValidationError::MissingField("category"));
        }
        if self.urgency.is_none() {
            return Err(ValidationError::MissingField("urgency"));
        }
        Ok(())
    }
}

/// Free-form HR document routed through the same pipeline.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, Clone, PartialEq, Eq)]
pub struct GenericDocumentDetails {
    #[n(0)]
    title: String,
    #[n(1)]
    body: String,
}

impl GenericDocumentDetails {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
        }
    }
    pub fn title(&self) -> &str {
        &self.title
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        Ok(())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    #[n(0)]
    Leave,
    #[n(1)]
    Procurement,
    #[n(2)]
    Generic,
}

impl RequestKind {
    /// The ordered approval pipeline for this variant.
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            RequestKind::Leave | RequestKind::Generic => {
                &[Stage::DepartmentHead, Stage::Director]
            }
            RequestKind::Procurement => {
                &[Stage::DepartmentHead, Stage::Procurement, Stage::Director]
            }
        }
    }

    pub fn number_prefix(&self) -> &'static str {
        match self {
            RequestKind::Leave => "LR",
            RequestKind::Procurement => "PR",
            RequestKind::Generic => "HR",
        }
    }
}

/// Tagged union over the request variants. One state machine handles all
/// of them; the variant only decides payload, stage list and numbering.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum RequestDetails {
    #[n(0)]
    Leave(#[n(0)] LeaveDetails),
    #[n(1)]
    Procurement(#[n(0)] ProcurementDetails),
    #[n(2)]
    Generic(#[n(0)] GenericDocumentDetails),
}

impl RequestDetails {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestDetails::Leave(_) => RequestKind::Leave,
            RequestDetails::Procurement(_) => RequestKind::Procurement,
            RequestDetails::Generic(_) => RequestKind::Generic,
        }
    }

    // only leave requests carry the requester's own signature into submit
    pub fn requires_requester_signature(&self) -> bool {
        matches!(self, RequestDetails::Leave(_))
    }

    /// Checks mandatory fields and derived-field consistency, then returns
    /// the record's content address and its CBOR encoding.
    pub fn validate_and_finalise(&self) -> anyhow::Result<(String, Vec<u8>)> {
        match self {
            RequestDetails::Leave(d) => d.validate()?,
            RequestDetails::Procurement(d) => d.validate()?,
            RequestDetails::Generic(d) => d.validate()?,
        }

        let contents = minicbor::to_vec(self)?;
        let hash = sha256::digest(&contents);

        Ok((hash, contents))
    }
}

/// Which signature slot a blob fills.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerRole {
    #[n(0)]
    Requester,
    #[n(1)]
    Stage(#[n(0)] Stage),
}

/// A captured signature. The blob itself lives in the store under its
/// SHA-256, the record only carries the reference.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    #[n(0)]
    pub role: SignerRole,
    #[n(1)]
    pub signer_id: String,
    #[n(2)]
    pub signed_at: TimeStamp<Utc>,
    #[n(3)]
    pub blob_hash: String,
}
