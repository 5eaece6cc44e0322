//! Leave-day balance bookkeeping
use crate::error::ApprovalError;

/// Per-employee, per-fiscal-year leave balance. Mutated only through the
/// ledger operations below, each of which returns a fresh value; the
/// service persists it together with the transition that caused it.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LeaveBalance {
    #[n(0)]
    pub employee_id: String,
    #[n(1)]
    pub year: i32,
    #[n(2)]
    pub total_days: u16,
    #[n(3)]
    pub used_days: u16,
    #[n(4)]
    pub carryover_initial: u16,
    #[n(5)]
    pub carryover_remaining: u16,
    #[n(6)]
    pub carryover_from_year: Option<i32>,
}

impl LeaveBalance {
    pub fn new(employee_id: String, year: i32, total_days: u16) -> Self {
        Self {
            employee_id,
            year,
            total_days,
            used_days: 0,
            carryover_initial: 0,
            carryover_remaining: 0,
            carryover_from_year: None,
        }
    }

    /// `remaining = total + carryover_remaining - used`, never negative.
    pub fn remaining(&self) -> u16 {
        (self.total_days + self.carryover_remaining).saturating_sub(self.used_days)
    }

    /// Take `days` out of the balance. Carry-over is consumed before the
    /// current-year grant so unused carry-over is what lapses at year end.
    pub fn debit(&self, days: u16) -> Result<Self, ApprovalError> {
        let remaining = self.remaining();
        if days > remaining {
            return Err(ApprovalError::InsufficientBalance {
                requested: days,
                remaining,
            });
        }

        let from_carryover = days.min(self.carryover_remaining);
        let mut next = self.clone();
        next.carryover_remaining -= from_carryover;
        next.used_days += days - from_carryover;

        Ok(next)
    }

    /// Give `days` back, reversing debits in the opposite order: the
    /// current-year grant is restored first, then carry-over. Crediting
    /// more than was ever consumed fails.
    pub fn credit(&self, days: u16) -> Result<Self, ApprovalError> {
        let to_used = days.min(self.used_days);
        let to_carryover = days - to_used;

        if to_carryover > self.carryover_initial - self.carryover_remaining {
            return Err(ApprovalError::InvalidAdjustment);
        }

        let mut next = self.clone();
        next.used_days -= to_used;
        next.carryover_remaining += to_carryover;

        Ok(next)
    }

    /// Open the next fiscal year's balance, granting `days` of this year's
    /// unused allowance as its carry-over. The current record is left as is
    /// and is only superseded, never deleted.
    pub fn carry_over(&self, total_next_year: u16, days: u16) -> Result<Self, ApprovalError> {
        if days > self.remaining() {
            return Err(ApprovalError::InvalidAdjustment);
        }

        Ok(Self {
            employee_id: self.employee_id.clone(),
            year: self.year + 1,
            total_days: total_next_year,
            used_days: 0,
            carryover_initial: days,
            carryover_remaining: days,
            carryover_from_year: Some(self.year),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(total: u16, used: u16, carry: u16) -> LeaveBalance {
        LeaveBalance {
            employee_id: "emp_test".to_string(),
            year: 2024,
            total_days: total,
            used_days: used,
            carryover_initial: carry,
            carryover_remaining: carry,
            carryover_from_year: if carry > 0 { Some(2023) } else { None },
        }
    }

    #[test]
    fn debit_reduces_remaining_by_exactly_the_days() {
        let b = balance(21, 5, 0);
        assert_eq!(b.remaining(), 16);

        let b = b.debit(3).unwrap();
        assert_eq!(b.used_days, 8);
        assert_eq!(b.remaining(), 13);
    }

    #[test]
    fn debit_consumes_carryover_first() {
        let b = balance(21, 0, 2);

        let b = b.debit(3).unwrap();
        assert_eq!(b.carryover_remaining, 0);
        assert_eq!(b.used_days, 1);
        assert_eq!(b.remaining(), 20);
    }

    #[test]
    fn debit_beyond_remaining_fails() {
        let b = balance(21, 5, 0);

        let err = b.debit(17).unwrap_err();
        assert_eq!(
            err,
            ApprovalError::InsufficientBalance {
                requested: 17,
                remaining: 16
            }
        );
    }

    #[test]
    fn credit_round_trips_a_debit() {
        let b = balance(21, 0, 2);
        let debited = b.debit(3).unwrap();

        let restored = debited.credit(3).unwrap();
        assert_eq!(restored, b);
    }

    #[test]
    fn over_credit_fails() {
        let b = balance(21, 1, 0);
        assert_eq!(b.credit(2).unwrap_err(), ApprovalError::InvalidAdjustment);
    }

    #[test]
    fn carry_over_opens_next_year() {
        let b = balance(21, 16, 0);

        let next = b.carry_over(21, 5).unwrap();
        assert_eq!(next.year, 2025);
        assert_eq!(next.total_days, 21);
        assert_eq!(next.carryover_initial, 5);
        assert_eq!(next.carryover_remaining, 5);
        assert_eq!(next.carryover_from_year, Some(2024));
        assert_eq!(next.remaining(), 26);
    }

    #[test]
    fn carry_over_cannot_exceed_remaining() {
        let b = balance(21, 16, 0);
        assert_eq!(
            b.carry_over(21, 6).unwrap_err(),
            ApprovalError::InvalidAdjustment
        );
    }
}
