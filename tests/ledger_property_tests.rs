//! Property-based tests for leave-balance bookkeeping
//!
//! This module uses the proptest crate to verify that LeaveBalance behavior
//! is correct across a wide range of randomly generated inputs. The ledger
//! invariant must hold after every operation of every sequence, not just
//! the hand-picked cases in the unit tests.

use leave_approval::ledger::LeaveBalance;
use proptest::prelude::*;

// PROPERTY TEST STRATEGIES

#[derive(Debug, Clone, Copy)]
enum LedgerOp {
    Debit(u16),
    Credit(u16),
}

/// Strategy to generate a single ledger operation with a small day count
fn ledger_op_strategy() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (0u16..=15).prop_map(LedgerOp::Debit),
        (0u16..=15).prop_map(LedgerOp::Credit),
    ]
}

/// Strategy to generate a sequence of 1 to 25 ledger operations
fn op_sequence_strategy() -> impl Strategy<Value = Vec<LedgerOp>> {
    prop::collection::vec(ledger_op_strategy(), 1..=25)
}

/// Strategy to generate a plausible starting balance
fn balance_strategy() -> impl Strategy<Value = LeaveBalance> {
    (10u16..=30, 0u16..=10).prop_map(|(total, carry)| LeaveBalance {
        employee_id: "emp_prop".to_string(),
        year: 2024,
        total_days: total,
        used_days: 0,
        carryover_initial: carry,
        carryover_remaining: carry,
        carryover_from_year: if carry > 0 { Some(2023) } else { None },
    })
}

fn invariant_holds(balance: &LeaveBalance) -> bool {
    let pool = balance.total_days + balance.carryover_remaining;
    // remaining is defined, non-negative, and never saturated away
    pool >= balance.used_days && balance.remaining() == pool - balance.used_days
}

// PROPERTY TESTS
proptest! {
    /// Property: the balance invariant holds after every operation of any
    /// debit/credit sequence, whether the operation succeeds or fails.
    #[test]
    fn prop_invariant_survives_any_sequence(
        start in balance_strategy(),
        ops in op_sequence_strategy()
    ) {
        let mut balance = start;
        prop_assert!(invariant_holds(&balance));

        for op in ops {
            let result = match op {
                LedgerOp::Debit(days) => balance.debit(days),
                LedgerOp::Credit(days) => balance.credit(days),
            };
            // a failed operation must leave the balance untouched,
            // a successful one must return a consistent new value
            if let Ok(next) = result {
                balance = next;
            }
            prop_assert!(invariant_holds(&balance));
        }
    }

    /// Property: a debit succeeds exactly when the days fit the remainder,
    /// and a successful debit lowers remaining by exactly that amount.
    #[test]
    fn prop_debit_is_exact_or_refused(
        start in balance_strategy(),
        days in 0u16..=50
    ) {
        let before = start.remaining();

        match start.debit(days) {
            Ok(after) => {
                prop_assert!(days <= before);
                prop_assert_eq!(after.remaining(), before - days);
            }
            Err(_) => prop_assert!(days > before),
        }
    }

    /// Property: crediting back a successful debit restores the balance
    /// field for field, including the carry-over sub-ledger.
    #[test]
    fn prop_debit_credit_round_trips(
        start in balance_strategy(),
        days in 0u16..=20
    ) {
        prop_assume!(days <= start.remaining());

        let debited = start.debit(days).unwrap();
        let restored = debited.credit(days).unwrap();

        prop_assert_eq!(restored, start);
    }

    /// Property: carry-over of any granted remainder opens a consistent
    /// next-year balance and never exceeds what was left.
    #[test]
    fn prop_carry_over_opens_a_consistent_year(
        start in balance_strategy(),
        used in 0u16..=20,
        granted in 0u16..=40,
        total_next in 15u16..=30
    ) {
        prop_assume!(used <= start.remaining());
        let year_end = start.debit(used).unwrap();

        match year_end.carry_over(total_next, granted) {
            Ok(next) => {
                prop_assert!(granted <= year_end.remaining());
                prop_assert_eq!(next.year, year_end.year + 1);
                prop_assert_eq!(next.used_days, 0);
                prop_assert_eq!(next.carryover_initial, granted);
                prop_assert_eq!(next.carryover_remaining, granted);
                prop_assert_eq!(next.carryover_from_year, Some(year_end.year));
                prop_assert_eq!(next.remaining(), total_next + granted);
            }
            Err(_) => prop_assert!(granted > year_end.remaining()),
        }
    }

    /// Property: balances survive their CBOR round trip unchanged.
    #[test]
    fn prop_balance_cbor_round_trips(start in balance_strategy(), used in 0u16..=20) {
        prop_assume!(used <= start.remaining());
        let balance = start.debit(used).unwrap();

        let encoded = minicbor::to_vec(&balance).unwrap();
        let decoded: LeaveBalance = minicbor::decode(&encoded).unwrap();

        prop_assert_eq!(balance, decoded);
    }
}
