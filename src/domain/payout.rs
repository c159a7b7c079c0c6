//! Payout requests and the never-overdrawn invariant.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::error::PropdeskError;
use super::ids::{AccountId, PayoutId};

string_enum! {
    pub enum PayoutStatus ("request_status") {
        Pending => "pending",
        Approved => "approved",
        Declined => "declined",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payout {
    pub id: PayoutId,
    pub account_id: AccountId,
    pub payout_number: i64,
    pub requested_date: NaiveDate,
    pub received_date: Option<NaiveDate>,
    pub amount_requested: Decimal,
    pub amount_paid: Option<Decimal>,
    pub status: PayoutStatus,
    pub notes: Option<String>,
}

impl Payout {
    pub fn fully_paid(&self) -> bool {
        self.amount_paid == Some(self.amount_requested)
    }

    /// Received date when known, else the request date.
    pub fn effective_date(&self) -> NaiveDate {
        self.received_date.unwrap_or(self.requested_date)
    }

    pub fn days_to_receive(&self) -> Option<i64> {
        self.received_date
            .map(|received| (received - self.requested_date).num_days())
    }

    fn ensure_pending(&self) -> Result<(), PropdeskError> {
        if self.status != PayoutStatus::Pending {
            return Err(PropdeskError::validation(
                "request_status",
                format!("payout #{} is already {}", self.payout_number, self.status),
            ));
        }
        Ok(())
    }

    /// Move a pending payout to approved. The balance check is done
    /// separately by [`check_approval`] against fresh ledger figures.
    pub fn approve(
        &mut self,
        amount_paid: Decimal,
        received_date: Option<NaiveDate>,
    ) -> Result<(), PropdeskError> {
        self.ensure_pending()?;
        validate_amount("amount_paid", amount_paid)?;
        if let Some(received) = received_date {
            if received < self.requested_date {
                return Err(PropdeskError::validation(
                    "received_date",
                    "must not be before requested date",
                ));
            }
        }
        self.status = PayoutStatus::Approved;
        self.amount_paid = Some(amount_paid);
        self.received_date = received_date;
        Ok(())
    }

    pub fn decline(&mut self) -> Result<(), PropdeskError> {
        self.ensure_pending()?;
        self.status = PayoutStatus::Declined;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayout {
    pub amount_requested: Decimal,
    pub requested_date: NaiveDate,
    pub notes: Option<String>,
}

impl NewPayout {
    pub fn validate(&self) -> Result<(), PropdeskError> {
        validate_amount("amount_requested", self.amount_requested)
    }
}

fn validate_amount(field: &str, amount: Decimal) -> Result<(), PropdeskError> {
    if amount <= Decimal::ZERO {
        return Err(PropdeskError::validation(field, "must be greater than 0"));
    }
    Ok(())
}

/// `max(existing) + 1`, or 1 for the first payout.
pub fn next_payout_number(existing: &[i64]) -> i64 {
    existing.iter().copied().max().unwrap_or(0) + 1
}

/// Most recent approved payout: latest received date, then latest request.
/// Approved payouts with no received date rank after those with one.
pub fn last_approved(payouts: &[Payout]) -> Option<&Payout> {
    payouts
        .iter()
        .filter(|p| p.status == PayoutStatus::Approved)
        .max_by_key(|p| {
            (
                p.received_date.is_some(),
                p.received_date,
                p.requested_date,
                p.payout_number,
            )
        })
}

/// Ledger figures read fresh at approval time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApprovalContext {
    pub initial_balance: Decimal,
    pub trades_pnl: Decimal,
    /// Paid amounts of approved payouts other than the one being approved.
    pub other_paid: Decimal,
}

impl ApprovalContext {
    pub fn available_balance(&self) -> Decimal {
        self.initial_balance + self.trades_pnl - self.other_paid
    }
}

/// Reject `amount_paid` above the available balance. Equality is allowed.
pub fn check_approval(ctx: &ApprovalContext, amount_paid: Decimal) -> Result<(), PropdeskError> {
    let available = ctx.available_balance();
    if amount_paid > available {
        return Err(PropdeskError::validation(
            "amount_paid",
            format!("cannot exceed available balance of {available}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pending() -> Payout {
        Payout {
            id: PayoutId(1),
            account_id: AccountId(1),
            payout_number: 2,
            requested_date: date(2025, 3, 1),
            received_date: None,
            amount_requested: dec!(600),
            amount_paid: None,
            status: PayoutStatus::Pending,
            notes: None,
        }
    }

    #[test]
    fn numbering_starts_at_one() {
        assert_eq!(next_payout_number(&[]), 1);
        assert_eq!(next_payout_number(&[1, 3, 2]), 4);
    }

    #[test]
    fn request_amount_must_be_positive() {
        let mut request = NewPayout {
            amount_requested: dec!(0),
            requested_date: date(2025, 3, 1),
            notes: None,
        };
        assert!(request.validate().is_err());
        request.amount_requested = dec!(0.01);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn available_balance_boundary() {
        let ctx = ApprovalContext {
            initial_balance: dec!(10000),
            trades_pnl: dec!(2000),
            other_paid: dec!(1500),
        };
        assert_eq!(ctx.available_balance(), dec!(10500));
        assert!(check_approval(&ctx, dec!(600)).is_ok());
        assert!(check_approval(&ctx, dec!(10500)).is_ok());
        let err = check_approval(&ctx, dec!(10500.01)).unwrap_err();
        assert!(err.to_string().contains("10500"));
    }

    #[test]
    fn approval_transitions_once() {
        let mut payout = pending();
        payout.approve(dec!(600), Some(date(2025, 3, 4))).unwrap();
        assert_eq!(payout.status, PayoutStatus::Approved);
        assert!(payout.fully_paid());
        assert_eq!(payout.days_to_receive(), Some(3));
        assert!(payout.approve(dec!(600), None).is_err());
        assert!(payout.decline().is_err());
    }

    #[test]
    fn decline_is_terminal() {
        let mut payout = pending();
        payout.decline().unwrap();
        assert_eq!(payout.status, PayoutStatus::Declined);
        assert!(payout.approve(dec!(100), None).is_err());
    }

    #[test]
    fn partial_payment_is_not_fully_paid() {
        let mut payout = pending();
        payout.approve(dec!(500), None).unwrap();
        assert!(!payout.fully_paid());
        assert_eq!(payout.days_to_receive(), None);
    }

    #[test]
    fn approval_rejects_bad_amounts_and_dates() {
        let mut payout = pending();
        assert!(payout.approve(dec!(0), None).is_err());
        assert!(payout.approve(dec!(100), Some(date(2025, 2, 28))).is_err());
        assert_eq!(payout.status, PayoutStatus::Pending);
    }

    #[test]
    fn last_approved_skips_pending_and_declined() {
        let mut first = pending();
        first.payout_number = 1;
        first.approve(dec!(600), Some(date(2025, 3, 10))).unwrap();

        let mut declined = pending();
        declined.payout_number = 2;
        declined.requested_date = date(2025, 4, 1);
        declined.decline().unwrap();

        let mut waiting = pending();
        waiting.payout_number = 3;
        waiting.requested_date = date(2025, 5, 1);

        let payouts = vec![first, declined, waiting];
        let last = last_approved(&payouts).unwrap();
        assert_eq!(last.payout_number, 1);
        assert_eq!(last.effective_date(), date(2025, 3, 10));
        assert_eq!(last_approved(&payouts[1..]), None);
    }

    #[test]
    fn last_approved_orders_by_received_then_requested() {
        let mut late_request = pending();
        late_request.payout_number = 1;
        late_request.requested_date = date(2025, 3, 5);
        late_request.approve(dec!(100), Some(date(2025, 3, 6))).unwrap();

        let mut late_receipt = pending();
        late_receipt.payout_number = 2;
        late_receipt.requested_date = date(2025, 3, 1);
        late_receipt.approve(dec!(100), Some(date(2025, 3, 20))).unwrap();

        let mut unreceived = pending();
        unreceived.payout_number = 3;
        unreceived.requested_date = date(2025, 4, 1);
        unreceived.approve(dec!(100), None).unwrap();

        let payouts = vec![late_request, late_receipt, unreceived];
        assert_eq!(last_approved(&payouts).unwrap().payout_number, 2);
        assert_eq!(last_approved(&payouts[2..]).unwrap().effective_date(), date(2025, 4, 1));
    }
}
