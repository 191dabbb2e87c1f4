//! Recorded settlements and their confirmation lifecycle.
//!
//! A record is created as [`Pending`] when the debtor reports that a computed
//! [`Exchange`] has been paid. The creditor either confirms it, which makes it
//! [`Paid`], or rejects it, which sends it back to [`Unpaid`] until the debtor
//! resubmits it.
//!
//!  [`Pending`]: SettlementStatus::Pending
//!  [`Paid`]: SettlementStatus::Paid
//!  [`Unpaid`]: SettlementStatus::Unpaid
use std::fmt;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exchange::Exchange;
use crate::schemas::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Unpaid,
    Pending,
    Paid,
}

impl SettlementStatus {
    /// Whether the record still waits for something to happen.
    pub fn is_open(self) -> bool {
        self != SettlementStatus::Paid
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            SettlementStatus::Unpaid => "unpaid",
            SettlementStatus::Pending => "pending",
            SettlementStatus::Paid => "paid",
        };
        f.write_str(status)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum SettlementError {
    #[error("\"{actor}\" is not allowed to {action} this settlement")]
    NotAllowed { actor: String, action: &'static str },
    #[error("Cannot {action} a settlement that is {status}")]
    InvalidTransition {
        status: SettlementStatus,
        action: &'static str,
    },
}

#[derive(Clone, Copy)]
enum Party {
    Debtor,
    Creditor,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SettlementRecord {
    pub id: String,
    pub group_id: String,
    pub from: UserId,
    pub to: UserId,
    pub amount: f64,
    pub status: SettlementStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementRecord {
    /// The debtor reports `exchange` as paid.
    pub fn mark_paid(
        group_id: &str,
        exchange: &Exchange,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, SettlementError> {
        if actor != exchange.from {
            return Err(SettlementError::NotAllowed {
                actor: actor.to_string(),
                action: "mark as paid",
            });
        }
        Ok(Self {
            id: ObjectId::new().to_hex(),
            group_id: group_id.to_string(),
            from: exchange.from.clone(),
            to: exchange.to.clone(),
            amount: exchange.amount,
            status: SettlementStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// The creditor acknowledges the payment.
    pub fn confirm(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), SettlementError> {
        self.transition(
            actor,
            Party::Creditor,
            "confirm",
            SettlementStatus::Pending,
            SettlementStatus::Paid,
            now,
        )
    }

    /// The creditor disputes the payment.
    pub fn reject(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), SettlementError> {
        self.transition(
            actor,
            Party::Creditor,
            "reject",
            SettlementStatus::Pending,
            SettlementStatus::Unpaid,
            now,
        )
    }

    /// The debtor reports a rejected payment as paid again.
    pub fn resubmit(&mut self, actor: &str, now: DateTime<Utc>) -> Result<(), SettlementError> {
        self.transition(
            actor,
            Party::Debtor,
            "resubmit",
            SettlementStatus::Unpaid,
            SettlementStatus::Pending,
            now,
        )
    }

    fn transition(
        &mut self,
        actor: &str,
        party: Party,
        action: &'static str,
        expected: SettlementStatus,
        next: SettlementStatus,
        now: DateTime<Utc>,
    ) -> Result<(), SettlementError> {
        let allowed = match party {
            Party::Debtor => &self.from,
            Party::Creditor => &self.to,
        };
        if actor != allowed.as_str() {
            return Err(SettlementError::NotAllowed {
                actor: actor.to_string(),
                action,
            });
        }
        if self.status != expected {
            return Err(SettlementError::InvalidTransition {
                status: self.status,
                action,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn exchange() -> Exchange {
        Exchange {
            from: "bob".to_string(),
            to: "ana".to_string(),
            amount: 42.5,
        }
    }

    fn pending() -> SettlementRecord {
        SettlementRecord::mark_paid("trip", &exchange(), "bob", Utc::now()).unwrap()
    }

    #[test]
    fn debtor_marks_as_pending() {
        let record = pending();
        assert_eq!(record.status, SettlementStatus::Pending);
        assert_eq!(record.from, "bob");
        assert_eq!(record.to, "ana");
        assert_eq!(record.group_id, "trip");
        assert_eq!(record.amount, 42.5);
    }

    #[test]
    fn only_debtor_can_mark_as_paid() {
        let err = SettlementRecord::mark_paid("trip", &exchange(), "ana", Utc::now()).unwrap_err();
        assert!(matches!(err, SettlementError::NotAllowed { .. }));
    }

    #[test]
    fn creditor_confirms() {
        let mut record = pending();
        let later = record.created_at + Duration::minutes(5);
        record.confirm("ana", later).unwrap();
        assert_eq!(record.status, SettlementStatus::Paid);
        assert_eq!(record.updated_at, later);
        assert!(!record.status.is_open());
    }

    #[test]
    fn debtor_cannot_confirm() {
        let mut record = pending();
        assert_eq!(
            record.confirm("bob", Utc::now()),
            Err(SettlementError::NotAllowed {
                actor: "bob".to_string(),
                action: "confirm"
            })
        );
        assert_eq!(record.status, SettlementStatus::Pending);
    }

    #[test]
    fn rejected_then_resubmitted_then_confirmed() {
        let mut record = pending();
        record.reject("ana", Utc::now()).unwrap();
        assert_eq!(record.status, SettlementStatus::Unpaid);
        assert!(record.status.is_open());
        record.resubmit("bob", Utc::now()).unwrap();
        assert_eq!(record.status, SettlementStatus::Pending);
        record.confirm("ana", Utc::now()).unwrap();
        assert_eq!(record.status, SettlementStatus::Paid);
    }

    #[test]
    fn paid_is_final() {
        let mut record = pending();
        record.confirm("ana", Utc::now()).unwrap();
        assert_eq!(
            record.reject("ana", Utc::now()),
            Err(SettlementError::InvalidTransition {
                status: SettlementStatus::Paid,
                action: "reject"
            })
        );
        assert!(record.confirm("ana", Utc::now()).is_err());
        assert!(record.resubmit("bob", Utc::now()).is_err());
    }

    #[test]
    fn unpaid_cannot_be_confirmed() {
        let mut record = pending();
        record.reject("ana", Utc::now()).unwrap();
        assert!(matches!(
            record.confirm("ana", Utc::now()),
            Err(SettlementError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn status_serializes_in_snake_case() {
        assert_eq!(
            serde_json::to_string(&SettlementStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(SettlementStatus::Unpaid.to_string(), "unpaid");
    }
}
