use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::exchange::{minimize_transactions, Exchange};
use crate::schemas::{Group, UserId};
use crate::settlement::{SettlementRecord, SettlementStatus};

/// Net position of a user inside a group.
///
/// A positive `net_balance` means the user is owed money overall, a negative
/// one means the user owes money.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Balance {
    pub user_id: UserId,
    pub name: String,
    pub net_balance: f64,
}

impl Balance {
    pub fn new(user_id: impl Into<UserId>, name: impl Into<String>, net_balance: f64) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            net_balance,
        }
    }
}

/// Derives every user's net balance from the expenses of `group`.
///
/// Members come first, in member order, followed by users that only show up in
/// expenses. Settlements already confirmed as paid count as repayments; records
/// in any other state are ignored.
pub fn compute_balances(group: &Group, settlements: &[SettlementRecord]) -> Vec<Balance> {
    let mut balances: Vec<Balance> = group
        .members
        .iter()
        .map(|m| Balance::new(m.id.clone(), m.name.clone(), 0.0))
        .collect();
    let mut index: HashMap<UserId, usize> = balances
        .iter()
        .enumerate()
        .map(|(i, b)| (b.user_id.clone(), i))
        .collect();

    let mut add = |user: &str, amount: f64| {
        let i = *index.entry(user.to_string()).or_insert_with(|| {
            balances.push(Balance::new(user, user, 0.0));
            balances.len() - 1
        });
        balances[i].net_balance += amount;
    };

    for expense in &group.expenses {
        add(&expense.payer, expense.amount);
        for share in expense.shares() {
            add(&share.user, -share.amount);
        }
    }

    for record in settlements
        .iter()
        .filter(|r| r.status == SettlementStatus::Paid)
    {
        add(&record.from, record.amount);
        add(&record.to, -record.amount);
    }

    balances
}

/// Refuses balances the calculator cannot work with.
pub fn ensure_finite(balances: &[Balance]) -> Result<(), ValidationError> {
    match balances.iter().find(|b| !b.net_balance.is_finite()) {
        Some(b) => Err(ValidationError::NonFinite(b.user_id.clone())),
        None => Ok(()),
    }
}

/// Suggested payments that settle every outstanding debt of `group`.
pub fn settle_group(
    group: &Group,
    settlements: &[SettlementRecord],
) -> Result<Vec<Exchange>, ValidationError> {
    let balances = compute_balances(group, settlements);
    ensure_finite(&balances)?;
    Ok(minimize_transactions(&balances))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::schemas::{Expense, Member, Share, Split};

    fn member(id: &str) -> Member {
        Member {
            id: id.to_string(),
            name: id.to_uppercase(),
        }
    }

    fn equal(payer: &str, amount: f64, participants: &[&str]) -> Expense {
        Expense {
            name: "expense".to_string(),
            amount,
            payer: payer.to_string(),
            split: Split::Equal {
                participants: participants.iter().map(|p| p.to_string()).collect(),
            },
            created_at: Utc::now(),
        }
    }

    fn group(expenses: Vec<Expense>) -> Group {
        Group {
            id: "flat".to_string(),
            name: "Flat".to_string(),
            members: vec![member("ana"), member("bob"), member("cai")],
            expenses,
        }
    }

    fn record(from: &str, to: &str, amount: f64, status: SettlementStatus) -> SettlementRecord {
        SettlementRecord {
            id: format!("{from}-{to}"),
            group_id: "flat".to_string(),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn net(balances: &[Balance], user: &str) -> f64 {
        balances
            .iter()
            .find(|b| b.user_id == user)
            .map(|b| b.net_balance)
            .unwrap()
    }

    #[test]
    fn payer_is_credited_participants_debited() {
        let g = group(vec![equal("ana", 90.0, &["ana", "bob", "cai"])]);
        let balances = compute_balances(&g, &[]);
        assert_eq!(net(&balances, "ana"), 60.0);
        assert_eq!(net(&balances, "bob"), -30.0);
        assert_eq!(net(&balances, "cai"), -30.0);
    }

    #[test]
    fn members_without_expenses_have_zero_balance() {
        let balances = compute_balances(&group(vec![]), &[]);
        let ids: Vec<_> = balances.iter().map(|b| b.user_id.as_str()).collect();
        assert_eq!(ids, ["ana", "bob", "cai"]);
        assert!(balances.iter().all(|b| b.net_balance == 0.0));
        assert_eq!(balances[0].name, "ANA");
    }

    #[test]
    fn exact_shares_are_applied() {
        let mut expense = equal("bob", 100.0, &[]);
        expense.split = Split::Exact {
            shares: vec![
                Share {
                    user: "ana".into(),
                    amount: 70.0,
                },
                Share {
                    user: "cai".into(),
                    amount: 30.0,
                },
            ],
        };
        let balances = compute_balances(&group(vec![expense]), &[]);
        assert_eq!(net(&balances, "ana"), -70.0);
        assert_eq!(net(&balances, "bob"), 100.0);
        assert_eq!(net(&balances, "cai"), -30.0);
    }

    #[test]
    fn only_paid_settlements_move_balances() {
        let g = group(vec![equal("ana", 90.0, &["ana", "bob", "cai"])]);
        let records = [
            record("bob", "ana", 30.0, SettlementStatus::Paid),
            record("cai", "ana", 30.0, SettlementStatus::Pending),
        ];
        let balances = compute_balances(&g, &records);
        assert_eq!(net(&balances, "ana"), 30.0);
        assert_eq!(net(&balances, "bob"), 0.0);
        assert_eq!(net(&balances, "cai"), -30.0);
    }

    #[test]
    fn strangers_are_appended_after_members() {
        let g = group(vec![equal("ana", 20.0, &["dan"])]);
        let balances = compute_balances(&g, &[]);
        assert_eq!(balances.len(), 4);
        assert_eq!(balances[3], Balance::new("dan", "dan", -20.0));
    }

    #[test]
    fn non_finite_balances_are_refused() {
        let balances = [Balance::new("ana", "Ana", 1.0), Balance::new("bob", "Bob", f64::NAN)];
        assert_eq!(
            ensure_finite(&balances),
            Err(ValidationError::NonFinite("bob".to_string()))
        );
    }

    #[test]
    fn settled_group_has_nothing_left() {
        let g = group(vec![equal("ana", 90.0, &["ana", "bob", "cai"])]);
        let records = [
            record("bob", "ana", 30.0, SettlementStatus::Paid),
            record("cai", "ana", 30.0, SettlementStatus::Paid),
        ];
        assert!(settle_group(&g, &records).unwrap().is_empty());
    }
}
