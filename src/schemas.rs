use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub type UserId = String;

/// Amounts closer than this are considered equal.
pub const TOLERANCE: f64 = 0.01;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Member {
    pub id: UserId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Share {
    pub user: UserId,
    pub amount: f64,
}

/// How the cost of an expense is divided between its participants.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Split {
    Equal { participants: Vec<UserId> },
    Exact { shares: Vec<Share> },
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub name: String,
    pub amount: f64,
    pub payer: UserId,
    pub split: Split,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DeviceTokens {
    pub user_id: UserId,
    #[serde(default)]
    pub tokens: Vec<String>,
}

impl Group {
    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn is_member(&self, id: &str) -> bool {
        self.member(id).is_some()
    }
}

impl Expense {
    /// What every participant owes for this expense.
    pub fn shares(&self) -> Vec<Share> {
        match &self.split {
            Split::Equal { participants } => {
                let amount_per_participant = self.amount / participants.len() as f64;
                participants
                    .iter()
                    .map(|user| Share {
                        user: user.clone(),
                        amount: amount_per_participant,
                    })
                    .collect()
            }
            Split::Exact { shares } => shares.clone(),
        }
    }

    /// Checks the expense against the members of `group`.
    pub fn validate(&self, group: &Group) -> Result<(), ValidationError> {
        if !self.amount.is_finite() || self.amount <= TOLERANCE {
            return Err(ValidationError::InvalidAmount(self.amount));
        }
        if !group.is_member(&self.payer) {
            return Err(ValidationError::UnknownMember(self.payer.clone()));
        }
        match &self.split {
            Split::Equal { participants } => {
                if participants.is_empty() {
                    return Err(ValidationError::NoParticipants);
                }
                if let Some(user) = participants.iter().find(|p| !group.is_member(p)) {
                    return Err(ValidationError::UnknownMember(user.clone()));
                }
            }
            Split::Exact { shares } => {
                if shares.is_empty() {
                    return Err(ValidationError::NoParticipants);
                }
                for share in shares {
                    if !group.is_member(&share.user) {
                        return Err(ValidationError::UnknownMember(share.user.clone()));
                    }
                    if !share.amount.is_finite() || share.amount < 0.0 {
                        return Err(ValidationError::InvalidAmount(share.amount));
                    }
                }
                let total: f64 = shares.iter().map(|s| s.amount).sum();
                if (total - self.amount).abs() > TOLERANCE {
                    return Err(ValidationError::SharesMismatch {
                        expected: self.amount,
                        got: total,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> Group {
        Group {
            id: "trip".to_string(),
            name: "Trip".to_string(),
            members: ["ana", "bob", "cai"]
                .into_iter()
                .map(|id| Member {
                    id: id.to_string(),
                    name: id.to_uppercase(),
                })
                .collect(),
            expenses: vec![],
        }
    }

    fn expense(amount: f64, split: Split) -> Expense {
        Expense {
            name: "dinner".to_string(),
            amount,
            payer: "ana".to_string(),
            split,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn equal_split_divides_amount() {
        let e = expense(
            90.0,
            Split::Equal {
                participants: vec!["ana".into(), "bob".into(), "cai".into()],
            },
        );
        let shares = e.shares();
        assert_eq!(shares.len(), 3);
        assert!(shares.iter().all(|s| (s.amount - 30.0).abs() < 1e-9));
    }

    #[test]
    fn exact_shares_must_add_up() {
        let e = expense(
            50.0,
            Split::Exact {
                shares: vec![
                    Share {
                        user: "bob".into(),
                        amount: 20.0,
                    },
                    Share {
                        user: "cai".into(),
                        amount: 20.0,
                    },
                ],
            },
        );
        assert_eq!(
            e.validate(&group()),
            Err(ValidationError::SharesMismatch {
                expected: 50.0,
                got: 40.0
            })
        );
    }

    #[test]
    fn strangers_are_refused() {
        let e = expense(
            10.0,
            Split::Equal {
                participants: vec!["bob".into(), "eve".into()],
            },
        );
        assert_eq!(
            e.validate(&group()),
            Err(ValidationError::UnknownMember("eve".into()))
        );
    }

    #[test]
    fn non_finite_amount_is_refused() {
        let e = expense(
            f64::NAN,
            Split::Equal {
                participants: vec!["bob".into()],
            },
        );
        assert!(matches!(
            e.validate(&group()),
            Err(ValidationError::InvalidAmount(_))
        ));
    }

    #[test]
    fn split_is_tagged_in_json() {
        let json = r#"{"name":"taxi","amount":12.5,"payer":"bob",
            "split":{"type":"equal","participants":["ana","bob"]}}"#;
        let e: Expense = serde_json::from_str(json).unwrap();
        assert_eq!(
            e.split,
            Split::Equal {
                participants: vec!["ana".into(), "bob".into()]
            }
        );
        assert!(e.validate(&group()).is_ok());
    }
}
