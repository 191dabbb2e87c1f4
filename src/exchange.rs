use serde::{Deserialize, Serialize};

use crate::balance::Balance;
use crate::schemas::{UserId, TOLERANCE};

/// A suggested payment from a debtor to a creditor.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Exchange {
    pub from: UserId,
    pub to: UserId,
    pub amount: f64,
}

struct Outstanding<'a> {
    id: &'a str,
    remaining: f64,
}

fn sorted_by_magnitude<'a>(
    balances: &'a [Balance],
    keep: impl Fn(f64) -> bool,
) -> Vec<Outstanding<'a>> {
    let mut side: Vec<Outstanding> = balances
        .iter()
        .filter(|b| b.net_balance.is_finite() && keep(b.net_balance))
        .map(|b| Outstanding {
            id: &b.user_id,
            remaining: b.net_balance.abs(),
        })
        .collect();
    // sort_by is stable, so equal magnitudes keep their input order
    side.sort_by(|a, b| b.remaining.total_cmp(&a.remaining));
    side
}

/// Computes the payments that bring every balance back to zero.
///
/// Creditors and debtors are each sorted by decreasing magnitude and matched
/// greedily: the largest debtor pays the largest creditor as much as either
/// of them allows, and whichever side is settled moves on. Zero and
/// non-finite balances are skipped and transfers of [`TOLERANCE`] or less are
/// dropped.
///
/// The result is deterministic for a given input but not guaranteed to use the
/// fewest possible transfers.
pub fn minimize_transactions(balances: &[Balance]) -> Vec<Exchange> {
    let mut creditors = sorted_by_magnitude(balances, |b| b > 0.0);
    let mut debtors = sorted_by_magnitude(balances, |b| b < 0.0);

    let mut exchanges = Vec::new();
    let (mut c, mut d) = (0, 0);
    while c < creditors.len() && d < debtors.len() {
        let creditor = &mut creditors[c];
        let debtor = &mut debtors[d];

        let amount = creditor.remaining.min(debtor.remaining);
        creditor.remaining -= amount;
        debtor.remaining -= amount;

        if amount > TOLERANCE {
            exchanges.push(Exchange {
                from: debtor.id.to_string(),
                to: creditor.id.to_string(),
                amount,
            });
        }

        if creditor.remaining <= TOLERANCE {
            c += 1;
        }
        if debtor.remaining <= TOLERANCE {
            d += 1;
        }
    }

    tracing::debug!(
        creditors = creditors.len(),
        debtors = debtors.len(),
        exchanges = exchanges.len(),
        "computed settlements"
    );
    exchanges
}
