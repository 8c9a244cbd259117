use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::LedgerResult;
use crate::registry::{members_in, require_group, require_member};
use crate::schemas::{Expense, ExpenseId, ExpenseShare, GroupId, UserId};
use crate::store::{Store, Transaction};

/// Net position per user: positive means the group owes the user.
pub type Balance = BTreeMap<UserId, Decimal>;

/// Projects outstanding shares onto net balances.
///
/// Every unpaid share of a participant other than the payer moves its amount
/// from the participant to the payer. Settled shares and the payer's own
/// share move nothing, so the balances of a group always add up to zero.
pub fn compute_balance(expenses: &[Expense], shares: &[ExpenseShare]) -> Balance {
    let payers: HashMap<ExpenseId, UserId> = expenses.iter().map(|e| (e.id, e.payer_id)).collect();
    let mut balance = Balance::new();
    for share in shares {
        let Some(&payer) = payers.get(&share.expense_id) else {
            continue;
        };
        if share.is_paid || share.user_id == payer {
            continue;
        }
        *balance.entry(payer).or_insert(Decimal::ZERO) += share.amount;
        *balance.entry(share.user_id).or_insert(Decimal::ZERO) -= share.amount;
    }
    balance
}

/// Read-only balance queries, recomputed from the stored expenses and shares.
#[derive(Clone)]
pub struct BalanceProjector {
    store: Arc<dyn Store>,
}

impl BalanceProjector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn net_balance(&self, group_id: GroupId, user_id: UserId) -> LedgerResult<Decimal> {
        let mut tx = self.store.begin().await?;
        require_group(&mut *tx, group_id).await?;
        let balance = group_balance(&mut *tx, group_id).await?;
        Ok(balance.get(&user_id).copied().unwrap_or(Decimal::ZERO))
    }

    /// Net balance of every current member, in join order.
    pub async fn group_balances(
        &self,
        group_id: GroupId,
        viewer: UserId,
    ) -> LedgerResult<Vec<(UserId, Decimal)>> {
        let mut tx = self.store.begin().await?;
        require_group(&mut *tx, group_id).await?;
        require_member(&mut *tx, group_id, viewer).await?;
        let balance = group_balance(&mut *tx, group_id).await?;
        let members = members_in(&mut *tx, group_id).await?;
        Ok(members
            .into_iter()
            .map(|member| {
                let net = balance.get(&member.user_id).copied().unwrap_or(Decimal::ZERO);
                (member.user_id, net)
            })
            .collect())
    }
}

async fn group_balance(tx: &mut dyn Transaction, group_id: GroupId) -> LedgerResult<Balance> {
    let expenses = tx.expenses_of_group(group_id).await?;
    let ids: Vec<ExpenseId> = expenses.iter().map(|e| e.id).collect();
    let shares = tx.shares_of_expenses(&ids).await?;
    Ok(compute_balance(&expenses, &shares))
}
