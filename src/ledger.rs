//! Expense ledger: records expenses with their shares and settles shares.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, instrument};

use crate::error::{LedgerError, LedgerResult};
use crate::registry::{members_in, require_group, require_member};
use crate::schemas::{
    Expense, ExpenseId, ExpenseRecord, ExpenseShare, GroupId, GroupMember, UserId,
};
use crate::split::{split_evenly, to_cents};
use crate::store::{Store, Transaction};

/// Largest accepted amount, in cents: twelve significant digits.
const MAX_AMOUNT_CENTS: i64 = 999_999_999_999;

/// A validated request to log an expense.
#[derive(Clone, Debug)]
pub struct NewExpense {
    pub group_id: GroupId,
    pub payer_id: UserId,
    pub amount: Decimal,
    pub description: String,
}

#[derive(Clone)]
pub struct ExpenseLedger {
    store: Arc<dyn Store>,
}

impl ExpenseLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Splits the expense across the group's current members and stores the
    /// expense with every share in one transaction.
    ///
    /// Members who join later are not added to this expense.
    #[instrument(
        skip_all,
        fields(group = %new.group_id, payer = %new.payer_id, amount = %new.amount)
    )]
    pub async fn record_expense(&self, new: NewExpense) -> LedgerResult<ExpenseRecord> {
        let amount = validate_amount(new.amount)?;

        let mut tx = self.store.begin().await?;
        require_member(&mut *tx, new.group_id, new.payer_id).await?;

        let members = members_in(&mut *tx, new.group_id).await?;
        let participants = participant_ids(members)?;

        let expense = Expense {
            id: ExpenseId::new(),
            amount,
            description: new.description,
            date: Utc::now(),
            group_id: new.group_id,
            payer_id: new.payer_id,
        };
        let shares: Vec<ExpenseShare> = split_evenly(amount, &participants, &new.payer_id)?
            .into_iter()
            .map(|share| ExpenseShare {
                expense_id: expense.id,
                user_id: share.participant,
                amount: share.amount,
                is_paid: share.is_paid,
            })
            .collect();

        tx.insert_expense(&expense).await?;
        tx.insert_shares(&shares).await?;
        tx.commit().await?;

        info!(expense = %expense.id, shares = shares.len(), "expense recorded");
        Ok(ExpenseRecord { expense, shares })
    }

    pub async fn get_expense(&self, expense_id: ExpenseId) -> LedgerResult<ExpenseRecord> {
        let mut tx = self.store.begin().await?;
        load_record(&mut *tx, expense_id).await
    }

    /// Like [`get_expense`](Self::get_expense), restricted to members of the
    /// expense's group.
    pub async fn get_expense_as(
        &self,
        expense_id: ExpenseId,
        viewer: UserId,
    ) -> LedgerResult<ExpenseRecord> {
        let mut tx = self.store.begin().await?;
        let record = load_record(&mut *tx, expense_id).await?;
        require_member(&mut *tx, record.expense.group_id, viewer).await?;
        Ok(record)
    }

    /// Expenses of a group, newest first.
    pub async fn list_group_expenses(
        &self,
        group_id: GroupId,
        viewer: UserId,
    ) -> LedgerResult<Vec<ExpenseRecord>> {
        let mut tx = self.store.begin().await?;
        require_group(&mut *tx, group_id).await?;
        require_member(&mut *tx, group_id, viewer).await?;

        let mut expenses = tx.expenses_of_group(group_id).await?;
        expenses.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
        let ids: Vec<ExpenseId> = expenses.iter().map(|e| e.id).collect();
        let mut by_expense: HashMap<ExpenseId, Vec<ExpenseShare>> = HashMap::new();
        for share in tx.shares_of_expenses(&ids).await? {
            by_expense.entry(share.expense_id).or_default().push(share);
        }

        Ok(expenses
            .into_iter()
            .map(|expense| {
                let shares = by_expense.remove(&expense.id).unwrap_or_default();
                ExpenseRecord { expense, shares }
            })
            .collect())
    }

    /// Marks a participant's share as paid. Only the payer or the participant
    /// may do this; settling an already paid share changes nothing.
    #[instrument(
        skip_all,
        fields(expense = %expense_id, participant = %participant, caller = %caller)
    )]
    pub async fn settle_share(
        &self,
        expense_id: ExpenseId,
        participant: UserId,
        caller: UserId,
    ) -> LedgerResult<ExpenseRecord> {
        let mut tx = self.store.begin().await?;
        let expense = tx
            .find_expense(expense_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Expense not found"))?;
        if caller != expense.payer_id && caller != participant {
            return Err(LedgerError::forbidden(
                "Only the payer or the participant can settle a share",
            ));
        }
        if !tx.mark_share_paid(expense_id, participant).await? {
            return Err(LedgerError::not_found("Share not found"));
        }
        let record = load_record(&mut *tx, expense_id).await?;
        tx.commit().await?;

        info!("share settled");
        Ok(record)
    }
}

/// Rejects negative, sub-cent and oversized amounts, and normalises the
/// scale to two places.
pub fn validate_amount(amount: Decimal) -> LedgerResult<Decimal> {
    let cents = to_cents(amount)?;
    if cents > MAX_AMOUNT_CENTS {
        return Err(LedgerError::invalid_input("amount is too large"));
    }
    let mut normalised = amount;
    normalised.rescale(2);
    Ok(normalised)
}

/// An empty member list means a stored group lost its creator, which is a
/// defect. It is still answered as a rejected request (400), so it is logged
/// here at `error` rather than surfacing as an internal error.
fn participant_ids(members: Vec<GroupMember>) -> LedgerResult<Vec<UserId>> {
    if members.is_empty() {
        error!("group has no members while recording an expense");
        return Err(LedgerError::invalid_input("Group has no members"));
    }
    Ok(members.into_iter().map(|member| member.user_id).collect())
}

async fn load_record(
    tx: &mut dyn Transaction,
    expense_id: ExpenseId,
) -> LedgerResult<ExpenseRecord> {
    let expense = tx
        .find_expense(expense_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Expense not found"))?;
    let shares = tx.shares_of_expenses(&[expense_id]).await?;
    Ok(ExpenseRecord { expense, shares })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MembershipRegistry;
    use crate::schemas::{Group, Role};
    use crate::store::{FaultPoint, MemoryStore};
    use rust_decimal_macros::dec;

    struct Fixture {
        store: MemoryStore,
        registry: MembershipRegistry,
        ledger: ExpenseLedger,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        Fixture {
            registry: MembershipRegistry::new(Arc::clone(&shared)),
            ledger: ExpenseLedger::new(shared),
            store,
        }
    }

    async fn group_with(fixture: &Fixture, members: &[UserId]) -> Group {
        let group = fixture
            .registry
            .create_group_with_creator("Lunch", None, members[0])
            .await
            .unwrap();
        for member in &members[1..] {
            fixture
                .registry
                .add_member(group.id, *member, Role::Member)
                .await
                .unwrap();
        }
        group
    }

    fn lunch(group: &Group, payer: UserId, amount: Decimal) -> NewExpense {
        NewExpense {
            group_id: group.id,
            payer_id: payer,
            amount,
            description: "Lunch".into(),
        }
    }

    #[tokio::test]
    async fn even_split_marks_only_payer_paid() {
        let fixture = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let group = group_with(&fixture, &[a, b]).await;

        let record = fixture
            .ledger
            .record_expense(lunch(&group, a, dec!(100.00)))
            .await
            .unwrap();

        let shares: Vec<(UserId, Decimal, bool)> = record
            .shares
            .iter()
            .map(|s| (s.user_id, s.amount, s.is_paid))
            .collect();
        assert_eq!(shares, vec![(a, dec!(50.00), true), (b, dec!(50.00), false)]);
    }

    #[tokio::test]
    async fn remainder_goes_to_first_member_regardless_of_payer() {
        let fixture = fixture();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        let group = group_with(&fixture, &[a, b, c]).await;

        let record = fixture
            .ledger
            .record_expense(lunch(&group, c, dec!(10.00)))
            .await
            .unwrap();

        let amounts: Vec<Decimal> = record.shares.iter().map(|s| s.amount).collect();
        assert_eq!(amounts, vec![dec!(3.34), dec!(3.33), dec!(3.33)]);
        assert_eq!(record.shares[0].user_id, a);
        assert!(record.shares[2].is_paid);
        let total: Decimal = amounts.iter().sum();
        assert_eq!(total, record.expense.amount);
    }

    #[tokio::test]
    async fn non_member_is_forbidden_and_nothing_is_written() {
        let fixture = fixture();
        let member = UserId::new();
        let group = group_with(&fixture, &[member]).await;

        let err = fixture
            .ledger
            .record_expense(lunch(&group, UserId::new(), dec!(12.00)))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Forbidden(_)));
        let listed = fixture
            .ledger
            .list_group_expenses(group.id, member)
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn failed_share_insert_leaves_no_expense() {
        let fixture = fixture();
        let member = UserId::new();
        let group = group_with(&fixture, &[member]).await;
        let faulty =
            ExpenseLedger::new(Arc::new(fixture.store.with_fault(FaultPoint::InsertShares)));

        let err = faulty
            .record_expense(lunch(&group, member, dec!(9.99)))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Store(_)));
        let mut tx = fixture.store.begin().await.unwrap();
        assert!(tx.expenses_of_group(group.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn later_members_are_not_added_to_past_expenses() {
        let fixture = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let group = group_with(&fixture, &[a]).await;
        let record = fixture
            .ledger
            .record_expense(lunch(&group, a, dec!(8.00)))
            .await
            .unwrap();

        fixture
            .registry
            .add_member(group.id, b, Role::Member)
            .await
            .unwrap();

        let stored = fixture.ledger.get_expense(record.expense.id).await.unwrap();
        assert_eq!(stored.shares.len(), 1);
        assert_eq!(stored.shares[0].amount, dec!(8.00));
    }

    #[tokio::test]
    async fn invalid_amounts_are_rejected() {
        let fixture = fixture();
        let a = UserId::new();
        let group = group_with(&fixture, &[a]).await;

        for amount in [dec!(-1.00), dec!(0.001), dec!(10000000000.00)] {
            let err = fixture
                .ledger
                .record_expense(lunch(&group, a, amount))
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidInput(_)), "{amount}");
        }
    }

    #[tokio::test]
    async fn missing_expense_is_not_found() {
        let err = fixture()
            .ledger
            .get_expense(ExpenseId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn expense_is_hidden_from_outsiders() {
        let fixture = fixture();
        let a = UserId::new();
        let group = group_with(&fixture, &[a]).await;
        let record = fixture
            .ledger
            .record_expense(lunch(&group, a, dec!(5.00)))
            .await
            .unwrap();

        assert!(fixture.ledger.get_expense_as(record.expense.id, a).await.is_ok());
        assert!(matches!(
            fixture
                .ledger
                .get_expense_as(record.expense.id, UserId::new())
                .await,
            Err(LedgerError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn participant_can_settle_own_share_once_or_twice() {
        let fixture = fixture();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        let group = group_with(&fixture, &[a, b, c]).await;
        let record = fixture
            .ledger
            .record_expense(lunch(&group, a, dec!(30.00)))
            .await
            .unwrap();
        let id = record.expense.id;

        let err = fixture.ledger.settle_share(id, b, c).await.unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden(_)));

        let settled = fixture.ledger.settle_share(id, b, b).await.unwrap();
        let again = fixture.ledger.settle_share(id, b, a).await.unwrap();
        assert_eq!(settled, again);
        let paid: Vec<UserId> = again
            .shares
            .iter()
            .filter(|s| s.is_paid)
            .map(|s| s.user_id)
            .collect();
        assert_eq!(paid, vec![a, b]);
    }

    #[tokio::test]
    async fn settling_unknown_share_is_not_found() {
        let fixture = fixture();
        let a = UserId::new();
        let group = group_with(&fixture, &[a]).await;
        let record = fixture
            .ledger
            .record_expense(lunch(&group, a, dec!(5.00)))
            .await
            .unwrap();

        let err = fixture
            .ledger
            .settle_share(record.expense.id, UserId::new(), a)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn memberless_group_is_a_rejected_request() {
        assert!(matches!(
            participant_ids(Vec::new()),
            Err(LedgerError::InvalidInput(ref message)) if message == "Group has no members"
        ));

        let group = GroupId::new();
        let (a, b) = (UserId::new(), UserId::new());
        let members = vec![
            GroupMember::new(group, a, Role::Admin),
            GroupMember::new(group, b, Role::Member),
        ];
        assert_eq!(participant_ids(members).unwrap(), vec![a, b]);
    }
}
