//! In-process store used for local runs and tests.
//!
//! A transaction takes the store lock for its whole lifetime, so
//! transactions are serialisable. Reads go straight to the locked tables;
//! the first write stages a copy, and a rollback is simply dropping it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, StoreError, Transaction};
use crate::schemas::{Expense, ExpenseId, ExpenseShare, Group, GroupId, GroupMember, User, UserId};

/// Points at which a [`MemoryStore`] can be told to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultPoint {
    InsertShares,
    Commit,
    /// `insert_member` reports a duplicate, as when a concurrent join of the
    /// same user commits first.
    MemberRace,
}

#[derive(Clone, Debug, Default)]
struct Tables {
    users: Vec<User>,
    groups: Vec<Group>,
    members: Vec<GroupMember>,
    expenses: Vec<Expense>,
    shares: Vec<ExpenseShare>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fault: Option<FaultPoint>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose transactions fail at `fault`. Clones share the data.
    pub fn with_fault(&self, fault: FaultPoint) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            fault: Some(fault),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            guard,
            staged: None,
            fault: self.fault,
        }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Option<Tables>,
    fault: Option<FaultPoint>,
}

impl MemoryTransaction {
    fn fail_at(&self, point: FaultPoint) -> Result<(), StoreError> {
        if self.fault == Some(point) {
            return Err(StoreError::backend(format!("injected fault at {point:?}")));
        }
        Ok(())
    }

    fn tables(&self) -> &Tables {
        self.staged.as_ref().unwrap_or(&*self.guard)
    }

    fn tables_mut(&mut self) -> &mut Tables {
        let guard = &self.guard;
        self.staged.get_or_insert_with(|| Tables::clone(&**guard))
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        check_user_unique(&self.tables().users, user)?;
        self.tables_mut().users.push(user.clone());
        Ok(())
    }

    async fn replace_user(&mut self, user: &User) -> Result<(), StoreError> {
        check_user_unique(&self.tables().users, user)?;
        if let Some(stored) = self.tables_mut().users.iter_mut().find(|u| u.id == user.id) {
            *stored = user.clone();
        }
        Ok(())
    }

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn insert_group(&mut self, group: &Group) -> Result<(), StoreError> {
        if self.tables().groups.iter().any(|g| g.name == group.name) {
            return Err(StoreError::duplicate("group name"));
        }
        self.tables_mut().groups.push(group.clone());
        Ok(())
    }

    async fn find_group(&mut self, id: GroupId) -> Result<Option<Group>, StoreError> {
        Ok(self.tables().groups.iter().find(|g| g.id == id).cloned())
    }

    async fn find_group_by_name(&mut self, name: &str) -> Result<Option<Group>, StoreError> {
        Ok(self.tables().groups.iter().find(|g| g.name == name).cloned())
    }

    async fn groups_of_user(&mut self, user_id: UserId) -> Result<Vec<Group>, StoreError> {
        let Tables { groups, members, .. } = self.tables();
        Ok(groups
            .iter()
            .filter(|g| {
                members
                    .iter()
                    .any(|m| m.group_id == g.id && m.user_id == user_id)
            })
            .cloned()
            .collect())
    }

    async fn insert_member(&mut self, member: &GroupMember) -> Result<(), StoreError> {
        if self.fault == Some(FaultPoint::MemberRace) {
            return Err(StoreError::duplicate("group membership"));
        }
        if self
            .tables()
            .members
            .iter()
            .any(|m| m.group_id == member.group_id && m.user_id == member.user_id)
        {
            return Err(StoreError::duplicate("group membership"));
        }
        self.tables_mut().members.push(member.clone());
        Ok(())
    }

    async fn find_member(
        &mut self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Option<GroupMember>, StoreError> {
        Ok(self
            .tables()
            .members
            .iter()
            .find(|m| m.group_id == group_id && m.user_id == user_id)
            .cloned())
    }

    async fn members_of_group(
        &mut self,
        group_id: GroupId,
    ) -> Result<Vec<GroupMember>, StoreError> {
        Ok(self
            .tables()
            .members
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn insert_expense(&mut self, expense: &Expense) -> Result<(), StoreError> {
        if self.tables().expenses.iter().any(|e| e.id == expense.id) {
            return Err(StoreError::duplicate("expense"));
        }
        self.tables_mut().expenses.push(expense.clone());
        Ok(())
    }

    async fn insert_shares(&mut self, shares: &[ExpenseShare]) -> Result<(), StoreError> {
        self.fail_at(FaultPoint::InsertShares)?;
        for share in shares {
            if self
                .tables()
                .shares
                .iter()
                .any(|s| s.expense_id == share.expense_id && s.user_id == share.user_id)
            {
                return Err(StoreError::duplicate("expense share"));
            }
            self.tables_mut().shares.push(share.clone());
        }
        Ok(())
    }

    async fn find_expense(&mut self, id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        Ok(self.tables().expenses.iter().find(|e| e.id == id).cloned())
    }

    async fn expenses_of_group(&mut self, group_id: GroupId) -> Result<Vec<Expense>, StoreError> {
        Ok(self
            .tables()
            .expenses
            .iter()
            .filter(|e| e.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn shares_of_expenses(
        &mut self,
        expense_ids: &[ExpenseId],
    ) -> Result<Vec<ExpenseShare>, StoreError> {
        Ok(self
            .tables()
            .shares
            .iter()
            .filter(|s| expense_ids.contains(&s.expense_id))
            .cloned()
            .collect())
    }

    async fn mark_share_paid(
        &mut self,
        expense_id: ExpenseId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        match self
            .tables_mut()
            .shares
            .iter_mut()
            .find(|s| s.expense_id == expense_id && s.user_id == user_id)
        {
            Some(share) => {
                share.is_paid = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.fail_at(FaultPoint::Commit)?;
        let MemoryTransaction {
            mut guard, staged, ..
        } = *self;
        if let Some(staged) = staged {
            *guard = staged;
        }
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

fn check_user_unique(users: &[User], user: &User) -> Result<(), StoreError> {
    let others = users.iter().filter(|u| u.id != user.id);
    for other in others {
        if other.username == user.username {
            return Err(StoreError::duplicate("username"));
        }
        if user.email.is_some() && other.email == user.email {
            return Err(StoreError::duplicate("email"));
        }
    }
    Ok(())
}
