//! Transactional persistence port and its adapters.
//!
//! Every domain operation opens one [`Transaction`], performs its reads and
//! writes through it and commits. A transaction that is dropped or aborted
//! leaves no trace in the store.

use async_trait::async_trait;
use thiserror::Error;

use crate::schemas::{Expense, ExpenseId, ExpenseShare, Group, GroupId, GroupMember, User, UserId};

pub mod memory;
pub mod mongo;

pub use memory::{FaultPoint, MemoryStore};
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn duplicate(what: impl Into<String>) -> Self {
        Self::Duplicate(what.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;
}

#[async_trait]
pub trait Transaction: Send {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError>;
    /// Replaces the stored user with the same id.
    async fn replace_user(&mut self, user: &User) -> Result<(), StoreError>;
    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>, StoreError>;

    async fn insert_group(&mut self, group: &Group) -> Result<(), StoreError>;
    async fn find_group(&mut self, id: GroupId) -> Result<Option<Group>, StoreError>;
    async fn find_group_by_name(&mut self, name: &str) -> Result<Option<Group>, StoreError>;
    async fn groups_of_user(&mut self, user_id: UserId) -> Result<Vec<Group>, StoreError>;

    async fn insert_member(&mut self, member: &GroupMember) -> Result<(), StoreError>;
    async fn find_member(
        &mut self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Option<GroupMember>, StoreError>;
    async fn members_of_group(&mut self, group_id: GroupId) -> Result<Vec<GroupMember>, StoreError>;

    async fn insert_expense(&mut self, expense: &Expense) -> Result<(), StoreError>;
    async fn insert_shares(&mut self, shares: &[ExpenseShare]) -> Result<(), StoreError>;
    async fn find_expense(&mut self, id: ExpenseId) -> Result<Option<Expense>, StoreError>;
    async fn expenses_of_group(&mut self, group_id: GroupId) -> Result<Vec<Expense>, StoreError>;
    async fn shares_of_expenses(
        &mut self,
        expense_ids: &[ExpenseId],
    ) -> Result<Vec<ExpenseShare>, StoreError>;
    /// Marks one share paid. Returns `false` when no such share exists.
    async fn mark_share_paid(
        &mut self,
        expense_id: ExpenseId,
        user_id: UserId,
    ) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}
