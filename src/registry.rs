//! Membership registry: groups and who belongs to them.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::{LedgerError, LedgerResult};
use crate::schemas::{Group, GroupId, GroupMember, Role, UserId};
use crate::store::{Store, Transaction};

#[derive(Clone)]
pub struct MembershipRegistry {
    store: Arc<dyn Store>,
}

impl MembershipRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates a group and makes `creator` its first, admin, member.
    #[instrument(skip_all, fields(creator = %creator))]
    pub async fn create_group_with_creator(
        &self,
        name: &str,
        description: Option<String>,
        creator: UserId,
    ) -> LedgerResult<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::invalid_input("group name must not be empty"));
        }

        let mut tx = self.store.begin().await?;
        if tx.find_group_by_name(name).await?.is_some() {
            return Err(LedgerError::conflict("A group with this name already exists"));
        }
        let group = Group::new(name.to_string(), description);
        tx.insert_group(&group).await?;
        tx.insert_member(&GroupMember::new(group.id, creator, Role::Admin))
            .await?;
        tx.commit().await?;

        info!(group = %group.id, "group created");
        Ok(group)
    }

    pub async fn find_group(&self, group_id: GroupId) -> LedgerResult<Group> {
        let mut tx = self.store.begin().await?;
        require_group(&mut *tx, group_id).await
    }

    /// Groups `user_id` belongs to.
    pub async fn groups_of(&self, user_id: UserId) -> LedgerResult<Vec<Group>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.groups_of_user(user_id).await?)
    }

    /// Members in join order.
    pub async fn list_members(&self, group_id: GroupId) -> LedgerResult<Vec<GroupMember>> {
        let mut tx = self.store.begin().await?;
        require_group(&mut *tx, group_id).await?;
        members_in(&mut *tx, group_id).await
    }

    pub async fn is_member(&self, group_id: GroupId, user_id: UserId) -> LedgerResult<bool> {
        let mut tx = self.store.begin().await?;
        Ok(tx.find_member(group_id, user_id).await?.is_some())
    }

    #[instrument(skip_all, fields(group = %group_id, user = %user_id))]
    pub async fn add_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
        role: Role,
    ) -> LedgerResult<GroupMember> {
        let mut tx = self.store.begin().await?;
        require_group(&mut *tx, group_id).await?;
        if tx.find_member(group_id, user_id).await?.is_some() {
            return Err(LedgerError::conflict("Already a member of the group"));
        }
        let member = GroupMember::new(group_id, user_id, role);
        tx.insert_member(&member).await?;
        tx.commit().await?;

        info!(role = role.as_str(), "member added");
        Ok(member)
    }
}

pub(crate) async fn require_group(
    tx: &mut dyn Transaction,
    group_id: GroupId,
) -> LedgerResult<Group> {
    tx.find_group(group_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Group not found"))
}

/// Fails with `Forbidden` unless `user_id` belongs to the group.
pub(crate) async fn require_member(
    tx: &mut dyn Transaction,
    group_id: GroupId,
    user_id: UserId,
) -> LedgerResult<GroupMember> {
    tx.find_member(group_id, user_id)
        .await?
        .ok_or_else(|| LedgerError::forbidden("You are not a member of this group."))
}

/// Current members in join order.
pub(crate) async fn members_in(
    tx: &mut dyn Transaction,
    group_id: GroupId,
) -> LedgerResult<Vec<GroupMember>> {
    let mut members = tx.members_of_group(group_id).await?;
    sort_in_join_order(&mut members);
    Ok(members)
}

/// Orders by join time. Within the same millisecond the admin (the creator)
/// comes first, then user id.
pub(crate) fn sort_in_join_order(members: &mut [GroupMember]) {
    members.sort_by_key(|member| {
        (
            member.joined_at,
            member.role != Role::Admin,
            member.user_id,
        )
    });
}
