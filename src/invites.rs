//! Group invitation links.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};

use crate::auth::{TokenPurpose, TokenSigner};
use crate::error::{LedgerError, LedgerResult};
use crate::registry::{require_group, require_member};
use crate::schemas::{GroupId, GroupMember, Role, UserId};
use crate::store::{Store, StoreError};

#[derive(Clone, Debug)]
pub struct Invite {
    pub token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of joining through an invite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
}

#[derive(Clone)]
pub struct Invitations {
    store: Arc<dyn Store>,
    signer: TokenSigner,
    ttl: Duration,
    link_base: String,
}

impl Invitations {
    pub fn new(
        store: Arc<dyn Store>,
        signer: TokenSigner,
        ttl: Duration,
        link_base: String,
    ) -> Self {
        Self {
            store,
            signer,
            ttl,
            link_base,
        }
    }

    /// Issues a time-limited invite link for a group the caller belongs to.
    #[instrument(skip_all, fields(group = %group_id, inviter = %inviter))]
    pub async fn create_invite(&self, group_id: GroupId, inviter: UserId) -> LedgerResult<Invite> {
        let mut tx = self.store.begin().await?;
        require_group(&mut *tx, group_id).await?;
        require_member(&mut *tx, group_id, inviter).await?;
        drop(tx);

        let issued = self
            .signer
            .issue(group_id, TokenPurpose::Invite, self.ttl, Utc::now());
        let url = format!("{}?token={}", self.link_base, issued.token);
        info!(expires_at = %issued.expires_at, "invite issued");
        Ok(Invite {
            token: issued.token,
            url,
            expires_at: issued.expires_at,
        })
    }

    /// Joins the group named by an invite token. Joining a group one already
    /// belongs to succeeds without adding a second membership.
    #[instrument(skip_all, fields(user = %user_id))]
    pub async fn join_by_token(&self, token: &str, user_id: UserId) -> LedgerResult<JoinOutcome> {
        let group_id = self
            .signer
            .verify(token, TokenPurpose::Invite, Utc::now())
            .map_err(|err| {
                debug!(error = %err, "invite token rejected");
                LedgerError::invalid_input("Invalid or expired token")
            })?;

        let mut tx = self.store.begin().await?;
        require_group(&mut *tx, group_id).await?;
        if tx.find_member(group_id, user_id).await?.is_some() {
            return Ok(JoinOutcome::AlreadyMember);
        }
        match tx
            .insert_member(&GroupMember::new(group_id, user_id, Role::Member))
            .await
        {
            Ok(()) => {}
            // A concurrent join of the same user got there first.
            Err(StoreError::Duplicate(_)) => return Ok(JoinOutcome::AlreadyMember),
            Err(err) => return Err(err.into()),
        }
        tx.commit().await?;

        info!(group = %group_id, "joined via invite");
        Ok(JoinOutcome::Joined)
    }
}
