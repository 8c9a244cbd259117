//! Wire-format request and response bodies.
//!
//! These are kept apart from the stored entities in `schemas`; responses are
//! built field by field so nothing stored leaks by accident.

use bson::oid::ObjectId;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::schemas::{ExpenseRecord, ExpenseShare, Group, GroupMember, User};

#[derive(Debug, Deserialize, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// OAuth2 password form; `username` carries the email address.
#[derive(Debug, Deserialize, Serialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ConvertGuestRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UserPublic {
    pub id: String,
    pub email: Option<String>,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_guest: bool,
}

impl From<&User> for UserPublic {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_hex(),
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_active: user.is_active,
            is_guest: user.is_guest,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GroupCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GroupRead {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl From<&Group> for GroupRead {
    fn from(group: &Group) -> Self {
        Self {
            id: group.id.to_hex(),
            name: group.name.clone(),
            description: group.description.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MemberRead {
    pub user_id: String,
    pub role: String,
    pub joined_at: String,
}

impl From<&GroupMember> for MemberRead {
    fn from(member: &GroupMember) -> Self {
        Self {
            user_id: member.user_id.to_hex(),
            role: member.role.as_str().to_string(),
            joined_at: timestamp(member.joined_at),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct InviteResponse {
    pub invite_url: String,
    pub qr_code_data: String,
    pub expires_at: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct JoinGroupRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Message {
    pub msg: String,
}

impl Message {
    pub fn new(msg: &str) -> Self {
        Self {
            msg: msg.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExpenseCreate {
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    pub group_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExpenseShareRead {
    pub user_id: String,
    pub amount: Decimal,
    pub is_paid: bool,
}

impl From<&ExpenseShare> for ExpenseShareRead {
    fn from(share: &ExpenseShare) -> Self {
        Self {
            user_id: share.user_id.to_hex(),
            amount: share.amount,
            is_paid: share.is_paid,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExpenseRead {
    pub id: String,
    pub amount: Decimal,
    pub description: String,
    pub date: String,
    pub group_id: String,
    pub payer_id: String,
    pub shares: Vec<ExpenseShareRead>,
}

impl From<&ExpenseRecord> for ExpenseRead {
    fn from(record: &ExpenseRecord) -> Self {
        let expense = &record.expense;
        Self {
            id: expense.id.to_hex(),
            amount: expense.amount,
            description: expense.description.clone(),
            date: timestamp(expense.date),
            group_id: expense.group_id.to_hex(),
            payer_id: expense.payer_id.to_hex(),
            shares: record.shares.iter().map(ExpenseShareRead::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BalanceRead {
    pub user_id: String,
    pub net: Decimal,
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Ids in the URL path that do not parse cannot name anything.
pub fn path_id(raw: &str, what: &str) -> Result<ObjectId, LedgerError> {
    ObjectId::parse_str(raw).map_err(|_| LedgerError::not_found(format!("{what} not found")))
}

pub fn body_id(raw: &str, field: &str) -> Result<ObjectId, LedgerError> {
    ObjectId::parse_str(raw)
        .map_err(|_| LedgerError::invalid_input(format!("{field} is not a valid id")))
}
