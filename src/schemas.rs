use bson::oid::ObjectId;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type UserId = ObjectId;
pub type GroupId = ObjectId;
pub type ExpenseId = ObjectId;

/// A person able to authenticate. Guests are ephemeral accounts without
/// email or password until they are converted.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_guest: bool,
}

/// Credentials applied when a guest becomes a registered user.
#[derive(Clone, Debug)]
pub struct Registration {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl User {
    pub fn registered(
        username: String,
        email: String,
        first_name: String,
        last_name: String,
        password_hash: String,
    ) -> Self {
        Self {
            id: ObjectId::new(),
            username,
            email: Some(email),
            first_name,
            last_name,
            password_hash: Some(password_hash),
            is_active: true,
            is_guest: false,
        }
    }

    pub fn guest(username: String) -> Self {
        Self {
            id: ObjectId::new(),
            username,
            email: None,
            first_name: "Guest".to_string(),
            last_name: String::new(),
            password_hash: None,
            is_active: true,
            is_guest: true,
        }
    }

    /// The `Guest -> Registered` transition. Returns `None` when the user is
    /// already registered.
    pub fn register(&self, registration: Registration) -> Option<User> {
        if !self.is_guest {
            return None;
        }
        Some(User {
            id: self.id,
            username: registration.username,
            email: Some(registration.email),
            first_name: registration
                .first_name
                .unwrap_or_else(|| self.first_name.clone()),
            last_name: registration
                .last_name
                .unwrap_or_else(|| self.last_name.clone()),
            password_hash: Some(registration.password_hash),
            is_active: self.is_active,
            is_guest: false,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: GroupId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: String, description: Option<String>) -> Self {
        Self {
            id: ObjectId::new(),
            name,
            description,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

/// Membership of one user in one group, unique per `(group_id, user_id)`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GroupMember {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub role: Role,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub joined_at: DateTime<Utc>,
}

impl GroupMember {
    /// `joined_at` is cut to milliseconds, the precision BSON keeps, so
    /// join order reads the same from every store.
    pub fn new(group_id: GroupId, user_id: UserId, role: Role) -> Self {
        Self {
            group_id,
            user_id,
            role,
            joined_at: Utc::now().trunc_subsecs(3),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    #[serde(rename = "_id")]
    pub id: ExpenseId,
    pub amount: Decimal,
    pub description: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date: DateTime<Utc>,
    pub group_id: GroupId,
    pub payer_id: UserId,
}

/// One participant's owed portion of an expense. Only `is_paid` ever changes.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExpenseShare {
    pub expense_id: ExpenseId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub is_paid: bool,
}

/// An expense together with the shares created alongside it.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpenseRecord {
    pub expense: Expense,
    pub shares: Vec<ExpenseShare>,
}
