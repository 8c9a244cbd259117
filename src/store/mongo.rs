//! MongoDB adapter. Every transaction is a client session running a
//! multi-document transaction, which needs a replica set deployment.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{
    Error as MongoError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR,
};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use super::{Store, StoreError, Transaction};
use crate::schemas::{Expense, ExpenseId, ExpenseShare, Group, GroupId, GroupMember, User, UserId};

const USERS: &str = "users";
const GROUPS: &str = "groups";
const MEMBERS: &str = "group_members";
const EXPENSES: &str = "expenses";
const SHARES: &str = "expense_shares";

const DUPLICATE_KEY: i32 = 11000;
const WRITE_CONFLICT: i32 = 112;

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await.map_err(backend)?;
        let db = client.database(database);
        let store = Self { client, db };
        store.ensure_indexes().await?;
        info!(database, "connected to MongoDB");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        create_unique_index(
            &self.db.collection::<User>(USERS),
            doc! { "username": 1 },
            None,
        )
        .await?;
        create_unique_index(
            &self.db.collection::<User>(USERS),
            doc! { "email": 1 },
            Some(doc! { "email": { "$type": "string" } }),
        )
        .await?;
        create_unique_index(&self.db.collection::<Group>(GROUPS), doc! { "name": 1 }, None).await?;
        create_unique_index(
            &self.db.collection::<GroupMember>(MEMBERS),
            doc! { "group_id": 1, "user_id": 1 },
            None,
        )
        .await?;
        create_unique_index(
            &self.db.collection::<ExpenseShare>(SHARES),
            doc! { "expense_id": 1, "user_id": 1 },
            None,
        )
        .await
    }
}

async fn create_unique_index<T>(
    collection: &Collection<T>,
    keys: Document,
    partial_filter: Option<Document>,
) -> Result<(), StoreError> {
    let options = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(partial_filter)
        .build();
    let model = IndexModel::builder().keys(keys).options(Some(options)).build();
    collection.create_index(model, None).await.map_err(backend)?;
    Ok(())
}

#[async_trait]
impl Store for MongoStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let mut session = self.client.start_session(None).await.map_err(backend)?;
        session.start_transaction(None).await.map_err(backend)?;
        Ok(Box::new(MongoTransaction {
            db: self.db.clone(),
            session,
        }))
    }
}

struct MongoTransaction {
    db: Database,
    session: ClientSession,
}

impl MongoTransaction {
    fn collection<T>(&self, name: &str) -> Collection<T> {
        self.db.collection::<T>(name)
    }

    async fn find_one<T>(&mut self, name: &str, filter: Document) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        self.collection::<T>(name)
            .find_one_with_session(filter, None, &mut self.session)
            .await
            .map_err(backend)
    }

    async fn find_many<T>(
        &mut self,
        name: &str,
        filter: Document,
        options: Option<FindOptions>,
    ) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        let mut cursor = self
            .collection::<T>(name)
            .find_with_session(filter, options, &mut self.session)
            .await
            .map_err(backend)?;
        cursor
            .stream(&mut self.session)
            .try_collect()
            .await
            .map_err(backend)
    }

    async fn insert_one<T>(&mut self, name: &str, value: &T, what: &str) -> Result<(), StoreError>
    where
        T: Serialize + Send + Sync,
    {
        self.collection::<T>(name)
            .insert_one_with_session(value, None, &mut self.session)
            .await
            .map_err(|err| write_error(err, what))?;
        Ok(())
    }
}

#[async_trait]
impl Transaction for MongoTransaction {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.collection::<User>(USERS)
            .insert_one_with_session(user, None, &mut self.session)
            .await
            .map_err(user_write_error)?;
        Ok(())
    }

    async fn replace_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.collection::<User>(USERS)
            .replace_one_with_session(doc! { "_id": user.id }, user, None, &mut self.session)
            .await
            .map_err(user_write_error)?;
        Ok(())
    }

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        self.find_one(USERS, doc! { "_id": id }).await
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one(USERS, doc! { "email": email }).await
    }

    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_one(USERS, doc! { "username": username }).await
    }

    async fn insert_group(&mut self, group: &Group) -> Result<(), StoreError> {
        self.insert_one(GROUPS, group, "group name").await
    }

    async fn find_group(&mut self, id: GroupId) -> Result<Option<Group>, StoreError> {
        self.find_one(GROUPS, doc! { "_id": id }).await
    }

    async fn find_group_by_name(&mut self, name: &str) -> Result<Option<Group>, StoreError> {
        self.find_one(GROUPS, doc! { "name": name }).await
    }

    async fn groups_of_user(&mut self, user_id: UserId) -> Result<Vec<Group>, StoreError> {
        let memberships: Vec<GroupMember> = self
            .find_many(MEMBERS, doc! { "user_id": user_id }, None)
            .await?;
        let ids: Vec<GroupId> = memberships.iter().map(|m| m.group_id).collect();
        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();
        self.find_many(GROUPS, doc! { "_id": { "$in": ids } }, Some(options))
            .await
    }

    async fn insert_member(&mut self, member: &GroupMember) -> Result<(), StoreError> {
        self.insert_one(MEMBERS, member, "group membership").await
    }

    async fn find_member(
        &mut self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Option<GroupMember>, StoreError> {
        self.find_one(MEMBERS, doc! { "group_id": group_id, "user_id": user_id })
            .await
    }

    async fn members_of_group(
        &mut self,
        group_id: GroupId,
    ) -> Result<Vec<GroupMember>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "joined_at": 1, "user_id": 1 })
            .build();
        self.find_many(MEMBERS, doc! { "group_id": group_id }, Some(options))
            .await
    }

    async fn insert_expense(&mut self, expense: &Expense) -> Result<(), StoreError> {
        self.insert_one(EXPENSES, expense, "expense").await
    }

    async fn insert_shares(&mut self, shares: &[ExpenseShare]) -> Result<(), StoreError> {
        if shares.is_empty() {
            return Ok(());
        }
        self.collection::<ExpenseShare>(SHARES)
            .insert_many_with_session(shares, None, &mut self.session)
            .await
            .map_err(|err| write_error(err, "expense share"))?;
        Ok(())
    }

    async fn find_expense(&mut self, id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        self.find_one(EXPENSES, doc! { "_id": id }).await
    }

    async fn expenses_of_group(&mut self, group_id: GroupId) -> Result<Vec<Expense>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "date": 1 }).build();
        self.find_many(EXPENSES, doc! { "group_id": group_id }, Some(options))
            .await
    }

    async fn shares_of_expenses(
        &mut self,
        expense_ids: &[ExpenseId],
    ) -> Result<Vec<ExpenseShare>, StoreError> {
        self.find_many(
            SHARES,
            doc! { "expense_id": { "$in": expense_ids.to_vec() } },
            None,
        )
        .await
    }

    async fn mark_share_paid(
        &mut self,
        expense_id: ExpenseId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        let result = self
            .collection::<ExpenseShare>(SHARES)
            .update_one_with_session(
                doc! { "expense_id": expense_id, "user_id": user_id },
                doc! { "$set": { "is_paid": true } },
                None,
                &mut self.session,
            )
            .await
            .map_err(backend)?;
        Ok(result.matched_count > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tx = self;
        tx.session.commit_transaction().await.map_err(backend)
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        let mut tx = self;
        tx.session.abort_transaction().await.map_err(backend)
    }
}

fn backend(err: MongoError) -> StoreError {
    StoreError::backend(err.to_string())
}

fn write_error(err: MongoError, what: &str) -> StoreError {
    if is_duplicate_key(&err) || is_insert_race(&err) {
        StoreError::duplicate(what)
    } else {
        backend(err)
    }
}

fn user_write_error(err: MongoError) -> StoreError {
    if is_insert_race(&err) {
        StoreError::duplicate("user")
    } else if is_duplicate_key(&err) {
        if err.to_string().contains("email") {
            StoreError::duplicate("email")
        } else {
            StoreError::duplicate("username")
        }
    } else {
        backend(err)
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY,
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .as_ref()
            .is_some_and(|errors| errors.iter().any(|e| e.code == DUPLICATE_KEY)),
        ErrorKind::Command(command) => command.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Inside a transaction, two sessions inserting the same unique key collide
/// as a transient write conflict rather than a duplicate key error. Only
/// insert paths call this, so the conflict is on the key being inserted.
fn is_insert_race(err: &MongoError) -> bool {
    if !err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        return false;
    }
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == WRITE_CONFLICT,
        ErrorKind::Command(command) => command.code == WRITE_CONFLICT,
        _ => false,
    }
}
