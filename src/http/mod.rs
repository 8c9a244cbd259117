//! actix-web boundary: shared state, extractors and the route table.

use std::sync::Arc;

use actix_web::{error::InternalError, web, ResponseError};

use crate::accounts::Accounts;
use crate::auth::{PasswordHasher, TokenSigner};
use crate::balance::BalanceProjector;
use crate::config::Config;
use crate::error::LedgerError;
use crate::invites::Invitations;
use crate::ledger::ExpenseLedger;
use crate::registry::MembershipRegistry;
use crate::store::Store;

mod auth;
pub mod dto;
pub mod error;
mod expenses;
pub mod extract;
mod groups;
mod status;

pub use status::health;

/// Services shared by every worker.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Accounts,
    pub registry: MembershipRegistry,
    pub ledger: ExpenseLedger,
    pub balances: BalanceProjector,
    pub invitations: Invitations,
    pub project_name: String,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        let signer = TokenSigner::new(config.secret_key.as_str());
        Self {
            accounts: Accounts::new(
                Arc::clone(&store),
                signer.clone(),
                PasswordHasher::new(config.password_hash_rounds),
                config.access_token_ttl,
            ),
            registry: MembershipRegistry::new(Arc::clone(&store)),
            ledger: ExpenseLedger::new(Arc::clone(&store)),
            balances: BalanceProjector::new(Arc::clone(&store)),
            invitations: Invitations::new(
                store,
                signer,
                config.invite_ttl,
                config.invite_link_base.clone(),
            ),
            project_name: config.project_name.clone(),
        }
    }
}

/// Registers the versioned API. Mount it under the API prefix.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let response = LedgerError::invalid_input(err.to_string()).error_response();
        InternalError::from_response(err, response).into()
    }))
    .app_data(web::FormConfig::default().error_handler(|err, _req| {
        let response = LedgerError::invalid_input(err.to_string()).error_response();
        InternalError::from_response(err, response).into()
    }))
    .service(status::ping)
    .service(auth::signup)
    .service(auth::login_access_token)
    .service(auth::login_guest)
    .service(auth::convert_guest)
    .service(auth::me)
    .service(groups::join_by_token)
    .service(groups::create_group)
    .service(groups::list_groups)
    .service(groups::join_group)
    .service(groups::create_invite)
    .service(groups::list_members)
    .service(groups::list_expenses)
    .service(groups::group_balances)
    .service(expenses::create_expense)
    .service(expenses::get_expense)
    .service(expenses::settle_share);
}
