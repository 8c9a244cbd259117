use actix_web::dev::Payload;
use actix_web::http::header::{self, HeaderValue};
use actix_web::{web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;

use super::AppState;
use crate::error::LedgerError;
use crate::schemas::User;

/// The user named by the request's `Authorization: Bearer` login token.
pub struct CurrentUser(pub User);

impl FromRequest for CurrentUser {
    type Error = LedgerError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let token = bearer_token(req);
        Box::pin(async move {
            let state = state
                .ok_or_else(|| LedgerError::InvalidState("application state missing".into()))?;
            let token = token.ok_or_else(|| LedgerError::unauthenticated("Not authenticated"))?;
            let user = state.accounts.authenticate(&token).await?;
            Ok(CurrentUser(user))
        })
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    let token = authorization.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}
