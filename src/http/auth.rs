use actix_web::{get, post, web, HttpResponse};

use super::dto::{ConvertGuestRequest, LoginForm, SignupRequest, TokenResponse, UserPublic};
use super::error::ApiResult;
use super::extract::CurrentUser;
use super::AppState;
use crate::accounts::{GuestConversion, NewAccount};

#[post("/auth/signup")]
pub async fn signup(
    state: web::Data<AppState>,
    json: web::Json<SignupRequest>,
) -> ApiResult<HttpResponse> {
    let request = json.into_inner();
    let user = state
        .accounts
        .signup(NewAccount {
            email: request.email,
            username: request.username,
            first_name: request.first_name,
            last_name: request.last_name,
            password: request.password,
        })
        .await?;
    Ok(HttpResponse::Ok().json(UserPublic::from(&user)))
}

#[post("/auth/login/access-token")]
pub async fn login_access_token(
    state: web::Data<AppState>,
    form: web::Form<LoginForm>,
) -> ApiResult<HttpResponse> {
    let issued = state
        .accounts
        .login(&form.username, &form.password)
        .await?;
    Ok(HttpResponse::Ok().json(TokenResponse::bearer(issued.token)))
}

#[post("/auth/login/guest")]
pub async fn login_guest(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let issued = state.accounts.guest_login().await?;
    Ok(HttpResponse::Ok().json(TokenResponse::bearer(issued.token)))
}

#[post("/auth/convert-guest")]
pub async fn convert_guest(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    json: web::Json<ConvertGuestRequest>,
) -> ApiResult<HttpResponse> {
    let request = json.into_inner();
    let user = state
        .accounts
        .convert_guest(
            user.id,
            GuestConversion {
                email: request.email,
                username: request.username,
                password: request.password,
                first_name: request.first_name,
                last_name: request.last_name,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(UserPublic::from(&user)))
}

#[get("/auth/me")]
pub async fn me(CurrentUser(user): CurrentUser) -> HttpResponse {
    HttpResponse::Ok().json(UserPublic::from(&user))
}
