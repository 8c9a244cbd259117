use actix_web::{get, post, web, HttpResponse};

use super::dto::{
    path_id, timestamp, BalanceRead, ExpenseRead, GroupCreate, GroupRead, InviteResponse,
    JoinGroupRequest, MemberRead, Message,
};
use super::error::ApiResult;
use super::extract::CurrentUser;
use super::AppState;
use crate::error::LedgerError;
use crate::invites::JoinOutcome;
use crate::schemas::Role;

#[post("/groups")]
pub async fn create_group(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    json: web::Json<GroupCreate>,
) -> ApiResult<HttpResponse> {
    let request = json.into_inner();
    let group = state
        .registry
        .create_group_with_creator(&request.name, request.description, user.id)
        .await?;
    Ok(HttpResponse::Ok().json(GroupRead::from(&group)))
}

#[get("/groups")]
pub async fn list_groups(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<HttpResponse> {
    let groups = state.registry.groups_of(user.id).await?;
    let groups: Vec<GroupRead> = groups.iter().map(GroupRead::from).collect();
    Ok(HttpResponse::Ok().json(groups))
}

#[post("/groups/join-by-token")]
pub async fn join_by_token(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    json: web::Json<JoinGroupRequest>,
) -> ApiResult<HttpResponse> {
    let outcome = state
        .invitations
        .join_by_token(&json.token, user.id)
        .await?;
    let msg = match outcome {
        JoinOutcome::Joined => "Successfully joined the group via invite",
        JoinOutcome::AlreadyMember => "You are already in this group",
    };
    Ok(HttpResponse::Ok().json(Message::new(msg)))
}

#[post("/groups/{id}/join")]
pub async fn join_group(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let group_id = path_id(&id, "Group")?;
    state
        .registry
        .add_member(group_id, user.id, Role::Member)
        .await?;
    Ok(HttpResponse::Ok().json(Message::new("Successfully joined the group")))
}

#[post("/groups/{id}/invite")]
pub async fn create_invite(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let group_id = path_id(&id, "Group")?;
    let invite = state.invitations.create_invite(group_id, user.id).await?;
    Ok(HttpResponse::Ok().json(InviteResponse {
        qr_code_data: invite.url.clone(),
        invite_url: invite.url,
        expires_at: timestamp(invite.expires_at),
    }))
}

#[get("/groups/{id}/members")]
pub async fn list_members(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let group_id = path_id(&id, "Group")?;
    let members = state.registry.list_members(group_id).await?;
    if !members.iter().any(|member| member.user_id == user.id) {
        return Err(LedgerError::forbidden("You are not a member of this group."));
    }
    let members: Vec<MemberRead> = members.iter().map(MemberRead::from).collect();
    Ok(HttpResponse::Ok().json(members))
}

#[get("/groups/{id}/expenses")]
pub async fn list_expenses(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let group_id = path_id(&id, "Group")?;
    let records = state.ledger.list_group_expenses(group_id, user.id).await?;
    let expenses: Vec<ExpenseRead> = records.iter().map(ExpenseRead::from).collect();
    Ok(HttpResponse::Ok().json(expenses))
}

#[get("/groups/{id}/balances")]
pub async fn group_balances(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let group_id = path_id(&id, "Group")?;
    let balances = state.balances.group_balances(group_id, user.id).await?;
    let balances: Vec<BalanceRead> = balances
        .into_iter()
        .map(|(user_id, net)| BalanceRead {
            user_id: user_id.to_hex(),
            net,
        })
        .collect();
    Ok(HttpResponse::Ok().json(balances))
}
