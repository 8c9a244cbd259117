use actix_web::{get, post, web, HttpResponse};

use super::dto::{body_id, path_id, ExpenseCreate, ExpenseRead};
use super::error::ApiResult;
use super::extract::CurrentUser;
use super::AppState;
use crate::ledger::NewExpense;

/// Records an expense paid by the caller, split across the group.
#[post("/expenses")]
pub async fn create_expense(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    json: web::Json<ExpenseCreate>,
) -> ApiResult<HttpResponse> {
    let request = json.into_inner();
    let record = state
        .ledger
        .record_expense(NewExpense {
            group_id: body_id(&request.group_id, "group_id")?,
            payer_id: user.id,
            amount: request.amount,
            description: request.description.unwrap_or_default(),
        })
        .await?;
    Ok(HttpResponse::Ok().json(ExpenseRead::from(&record)))
}

#[get("/expenses/{id}")]
pub async fn get_expense(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let expense_id = path_id(&id, "Expense")?;
    let record = state.ledger.get_expense_as(expense_id, user.id).await?;
    Ok(HttpResponse::Ok().json(ExpenseRead::from(&record)))
}

#[post("/expenses/{id}/shares/{user_id}/settle")]
pub async fn settle_share(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let (expense, participant) = path.into_inner();
    let expense_id = path_id(&expense, "Expense")?;
    let participant = path_id(&participant, "Share")?;
    let record = state
        .ledger
        .settle_share(expense_id, participant, user.id)
        .await?;
    Ok(HttpResponse::Ok().json(ExpenseRead::from(&record)))
}
