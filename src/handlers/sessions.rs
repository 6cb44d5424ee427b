use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};

/// `GET /api/v1/sessions/{id}`: live snapshot of an interview session.
pub async fn get_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let snapshot = state.conversation.snapshot(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}
