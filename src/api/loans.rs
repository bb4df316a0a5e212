//! Borrow and return endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, models::loan::LoanDetails};

use super::AuthenticatedUser;

/// Borrow response with the computed due date
#[derive(Serialize, ToSchema)]
pub struct BorrowResponse {
    /// Loan ID
    pub loan_id: i32,
    /// Due date (ISO 8601 format)
    pub due_date: DateTime<Utc>,
    /// Status message
    pub message: String,
}

/// Return response
#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    /// Return status
    pub status: String,
    /// Loan ID that was closed
    pub loan_id: i32,
    /// When the book came back
    pub returned_at: Option<DateTime<Utc>>,
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/books/{id}/borrow",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 201, description = "Book borrowed", body = BorrowResponse),
        (status = 400, description = "Book is not available"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn borrow_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<(StatusCode, Json<BorrowResponse>)> {
    let loan = state.services.circulation.borrow(&claims, book_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(BorrowResponse {
            loan_id: loan.id,
            due_date: loan.due_date,
            message: "Book borrowed successfully".to_string(),
        }),
    ))
}

/// Return a borrowed book. Allowed for the borrower or an admin.
#[utoipa::path(
    post,
    path = "/books/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = ReturnResponse),
        (status = 400, description = "No active loan for this book"),
        (status = 403, description = "Not the borrower and not an admin")
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<Json<ReturnResponse>> {
    let loan = state
        .services
        .circulation
        .return_book(&claims, book_id)
        .await?;

    Ok(Json(ReturnResponse {
        status: "returned".to_string(),
        loan_id: loan.id,
        returned_at: loan.returned_at,
    }))
}

/// Get the calling user's loans, open loans first
#[utoipa::path(
    get,
    path = "/auth/me/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "The caller's loans", body = Vec<LoanDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn my_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.circulation.my_loans(&claims).await?;
    Ok(Json(loans))
}

/// Full loan history for a book (admin only)
#[utoipa::path(
    get,
    path = "/books/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Loan history", body = Vec<LoanDetails>),
        (status = 403, description = "Admin privileges required"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn book_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_admin()?;

    let loans = state.services.circulation.book_history(book_id).await?;
    Ok(Json(loans))
}
