//! Circulation service: borrow and return operations.
//!
//! Thin orchestration over the loans repository, which owns the
//! transactional state machine. Authorization context (who is asking, and
//! with what role) is threaded through on every call.

use crate::{
    error::AppResult,
    models::{
        loan::{Loan, LoanDetails},
        user::UserClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CirculationService {
    repository: Repository,
}

impl CirculationService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Borrow a book for the calling user. Any authenticated role may borrow.
    pub async fn borrow(&self, claims: &UserClaims, book_id: i32) -> AppResult<Loan> {
        self.repository.loans.borrow(claims.user_id, book_id).await
    }

    /// Return a book. Allowed for the borrower of the open loan, or an admin.
    pub async fn return_book(&self, claims: &UserClaims, book_id: i32) -> AppResult<Loan> {
        self.repository
            .loans
            .return_book(book_id, claims.user_id, claims.is_admin())
            .await
    }

    /// The calling user's loans, open loans first
    pub async fn my_loans(&self, claims: &UserClaims) -> AppResult<Vec<LoanDetails>> {
        self.repository.loans.find_by_user(claims.user_id).await
    }

    /// Full loan history for a book (admin view). Verifies the book exists.
    pub async fn book_history(&self, book_id: i32) -> AppResult<Vec<LoanDetails>> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.loans.find_history_by_book(book_id).await
    }
}
