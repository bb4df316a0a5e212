//! Loans repository: the borrow/return state machine.
//!
//! Both transitions run inside a single transaction so the book row and the
//! loan ledger can never drift apart: either both writes commit or neither
//! does. Racing borrows are serialized by the conditional status update;
//! the partial unique index on open loans backs the same invariant at the
//! schema level.

use chrono::Utc;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::loan::{due_date_for, Loan, LoanDetails},
};

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Borrow a book: flip its status and open a loan, atomically.
    ///
    /// When several callers race on the same available book, the conditional
    /// update lets exactly one of them through; the rest see zero rows
    /// affected and fail with `InvalidState`.
    pub async fn borrow(&self, user_id: i32, book_id: i32) -> AppResult<Loan> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let flipped = sqlx::query(
            r#"
            UPDATE books SET status = 'borrowed', updated_at = $2
            WHERE id = $1 AND status = 'available'
            "#,
        )
        .bind(book_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if flipped == 0 {
            // Distinguish a missing book from one that is already out.
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
                    .bind(book_id)
                    .fetch_one(&mut *tx)
                    .await?;

            return Err(if exists {
                AppError::InvalidState("Book is not available".to_string())
            } else {
                AppError::NotFound(format!("Book with id {} not found", book_id))
            });
        }

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (user_id, book_id, borrowed_at, due_date)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, book_id, borrowed_at, due_date, returned_at
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(now)
        .bind(due_date_for(now))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id,
            book_id,
            loan_id = loan.id,
            "book borrowed, due {}",
            loan.due_date
        );

        Ok(loan)
    }

    /// Return a book: close its open loan and free the book, atomically.
    ///
    /// Only the borrower or an admin may close the loan; the check runs
    /// against the locked loan row so a racing return cannot close it twice.
    pub async fn return_book(
        &self,
        book_id: i32,
        user_id: i32,
        is_admin: bool,
    ) -> AppResult<Loan> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            SELECT id, user_id, book_id, borrowed_at, due_date, returned_at
            FROM loans
            WHERE book_id = $1 AND returned_at IS NULL
            ORDER BY borrowed_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::InvalidState("No active loan for this book".to_string()))?;

        if !is_admin && loan.user_id != user_id {
            return Err(AppError::Authorization(
                "Only the borrower or an administrator may return this book".to_string(),
            ));
        }

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET returned_at = $2 WHERE id = $1
            RETURNING id, user_id, book_id, borrowed_at, due_date, returned_at
            "#,
        )
        .bind(loan.id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE books SET status = 'available', updated_at = $2 WHERE id = $1")
            .bind(book_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(user_id, book_id, loan_id = loan.id, "book returned");

        Ok(loan)
    }

    /// Get the open loan for a book, if any
    pub async fn find_active_by_book(&self, book_id: i32) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            SELECT id, user_id, book_id, borrowed_at, due_date, returned_at
            FROM loans
            WHERE book_id = $1 AND returned_at IS NULL
            ORDER BY borrowed_at DESC
            LIMIT 1
            "#,
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(loan)
    }

    /// Get loans for a user, open loans first
    pub async fn find_by_user(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        let loans = sqlx::query_as::<_, LoanDetails>(
            r#"
            SELECT l.id, l.book_id, b.title AS book_title, b.author AS book_author,
                   l.user_id, u.name AS user_name,
                   l.borrowed_at, l.due_date, l.returned_at
            FROM loans l
            JOIN books b ON b.id = l.book_id
            JOIN users u ON u.id = l.user_id
            WHERE l.user_id = $1
            ORDER BY l.returned_at IS NOT NULL, l.borrowed_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    /// Full loan history for a book, most recent first
    pub async fn find_history_by_book(&self, book_id: i32) -> AppResult<Vec<LoanDetails>> {
        let loans = sqlx::query_as::<_, LoanDetails>(
            r#"
            SELECT l.id, l.book_id, b.title AS book_title, b.author AS book_author,
                   l.user_id, u.name AS user_name,
                   l.borrowed_at, l.due_date, l.returned_at
            FROM loans l
            JOIN books b ON b.id = l.book_id
            JOIN users u ON u.id = l.user_id
            WHERE l.book_id = $1
            ORDER BY l.borrowed_at DESC
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    /// Count of currently open loans
    pub async fn count_active(&self) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE returned_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
