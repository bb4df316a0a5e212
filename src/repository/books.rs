//! Books repository for database operations

use chrono::Utc;
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookDetails, BookQuery, CreateBook, UpdateBook},
};

/// Subquery exposing the due date of a book's open loan. At most one such
/// loan exists per book; the ordering keeps the pick deterministic anyway.
const CURRENT_DUE_DATE: &str = r#"(
    SELECT l.due_date FROM loans l
    WHERE l.book_id = b.id AND l.returned_at IS NULL
    ORDER BY l.borrowed_at DESC
    LIMIT 1
) AS current_due_date"#;

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, isbn, category, description, status,
                   created_at, updated_at
            FROM books WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Get book by ID joined with its current active loan
    pub async fn get_details(&self, id: i32) -> AppResult<BookDetails> {
        let query = format!(
            r#"
            SELECT b.id, b.title, b.author, b.isbn, b.category, b.description,
                   b.status, {CURRENT_DUE_DATE}, b.created_at, b.updated_at
            FROM books b
            WHERE b.id = $1
            "#
        );

        sqlx::query_as::<_, BookDetails>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Check whether an ISBN is already in the catalogue
    pub async fn isbn_exists(&self, isbn: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND ($2::int IS NULL OR id != $2))",
        )
        .bind(isbn)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    /// Search books with filters and pagination
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<BookDetails>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books b WHERE 1=1");
        push_filters(&mut count_qb, query);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut select_qb = QueryBuilder::<Postgres>::new(format!(
            r#"
            SELECT b.id, b.title, b.author, b.isbn, b.category, b.description,
                   b.status, {CURRENT_DUE_DATE}, b.created_at, b.updated_at
            FROM books b
            WHERE 1=1
            "#
        ));
        push_filters(&mut select_qb, query);
        select_qb.push(" ORDER BY b.title LIMIT ");
        select_qb.push_bind(per_page);
        select_qb.push(" OFFSET ");
        select_qb.push_bind(offset);

        let books = select_qb
            .build_query_as::<BookDetails>()
            .fetch_all(&self.pool)
            .await?;

        Ok((books, total))
    }

    // =========================================================================
    // CREATE
    // =========================================================================

    /// Create a new book (status defaults to available)
    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let now = Utc::now();

        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, isbn, category, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id, title, author, isbn, category, description, status,
                      created_at, updated_at
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.category)
        .bind(&book.description)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    // =========================================================================
    // UPDATE
    // =========================================================================

    /// Merge a metadata patch into an existing book.
    ///
    /// Absent fields keep their stored value via COALESCE. The status column
    /// is recomputed from the loan ledger rather than taken from the caller,
    /// so a metadata edit can never mark a borrowed book available.
    pub async fn update(&self, id: i32, patch: &UpdateBook) -> AppResult<Book> {
        let now = Utc::now();

        sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                isbn = COALESCE($4, isbn),
                category = COALESCE($5, category),
                description = COALESCE($6, description),
                status = CASE WHEN EXISTS (
                    SELECT 1 FROM loans l
                    WHERE l.book_id = books.id AND l.returned_at IS NULL
                ) THEN 'borrowed' ELSE 'available' END,
                updated_at = $7
            WHERE id = $1
            RETURNING id, title, author, isbn, category, description, status,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&patch.title)
        .bind(&patch.author)
        .bind(&patch.isbn)
        .bind(&patch.category)
        .bind(&patch.description)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    // =========================================================================
    // DELETE
    // =========================================================================

    /// Delete a book. Refused while a loan is open.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let borrowed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE book_id = $1 AND returned_at IS NULL)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        if borrowed {
            return Err(AppError::InvalidState(
                "Book has an active loan and cannot be deleted".to_string(),
            ));
        }

        let deleted = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        Ok(())
    }
}

/// Append WHERE conditions for a catalogue query, binding every value
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &BookQuery) {
    if let Some(ref title) = query.title {
        qb.push(" AND b.title ILIKE ");
        qb.push_bind(format!("%{}%", title));
    }

    if let Some(ref author) = query.author {
        qb.push(" AND b.author ILIKE ");
        qb.push_bind(format!("%{}%", author));
    }

    if let Some(ref category) = query.category {
        qb.push(" AND b.category = ");
        qb.push_bind(category.clone());
    }

    if let Some(status) = query.status {
        qb.push(" AND b.status = ");
        qb.push_bind(status.as_str());
    }

    if let Some(ref search) = query.search {
        let term = format!("%{}%", search);
        qb.push(" AND (b.title ILIKE ");
        qb.push_bind(term.clone());
        qb.push(" OR b.author ILIKE ");
        qb.push_bind(term.clone());
        qb.push(" OR b.isbn ILIKE ");
        qb.push_bind(term.clone());
        qb.push(" OR b.category ILIKE ");
        qb.push_bind(term);
        qb.push(")");
    }
}
