//! Catalogue management service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookDetails, BookQuery, CreateBook, UpdateBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogueService {
    repository: Repository,
}

impl CatalogueService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search books with filters
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<BookDetails>, i64)> {
        self.repository.books.search(query).await
    }

    /// Get a book joined with its current active loan
    pub async fn get_book(&self, id: i32) -> AppResult<BookDetails> {
        self.repository.books.get_details(id).await
    }

    /// Add a book to the catalogue
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        // An empty ISBN means "no ISBN" and is exempt from uniqueness,
        // matching the partial index.
        if let Some(ref isbn) = book.isbn {
            if !isbn.is_empty() && self.repository.books.isbn_exists(isbn, None).await? {
                return Err(AppError::Conflict(
                    "A book with this ISBN already exists".to_string(),
                ));
            }
        }

        let created = self.repository.books.create(&book).await?;
        tracing::info!(book_id = created.id, "book created");
        Ok(created)
    }

    /// Update book metadata (patch semantics, see `UpdateBook`)
    pub async fn update_book(&self, id: i32, patch: UpdateBook) -> AppResult<Book> {
        if let Some(ref isbn) = patch.isbn {
            if !isbn.is_empty() && self.repository.books.isbn_exists(isbn, Some(id)).await? {
                return Err(AppError::Conflict(
                    "A book with this ISBN already exists".to_string(),
                ));
            }
        }

        self.repository.books.update(id, &patch).await
    }

    /// Remove a book from the catalogue. Refused while it is borrowed.
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, "book deleted");
        Ok(())
    }
}
