//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, health, loans, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stacks API",
        version = "1.0.0",
        description = "Campus Library Catalogue REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::me,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Users
        users::list_users,
        users::update_role,
        // Loans
        loans::borrow_book,
        loans::return_book,
        loans::my_loans,
        loans::book_loans,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::TokenResponse,
            // Books
            books::PaginatedBooks,
            books::PaginatedUsers,
            crate::models::book::Book,
            crate::models::book::BookDetails,
            crate::models::book::BookStatus,
            crate::models::book::BookQuery,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Users
            crate::models::user::User,
            crate::models::user::Role,
            crate::models::user::RegisterUser,
            crate::models::user::UserQuery,
            crate::models::user::UpdateRole,
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::LoanDetails,
            loans::BorrowResponse,
            loans::ReturnResponse,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
            crate::error::ErrorKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "books", description = "Catalogue management"),
        (name = "users", description = "User administration"),
        (name = "loans", description = "Borrow and return operations")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
