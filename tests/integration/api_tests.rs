//! API integration tests
//!
//! These run against a live server with a fresh database:
//! `cargo run` in one terminal, then `cargo test -- --ignored`.

use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const BASE_URL: &str = "http://localhost:8080/api/v1";

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// A unique suffix per call so tests never collide on registration
fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}x{}", nanos, n)
}

fn unique_email(prefix: &str) -> String {
    format!("{}-{}@campus.edu", prefix, unique_suffix())
}

/// Log in as the bootstrap admin
async fn admin_token(client: &Client) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": "admin@stacks.local",
            "password": "admin123"
        }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

/// Register a fresh student and return (token, user_id)
async fn register_student(client: &Client, prefix: &str) -> (String, i64) {
    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "email": unique_email(prefix),
            "password": "correct-horse",
            "name": prefix
        }))
        .send()
        .await
        .expect("Failed to send register request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    let token = body["token"].as_str().expect("No token").to_string();
    let user_id = body["user"]["id"].as_i64().expect("No user id");
    (token, user_id)
}

/// Create a book as admin and return its id
async fn create_book(client: &Client, admin: &str, title: &str) -> i64 {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .header("Authorization", format!("Bearer {}", admin))
        .json(&json!({
            "title": title,
            "author": "Test Author",
            "category": "fiction"
        }))
        .send()
        .await
        .expect("Failed to send create book request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_i64().expect("No book id")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_register_and_login() {
    let client = Client::new();
    let email = unique_email("login-test");

    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "email": email,
            "password": "correct-horse",
            "name": "Login Test"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["user"]["role"], "student");
    assert!(body["user"]["password_hash"].is_null());

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": email,
            "password": "correct-horse"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": "admin@stacks.local",
            "password": "wrong"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["error"], "unauthenticated");
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_student_cannot_create_book() {
    let client = Client::new();
    let (student, _) = register_student(&client, "no-create").await;

    let response = client
        .post(format!("{}/books", BASE_URL))
        .header("Authorization", format!("Bearer {}", student))
        .json(&json!({"title": "Forbidden", "author": "Nobody"}))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["error"], "forbidden");
}

/// The full circulation scenario: create, borrow, double-borrow rejection,
/// foreign return rejection, owner return, re-lendable.
#[tokio::test]
#[ignore]
async fn test_borrow_return_lifecycle() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (student_a, _) = register_student(&client, "borrower-a").await;
    let (student_b, _) = register_student(&client, "borrower-b").await;

    let book_id = create_book(&client, &admin, "Lifecycle Book").await;

    // Fresh book is available with no due date
    let body: Value = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", student_a))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "available");
    assert!(body["current_due_date"].is_null());

    // Student A borrows
    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", student_a))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert!(body["due_date"].is_string());

    // Book is now borrowed and exposes the due date
    let body: Value = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", student_a))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "borrowed");
    assert!(body["current_due_date"].is_string());

    // Student B cannot borrow the same book
    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", student_b))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_state");

    // Student B cannot return A's loan either
    let response = client
        .post(format!("{}/books/{}/return", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", student_b))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    // Student A returns it
    let response = client
        .post(format!("{}/books/{}/return", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", student_a))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "returned");
    assert!(body["returned_at"].is_string());

    // Book is available again, no due date
    let body: Value = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", student_a))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "available");
    assert!(body["current_due_date"].is_null());

    // Returning again fails: no active loan
    let response = client
        .post(format!("{}/books/{}/return", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", student_a))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // And student B can now borrow it
    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", student_b))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
}

#[tokio::test]
#[ignore]
async fn test_admin_can_return_any_loan() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (student, _) = register_student(&client, "force-return").await;

    let book_id = create_book(&client, &admin, "Force Return Book").await;

    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", student))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    // Admin closes the student's loan
    let response = client
        .post(format!("{}/books/{}/return", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", admin))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
}

/// N racing borrows on one book: exactly one succeeds, one loan row exists.
#[tokio::test]
#[ignore]
async fn test_concurrent_borrows_single_winner() {
    const RACERS: usize = 8;

    let client = Client::new();
    let admin = admin_token(&client).await;
    let book_id = create_book(&client, &admin, "Contended Book").await;

    let mut tokens = Vec::new();
    for i in 0..RACERS {
        let (token, _) = register_student(&client, &format!("racer-{}", i)).await;
        tokens.push(token);
    }

    let handles: Vec<_> = tokens
        .into_iter()
        .map(|token| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .post(format!("{}/books/{}/borrow", BASE_URL, book_id))
                    .header("Authorization", format!("Bearer {}", token))
                    .send()
                    .await
                    .expect("Failed to send borrow request")
                    .status()
                    .as_u16()
            })
        })
        .collect();

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }

    let wins = statuses.iter().filter(|&&s| s == 201).count();
    let rejections = statuses.iter().filter(|&&s| s == 400).count();
    assert_eq!(wins, 1, "exactly one racer should win: {:?}", statuses);
    assert_eq!(rejections, RACERS - 1);

    // The ledger holds a single loan for this book
    let body: Value = client
        .get(format!("{}/books/{}/loans", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", admin))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
#[ignore]
async fn test_update_book_patch_semantics() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let book_id = create_book(&client, &admin, "Patch Book").await;

    // Omitted fields keep their values
    let response = client
        .put(format!("{}/books/{}", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", admin))
        .json(&json!({"title": "Patched Title"}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["title"], "Patched Title");
    assert_eq!(body["author"], "Test Author");
    assert_eq!(body["category"], "fiction");

    // An explicit empty string clears the field
    let response = client
        .put(format!("{}/books/{}", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", admin))
        .json(&json!({"category": ""}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["category"], "");
    assert_eq!(body["title"], "Patched Title");
}

/// Clearing the ISBN on several books must not trip uniqueness: an empty
/// ISBN means "no ISBN" and is exempt, like NULL.
#[tokio::test]
#[ignore]
async fn test_clearing_isbn_on_two_books() {
    let client = Client::new();
    let admin = admin_token(&client).await;

    let mut book_ids = Vec::new();
    for i in 0..2 {
        let response = client
            .post(format!("{}/books", BASE_URL))
            .header("Authorization", format!("Bearer {}", admin))
            .json(&json!({
                "title": format!("ISBN Clear {}", i),
                "author": "Test Author",
                "isbn": format!("978-{}-{}", unique_suffix(), i)
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.unwrap();
        book_ids.push(body["id"].as_i64().unwrap());
    }

    // Clear both ISBNs; the second clear must succeed too
    for book_id in &book_ids {
        let response = client
            .put(format!("{}/books/{}", BASE_URL, book_id))
            .header("Authorization", format!("Bearer {}", admin))
            .json(&json!({"isbn": ""}))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["isbn"], "");
    }
}

/// A metadata edit while a book is out must not flip it back to available
#[tokio::test]
#[ignore]
async fn test_update_cannot_break_loan_invariant() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (student, _) = register_student(&client, "invariant").await;
    let book_id = create_book(&client, &admin, "Invariant Book").await;

    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", student))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    // Patch metadata; the status key is not part of the patch type and the
    // stored status is recomputed from the ledger.
    let response = client
        .put(format!("{}/books/{}", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", admin))
        .json(&json!({"title": "Still Borrowed", "status": "available"}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "borrowed");
}

#[tokio::test]
#[ignore]
async fn test_delete_borrowed_book_refused() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (student, _) = register_student(&client, "delete-guard").await;
    let book_id = create_book(&client, &admin, "Delete Guard Book").await;

    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", student))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let response = client
        .delete(format!("{}/books/{}", BASE_URL, book_id))
        .header("Authorization", format!("Bearer {}", admin))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
#[ignore]
async fn test_my_loans_lists_open_loans_first() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (student, user_id) = register_student(&client, "my-loans").await;

    let first = create_book(&client, &admin, "My Loans A").await;
    let second = create_book(&client, &admin, "My Loans B").await;

    for book_id in [first, second] {
        let response = client
            .post(format!("{}/books/{}/borrow", BASE_URL, book_id))
            .header("Authorization", format!("Bearer {}", student))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
    }

    // Return the first one
    let response = client
        .post(format!("{}/books/{}/return", BASE_URL, first))
        .header("Authorization", format!("Bearer {}", student))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: Value = client
        .get(format!("{}/auth/me/loans", BASE_URL))
        .header("Authorization", format!("Bearer {}", student))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let loans = body.as_array().unwrap();
    assert_eq!(loans.len(), 2);
    // Open loan first, closed loan after
    assert!(loans[0]["returned_at"].is_null());
    assert_eq!(loans[0]["book_id"].as_i64().unwrap(), second);
    assert!(loans[1]["returned_at"].is_string());
    assert_eq!(loans[0]["user_id"].as_i64().unwrap(), user_id);
}

#[tokio::test]
#[ignore]
async fn test_catalogue_search_filters() {
    let client = Client::new();
    let admin = admin_token(&client).await;

    let marker = unique_suffix();
    let response = client
        .post(format!("{}/books", BASE_URL))
        .header("Authorization", format!("Bearer {}", admin))
        .json(&json!({
            "title": format!("Searchable {}", marker),
            "author": "Ursula Vernon",
            "category": "sci-fi"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let body: Value = client
        .get(format!("{}/books?search={}", BASE_URL, marker))
        .header("Authorization", format!("Bearer {}", admin))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["total"].as_i64().unwrap(), 1);
    assert_eq!(body["items"][0]["author"], "Ursula Vernon");
}
