// tests/common/mod.rs

#![allow(dead_code)]

use std::{str::FromStr, sync::Arc};

use campus::{
    config::Config,
    ranking::RecencyLocale,
    routes,
    state::AppState,
    store::{MemoryStore, PgStore, SharedStore},
};
use serde_json::{Value, json};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

/// A registered and logged-in student.
pub struct Session {
    pub id: i64,
    pub token: String,
}

/// Postgres when `DATABASE_URL` is set, otherwise the in-memory store.
///
/// Each Postgres store gets its own schema with the migrations applied, so
/// tests can reuse usernames and see only their own rows.
pub async fn test_store() -> SharedStore {
    let Some(database_url) = std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()) else {
        return Arc::new(MemoryStore::new());
    };

    let schema = format!("campus_it_{}", uuid::Uuid::new_v4().simple());
    let admin = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");
    sqlx::query(&format!("CREATE SCHEMA {}", schema))
        .execute(&admin)
        .await
        .expect("Failed to create test schema");

    let options = PgConnectOptions::from_str(&database_url)
        .expect("DATABASE_URL must be a Postgres URL")
        .options([("search_path", schema.as_str())]);
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("Failed to connect to the test schema");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Arc::new(PgStore::new(pool))
}

/// Spawns the app on a random port over a fresh store.
pub async fn spawn_app() -> TestApp {
    let config = Config {
        database_url: None,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        recency_locale: RecencyLocale::English,
        recency_locale_error: None,
        port: 0,
    };

    let state = AppState::new(test_store().await, config);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn register(&self, username: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "username": username,
                "password": "password123",
                "first_name": "Test",
                "last_name": "Student"
            }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Registers `username` and logs in.
    pub async fn student(&self, username: &str) -> Session {
        let registered: Value = self.register(username).await.json().await.unwrap();
        let login: Value = self
            .login(username, "password123")
            .await
            .json()
            .await
            .unwrap();

        Session {
            id: registered["id"].as_i64().expect("student id"),
            token: login["token"].as_str().expect("token").to_string(),
        }
    }

    pub async fn get(&self, session: &Session, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(&session.token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, session: &Session, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(&session.token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, session: &Session, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(&session.token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, session: &Session, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(&session.token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates a post with one photo and returns its JSON.
    pub async fn create_post(&self, session: &Session, tagged: &[&str]) -> Value {
        let response = self
            .post(
                session,
                "/api/posts",
                json!({
                    "description": "Spring festival",
                    "photos": ["https://cdn.campus.test/photo.jpg"],
                    "tagged_usernames": tagged
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }

    pub async fn post_score(&self, session: &Session, post_id: i64) -> i64 {
        let post: Value = self
            .get(session, &format!("/api/posts/{}", post_id))
            .await
            .json()
            .await
            .unwrap();
        post["popularity_score"].as_i64().unwrap()
    }
}
