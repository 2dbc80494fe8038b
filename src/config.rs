// src/config.rs

use std::env;
use dotenvy::dotenv;

use crate::ranking::RecencyLocale;

#[derive(Debug, Clone)]
pub struct Config {
    /// Absent means the in-memory store is used.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub recency_locale: RecencyLocale,
    /// Why `RECENCY_LOCALE` was ignored. Logged once tracing is up.
    pub recency_locale_error: Option<String>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86_400);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let (recency_locale, recency_locale_error) =
            parse_recency_locale(env::var("RECENCY_LOCALE").ok().as_deref());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            recency_locale,
            recency_locale_error,
            port,
        }
    }
}

/// Unset means English; an unknown value also falls back to English and
/// returns the parse error alongside.
fn parse_recency_locale(raw: Option<&str>) -> (RecencyLocale, Option<String>) {
    match raw.map(str::parse::<RecencyLocale>) {
        None => (RecencyLocale::English, None),
        Some(Ok(locale)) => (locale, None),
        Some(Err(e)) => (RecencyLocale::English, Some(e)),
    }
}
