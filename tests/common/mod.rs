//! Shared fixtures for the HTTP integration tests

#![allow(dead_code)]

use axum::http::HeaderValue;
use axum_test::TestServer;
use chrono::{TimeZone, Utc};
use numismatics::prelude::*;

pub const ADMIN: &str = "admin";
pub const COLLECTOR: &str = "collector";
pub const COLLECTOR_PASSWORD: &str = "s3cret";

pub const MONEY_HEADER: &str =
    "id,description,nominal_price,release_year,serial_number,type_money,currency,mint,issuing_state,user\r\n";

/// Default schema with one public and one admin-only resource
pub fn test_resources() -> ResourcesConfig {
    let mut resources = ResourcesConfig::default_config();
    for resource in &mut resources.resources {
        match resource.name.as_str() {
            "mint" => resource.read_policy = AuthPolicy::Public,
            "transfer" => resource.read_policy = AuthPolicy::AdminOnly,
            _ => {}
        }
    }
    resources
}

fn coin(
    id: i64,
    description: &str,
    year: &str,
    serial: Option<&str>,
    mint: i64,
) -> Record {
    Record::new()
        .with("id", id)
        .with("description", description)
        .with("nominal_price", id * 5)
        .with("release_year", year)
        .with("serial_number", serial)
        .with("type_money", 1)
        .with("currency", 1)
        .with("mint", mint)
        .with("issuing_state", 1)
        .with("user", 1)
}

/// Store with three live coins, one deleted coin, mints and one transfer
pub fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store
        .extend(
            "money",
            vec![
                coin(1, "Thaler, 1780", "1780", Some("A-1"), 2),
                coin(2, "So-called \"Trade\" dollar", "1873", None, 1),
                coin(3, "Line one\nLine two", "1990", Some("C-3"), 1),
                coin(4, "Melted down", "1901", Some("D-4"), 1)
                    .with("deleted_at", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            ],
        )
        .unwrap();
    store
        .extend(
            "mint",
            vec![Record::new().with("id", 1), Record::new().with("id", 2)],
        )
        .unwrap();
    store
        .insert(
            "transfer",
            Record::new()
                .with("id", 1)
                .with("source", 1)
                .with("destination", 2)
                .with("creater", 1)
                .with("created_at", Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap())
                .with("closed_at", None::<DateTime<Utc>>)
                .with("comment", "swap")
                .with("money", 3)
                .with("status", "open"),
        )
        .unwrap();
    store
}

pub fn identity() -> InMemoryIdentityProvider {
    InMemoryIdentityProvider::new()
        .with_account(Account::new(1, ADMIN, true))
        .and_then(|p| p.with_password(Account::new(2, COLLECTOR, false), COLLECTOR_PASSWORD))
        .expect("register test accounts")
}

pub fn server_with_store(store: impl ResourceStore + 'static) -> TestServer {
    let app = ServerBuilder::new()
        .with_resources(test_resources())
        .with_store(store)
        .with_identity_provider(identity())
        .build()
        .expect("Failed to build app");

    TestServer::try_new(app).expect("Failed to create test server")
}

pub fn create_test_server() -> TestServer {
    server_with_store(seeded_store())
}

pub fn basic(username: &str, password: &str) -> HeaderValue {
    HeaderValue::from_str(&BasicCredentials::new(username, password).to_header_value())
        .expect("valid header value")
}

pub fn admin_auth() -> HeaderValue {
    basic(ADMIN, "")
}

pub fn collector_auth() -> HeaderValue {
    basic(COLLECTOR, COLLECTOR_PASSWORD)
}
