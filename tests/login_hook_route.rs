use atmail_import::config::{MigrationConfig, MigrationOptions};
use atmail_import::migration::{ContactMigration, SharedLoginHook};
use atmail_import::models::{LegacyContactRow, LegacyGroupRow, UserContext};
use atmail_import::routes::hooks::{LoginHookResponse, login_hook};
use atmail_import::test_support::{
    MemoryContactStore, MemoryLegacyConnector, MemoryLegacyStore, TestRocketBuilder,
};
use rocket::http::{Header, Status};
use rocket::routes;
use std::sync::Arc;

fn legacy_for(user: &UserContext) -> MemoryLegacyStore {
    let row = LegacyContactRow {
        first_name: "Ann".into(),
        last_name: "Lee".into(),
        emails: [
            "ann@example.com".into(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ],
        ..Default::default()
    };
    MemoryLegacyStore::new()
        .with_contacts(user, vec![row])
        .with_groups(
            user,
            vec![
                LegacyGroupRow::new("Friends", ""),
                LegacyGroupRow::new("Friends", "ann@example.com"),
            ],
        )
}

fn hook(connector: MemoryLegacyConnector, store: &MemoryContactStore) -> SharedLoginHook {
    Arc::new(ContactMigration::new(
        connector,
        store.clone(),
        MigrationOptions::default(),
    ))
}

#[test]
fn login_imports_contacts_for_header_user() {
    let user = UserContext::new("alice");
    let store = MemoryContactStore::new();
    let client = TestRocketBuilder::new()
        .mount_api_routes(routes![login_hook])
        .manage_login_hook(hook(MemoryLegacyConnector::new(legacy_for(&user)), &store))
        .blocking_client();

    let response = client
        .post("/api/v1/hooks/login")
        .header(Header::new("X-Authenticated-User", "Alice"))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let payload: LoginHookResponse = response.into_json().expect("valid JSON payload");
    assert!(payload.completed);
    assert_eq!(store.contacts(&user).len(), 1);
    assert_eq!(store.members().len(), 1);
}

#[test]
fn missing_user_header_is_unauthorized() {
    let store = MemoryContactStore::new();
    let client = TestRocketBuilder::new()
        .mount_api_routes(routes![login_hook])
        .manage_login_hook(hook(MemoryLegacyConnector::unreachable(), &store))
        .blocking_client();

    let response = client.post("/api/v1/hooks/login").dispatch();
    assert_eq!(response.status(), Status::Unauthorized);

    let body: serde_json::Value = response.into_json().expect("valid JSON error");
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["message"], "missing X-Authenticated-User header");
    assert_eq!(store.write_calls(), 0);
}

#[test]
fn unreachable_legacy_store_reports_incomplete() {
    let store = MemoryContactStore::new();
    let client = TestRocketBuilder::new()
        .mount_api_routes(routes![login_hook])
        .manage_login_hook(hook(MemoryLegacyConnector::unreachable(), &store))
        .blocking_client();

    let response = client
        .post("/api/v1/hooks/login")
        .header(Header::new("X-Authenticated-User", "bob"))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let payload: LoginHookResponse = response.into_json().expect("valid JSON payload");
    assert!(!payload.completed);
    assert_eq!(store.write_calls(), 0);
}

#[test]
fn configured_header_name_is_honored() {
    let user = UserContext::new("carol");
    let store = MemoryContactStore::new();
    let config = MigrationConfig {
        user_header: "X-Remote-User".to_string(),
        ..MigrationConfig::from_env()
    };
    let client = TestRocketBuilder::new()
        .mount_api_routes(routes![login_hook])
        .manage_login_hook(hook(MemoryLegacyConnector::new(legacy_for(&user)), &store))
        .manage_config(config)
        .blocking_client();

    let ignored = client
        .post("/api/v1/hooks/login")
        .header(Header::new("X-Authenticated-User", "carol"))
        .dispatch();
    assert_eq!(ignored.status(), Status::Unauthorized);

    let accepted = client
        .post("/api/v1/hooks/login")
        .header(Header::new("X-Remote-User", "carol"))
        .dispatch();
    assert_eq!(accepted.status(), Status::Ok);
    assert_eq!(store.contacts(&user).len(), 1);
}
