#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;
use shelfwise_core::storage_keys;
use shelfwise_session::{SessionStorage, StateStorage};

pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("shelfwise_session=debug"))
            .with_test_writer()
            .try_init();
    });
}

pub fn user_json() -> serde_json::Value {
    json!({
        "id": 7,
        "username": "ada",
        "email": "ada@example.com"
    })
}

pub fn seed_session(storage: &SessionStorage, authenticated: bool, remembering: bool) {
    let record = json!({
        "user": if authenticated { user_json() } else { serde_json::Value::Null },
        "isAuthenticated": authenticated,
        "hasInitialised": true,
        "remembering": remembering
    });
    storage
        .durable
        .set(storage_keys::SESSION, &record.to_string())
        .expect("seed session");
}

/// Seeds persistent cookies for the host mockito listens on.
pub fn seed_cookies(storage: &Arc<dyn StateStorage>, cookies: &[(&str, &str)]) {
    let entries: Vec<serde_json::Value> = cookies
        .iter()
        .map(|(name, value)| {
            json!({
                "name": name,
                "value": value,
                "path": "/",
                "secure": false,
                "expires": "2999-01-01T00:00:00Z"
            })
        })
        .collect();
    let jar = json!({ "127.0.0.1": entries });
    storage
        .set(storage_keys::CREDENTIALS, &jar.to_string())
        .expect("seed cookies");
}

pub fn has_session_record(storage: &Arc<dyn StateStorage>) -> bool {
    storage
        .get(storage_keys::SESSION)
        .expect("get session")
        .is_some()
}
