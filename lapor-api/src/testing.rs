//! Fixtures shared by the unit and router tests.

use std::sync::{Arc, OnceLock};

use metrics_exporter_prometheus::PrometheusBuilder;
use uuid::Uuid;

use lapor_shared::types::auth::Role;

use crate::blob::memory::MemoryBlobStore;
use crate::blob::BlobStore;
use crate::config::AppConfig;
use crate::guard::Actor;
use crate::models::{NewUser, User};
use crate::services::passwords;
use crate::services::sessions;
use crate::store::memory::MemoryStore;
use crate::store::Store;
use crate::AppState;

pub const TEST_PASSWORD: &str = "password123";

/// Argon2 is slow in debug builds; hash the shared password once.
fn test_password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| passwords::hash_password(TEST_PASSWORD).unwrap())
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: "test-secret".into(),
        max_photo_bytes: 64 * 1024,
        ..AppConfig::default()
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
}

pub fn test_app() -> TestApp {
    test_app_with(test_config())
}

pub fn test_app_with(config: AppConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let state = Arc::new(AppState {
        config,
        store: store.clone(),
        blobs: blobs.clone(),
        metrics_handle: PrometheusBuilder::new().build_recorder().handle(),
    });
    TestApp { state, store, blobs }
}

impl TestApp {
    /// Inserts a user whose password is [`TEST_PASSWORD`].
    pub fn seed_user(&self, role: Role, email: &str) -> User {
        let (national_id, phone) = match role {
            Role::Volunteer => {
                let nik = Uuid::new_v4().simple().to_string()[16..].to_string();
                (Some(nik), Some("081234567890".to_string()))
            }
            Role::Citizen | Role::Admin => (None, None),
        };
        self.store
            .insert_user(NewUser {
                name: format!("{role} user"),
                email: email.to_string(),
                password_hash: test_password_hash().to_string(),
                role,
                national_id,
                phone,
            })
            .unwrap()
    }

    pub fn actor(&self, role: Role, email: &str) -> Actor {
        Actor::from(&self.seed_user(role, email))
    }

    /// Seeds a user and returns its bearer token.
    pub fn login_as(&self, role: Role, email: &str) -> (User, String) {
        let user = self.seed_user(role, email);
        let pair = sessions::issue_session(&self.state, &user).unwrap();
        (user, pair.access_token)
    }

    pub async fn seed_photo(&self) -> String {
        let key = format!("reports/{}.jpg", Uuid::now_v7());
        self.blobs.put(&key, vec![0xFF, 0xD8, 0xFF], "image/jpeg").await.unwrap()
    }
}
