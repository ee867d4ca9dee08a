//! Shared test harness: spins up the full server on an OS-assigned
//! port and drives it over HTTP.

#![allow(dead_code)]

use giro_license_server::auth::AuthLayer;
use giro_license_server::fraud::FraudDetector;
use giro_license_server::ratelimit::RateLimiter;
use giro_license_server::service::LicenseService;
use giro_license_server::{build_router, AppState, ServerConfig};
use giro_store::LicenseStore;
use std::net::SocketAddr;
use std::sync::Arc;

pub const ADMIN_EMAIL: &str = "admin@test.local";
pub const ADMIN_PASSWORD: &str = "correct horse battery staple";
pub const API_KEY: &str = "test-deployment-key";

pub fn fp(n: u32) -> String {
    format!("{:064x}", n)
}

pub struct TestApp {
    pub base: String,
    pub client: reqwest::Client,
    pub admin_token: String,
    pub store: LicenseStore,
    pub public_key: [u8; 32],
    pub service: Arc<LicenseService>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn create_license(&self, plan: &str, max_seats: u32) -> String {
        let resp = self
            .client
            .post(self.url("/api/v1/licenses"))
            .bearer_auth(&self.admin_token)
            .json(&serde_json::json!({
                "owner": "owner-1",
                "plan": plan,
                "max_seats": max_seats,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "create failed: {}", resp.text().await.unwrap());
        let body: serde_json::Value = resp.json().await.unwrap();
        body["key"].as_str().unwrap().to_string()
    }

    pub async fn activate(&self, key: &str, fingerprint: &str) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/v1/licenses/{key}/activate")))
            .header("X-Api-Key", API_KEY)
            .json(&serde_json::json!({
                "fingerprint": fingerprint,
                "hostname": "test-host",
                "os_descriptor": "linux 6.8",
            }))
            .send()
            .await
            .unwrap()
    }

    pub async fn validate(&self, key: &str, fingerprint: &str) -> reqwest::Response {
        self.validate_at(key, fingerprint, chrono::Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        key: &str,
        fingerprint: &str,
        client_time: chrono::DateTime<chrono::Utc>,
    ) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/v1/licenses/{key}/validate")))
            .header("X-Api-Key", API_KEY)
            .json(&serde_json::json!({
                "fingerprint": fingerprint,
                "client_time": client_time,
            }))
            .send()
            .await
            .unwrap()
    }
}

/// Spawns the server with the given config and logs in as admin.
pub async fn spawn_app(config: ServerConfig) -> TestApp {
    let config = Arc::new(config);
    let store = LicenseStore::open_in_memory().unwrap();
    let signer = Arc::new(giro_license::DecisionSigner::from_seed(&[5u8; 32]));
    let public_key = signer.public_key();

    let auth = Arc::new(AuthLayer::new(store.clone(), config.session_ttl));
    auth.bootstrap(ADMIN_EMAIL, ADMIN_PASSWORD, API_KEY).unwrap();

    let fraud = Arc::new(FraudDetector::new(store.clone(), config.fraud.clone()));
    let service = Arc::new(LicenseService::new(
        store.clone(),
        fraud,
        signer,
        Arc::clone(&config),
    ));
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_per_minute,
        config.rate_limit_burst,
    ));

    let state = AppState {
        service: Arc::clone(&service),
        auth,
        limiter,
        config,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let base = format!("http://127.0.0.1:{port}");
    let client = reqwest::Client::new();

    let login: serde_json::Value = client
        .post(format!("{base}/api/v1/auth/login"))
        .json(&serde_json::json!({
            "email": ADMIN_EMAIL,
            "password": ADMIN_PASSWORD,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let admin_token = login["token"].as_str().expect("login must succeed").to_string();

    TestApp {
        base,
        client,
        admin_token,
        store,
        public_key,
        service,
    }
}

/// Default-config app.
pub async fn spawn_default_app() -> TestApp {
    spawn_app(ServerConfig::default()).await
}
