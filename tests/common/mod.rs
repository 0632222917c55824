use actix_web::web;
use mcp_testbed::configuration::Settings;
use mcp_testbed::mcp::SessionManager;
use mcp_testbed::startup::{run, AppState};
use std::net::TcpListener;
use std::time::Duration;
use tempfile::TempDir;

pub const TEST_TOKEN: &str = "integration-secret";

pub struct TestApp {
    pub address: String,
    pub ws_address: String,
    pub sessions: web::Data<SessionManager>,
    pub data_dir: TempDir,
}

impl TestApp {
    /// Poll until the live-session registry reaches `expected`
    pub async fn wait_for_live_sessions(&self, expected: usize) -> bool {
        for _ in 0..50 {
            if self.sessions.live_count() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

pub fn test_settings(data_dir: &TempDir) -> Settings {
    Settings {
        app_host: "127.0.0.1".to_string(),
        app_port: 0,
        auth_token: TEST_TOKEN.to_string(),
        fixtures_path: None,
        data_dir: data_dir.path().to_path_buf(),
        handler_timeout_secs: 5,
        server_name: "mcp-testbed".to_string(),
        environment: "test".to_string(),
    }
}

// we have to run server in another thread
pub async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let data_dir = tempfile::tempdir().expect("Failed to create data dir");
    let settings = test_settings(&data_dir);
    let state = AppState::build(&settings).expect("Failed to build app state");
    let sessions = state.sessions.clone();

    let server = run(listener, state).expect("Failed to bind address.");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        ws_address: format!("ws://127.0.0.1:{}/mcp", port),
        sessions,
        data_dir,
    }
}
