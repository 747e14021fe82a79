use crate::services::shutdown_service::ShutdownHandle;
use anyhow::{Context, Result, bail};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task;
use tokio::time;

/// The external login collaborator: something that can drive a fresh
/// Lardi-Trans login and hand back a serialized cookie string. The call is
/// blocking and slow (seconds to tens of seconds), so the session manager
/// always dispatches it off the async runtime.
pub trait LoginFlow: Clone + Send + Sync + 'static {
    fn login(&self) -> Result<String>;
}

/// Production login flow: runs the configured headless-browser helper
/// command and reads the cookie string from its stdout.
#[derive(Clone)]
pub struct HelperCommandLogin {
    pub command: String,
}

impl LoginFlow for HelperCommandLogin {
    fn login(&self) -> Result<String> {
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .with_context(|| format!("Failed to run login helper: {}", self.command))?;

        if !output.status.success() {
            bail!(
                "Login helper exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let cookie = String::from_utf8(output.stdout)
            .context("Login helper produced non-UTF8 output")?
            .trim()
            .to_string();
        if cookie.is_empty() {
            bail!("Login helper produced an empty cookie string");
        }
        Ok(cookie)
    }
}

/// Holds the current Lardi session cookie string and keeps it durable across
/// restarts. Any number of requests read the token concurrently; refreshes
/// are serialized so two 401s cannot trigger two browser logins at once.
pub struct SessionManager<L: LoginFlow> {
    login_flow: L,
    cookies_file: PathBuf,
    token: RwLock<String>,
    refresh_guard: Mutex<()>,
}

impl<L: LoginFlow> SessionManager<L> {
    pub fn new(login_flow: L, cookies_file: impl Into<PathBuf>) -> Self {
        let cookies_file = cookies_file.into();
        let token = match std::fs::read_to_string(&cookies_file) {
            Ok(contents) => {
                info!("Loaded session cookies from {}", cookies_file.display());
                contents.trim().to_string()
            }
            Err(_) => {
                warn!(
                    "No cookies file at {}, starting with an empty session",
                    cookies_file.display()
                );
                String::new()
            }
        };

        SessionManager {
            login_flow,
            cookies_file,
            token: RwLock::new(token),
            refresh_guard: Mutex::new(()),
        }
    }

    /// Best currently-known cookie string. Never touches the network.
    pub async fn current_token(&self) -> String {
        self.token.read().await.clone()
    }

    /// Runs the external login flow and swaps in the new cookie on success.
    /// Returns false on any failure, leaving the previous token in place;
    /// the caller decides whether that token is still worth using.
    pub async fn refresh(&self) -> bool {
        let _guard = self.refresh_guard.lock().await;

        let flow = self.login_flow.clone();
        let outcome = task::spawn_blocking(move || flow.login()).await;

        match outcome {
            Ok(Ok(cookie)) => {
                *self.token.write().await = cookie.clone();
                if let Err(e) = std::fs::write(&self.cookies_file, &cookie) {
                    error!(
                        "Failed to persist cookies to {}: {}",
                        self.cookies_file.display(),
                        e
                    );
                }
                info!("Lardi session cookies refreshed");
                true
            }
            Ok(Err(e)) => {
                error!("Cookie refresh failed: {:#}", e);
                false
            }
            Err(e) => {
                error!("Login flow task failed: {}", e);
                false
            }
        }
    }
}

/// Proactive renewal, independent of the reactive 401-triggered path: calls
/// `refresh()` on a fixed long interval regardless of observed failures.
pub async fn run_refresh_loop<L: LoginFlow>(
    session: Arc<SessionManager<L>>,
    interval: Duration,
    shutdown: ShutdownHandle,
) {
    let mut ticker = time::interval(interval);
    // the first tick completes immediately; skip it so startup does not
    // trigger a browser login while the persisted cookies may still be valid
    ticker.tick().await;

    while !shutdown.is_shutdown() {
        ticker.tick().await;
        if shutdown.is_shutdown() {
            break;
        }
        info!("Scheduled session refresh starting");
        if !session.refresh().await {
            warn!("Scheduled session refresh failed, will retry next interval");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct FakeLogin {
        calls: Arc<AtomicUsize>,
        result: Result<String, String>,
    }

    impl FakeLogin {
        fn ok(cookie: &str) -> Self {
            FakeLogin {
                calls: Arc::new(AtomicUsize::new(0)),
                result: Ok(cookie.to_string()),
            }
        }

        fn failing(message: &str) -> Self {
            FakeLogin {
                calls: Arc::new(AtomicUsize::new(0)),
                result: Err(message.to_string()),
            }
        }
    }

    impl LoginFlow for FakeLogin {
        fn login(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(cookie) => Ok(cookie.clone()),
                Err(message) => bail!("{}", message.clone()),
            }
        }
    }

    fn temp_cookie_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("cookies.txt")
    }

    #[tokio::test]
    async fn successful_refresh_swaps_and_persists_the_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_cookie_path(&dir);
        let login = FakeLogin::ok("sid=fresh");
        let session = SessionManager::new(login.clone(), &path);

        assert_eq!(session.current_token().await, "");
        assert!(session.refresh().await);
        assert_eq!(session.current_token().await, "sid=fresh");
        assert_eq!(login.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "sid=fresh");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_cookie_path(&dir);
        std::fs::write(&path, "sid=old\n").unwrap();

        let session = SessionManager::new(FakeLogin::failing("login page timed out"), &path);
        assert_eq!(session.current_token().await, "sid=old");
        assert!(!session.refresh().await);
        assert_eq!(session.current_token().await, "sid=old");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "sid=old\n");
    }

    #[tokio::test]
    async fn restart_picks_up_persisted_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_cookie_path(&dir);

        let first = SessionManager::new(FakeLogin::ok("sid=persisted"), &path);
        assert!(first.refresh().await);
        drop(first);

        let second = SessionManager::new(FakeLogin::failing("unused"), &path);
        assert_eq!(second.current_token().await, "sid=persisted");
    }
}
