use log::info;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::signal;

/// Cooperative shutdown flag shared by the polling and refresh loops.
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        ShutdownHandle {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Blocks until ctrl-c, then raises the flag so background loops wind
    /// down at their next checkpoint.
    pub async fn wait_for_ctrl_c(&self) -> anyhow::Result<()> {
        signal::ctrl_c()
            .await
            .map_err(|e| anyhow::anyhow!("Unable to listen for shutdown signal: {}", e))?;
        info!("Shutdown signal received");
        self.trigger();
        Ok(())
    }
}
