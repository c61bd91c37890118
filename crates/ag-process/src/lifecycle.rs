use std::time::Duration;
use tokio::process::Child;

use crate::signal;

/// SIGTERM, wait up to `timeout`, SIGKILL on timeout. Mirrors the
/// terminate-then-force pattern every controller in this crate uses, just
/// with different timeouts for a one-shot run vs. a single interactive turn.
pub async fn terminate_gracefully(child: &mut Child, pid: u32, timeout: Duration) {
    signal::term(pid);
    if tokio::time::timeout(timeout, child.wait()).await.is_err() {
        signal::kill(pid);
        let _ = child.wait().await;
    }
}
