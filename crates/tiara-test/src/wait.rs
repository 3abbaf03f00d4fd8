//! Bounded waiting for asynchronous conditions

use std::time::Duration;

use tiara_core::ChannelStatus;
use tiara_transport::ChannelHandle;

/// Poll spacing used by `eventually`
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Wait for a published channel status matching `predicate`
pub async fn wait_for_status<F>(
    channel: &ChannelHandle,
    timeout: Duration,
    predicate: F,
) -> Option<ChannelStatus>
where
    F: Fn(&ChannelStatus) -> bool,
{
    let mut status = channel.subscribe_status();
    let wait = async {
        loop {
            let current = status.borrow_and_update().clone();
            if predicate(&current) {
                return Some(current);
            }
            if status.changed().await.is_err() {
                return None;
            }
        }
    };
    tokio::time::timeout(timeout, wait).await.ok().flatten()
}
