//! Timing constants and a small cancellable-sleep helper shared by the
//! keepalive loop and the handshake retry loop.

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Per-attempt wait for a UA before retrying the handshake.
pub const HANDSHAKE_RETRY_WAIT: Duration = Duration::from_millis(2_500);

/// Keepalive poll interval while connected.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(120);

/// Sleep for `dur`, returning early (with `true`) if `token` is cancelled
/// first. Both loops in [`crate::engine`] use this so shutdown never waits
/// out a full interval.
pub async fn sleep_or_cancelled(dur: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = sleep(dur) => false,
        _ = token.cancelled() => true,
    }
}
