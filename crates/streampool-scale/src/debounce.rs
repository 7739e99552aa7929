//! Single-shot, re-armable downscale timer.
//!
//! The armed slot is guarded by one mutex, and both the firing task and
//! `disarm` must take the slot under that lock before acting, so a cancel
//! and a fire can never interleave: whichever takes the slot wins and the
//! other becomes a no-op.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Action run when the timer fires.
pub type FireCallback = Box<dyn FnOnce() -> BoxFuture + Send>;

/// A cancellable delayed action. At most one instance is armed at a time;
/// arming while armed is a no-op, and firing always disarms.
pub struct DownscaleTimer {
    armed: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DownscaleTimer {
    pub fn new() -> Self {
        Self {
            armed: Arc::new(Mutex::new(None)),
        }
    }

    /// Arm the timer. Returns `false` without rescheduling if it is
    /// already armed.
    pub async fn arm(&self, delay: Duration, callback: FireCallback) -> bool {
        let mut slot = self.armed.lock().await;
        if slot.is_some() {
            debug!("downscale timer already armed");
            return false;
        }

        let armed = Arc::clone(&self.armed);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Claim the slot before firing. A disarm that got there first
            // has aborted or will abort this task; if we win, the timer is
            // disarmed and the callback runs exactly once.
            let claimed = armed.lock().await.take().is_some();
            if claimed {
                callback().await;
            }
        });
        *slot = Some(handle);
        true
    }

    /// Cancel a pending fire. Returns `false` if the timer was not armed.
    pub async fn disarm(&self) -> bool {
        let mut slot = self.armed.lock().await;
        match slot.take() {
            Some(handle) => {
                handle.abort();
                debug!("downscale timer disarmed");
                true
            }
            None => false,
        }
    }

    pub async fn is_armed(&self) -> bool {
        self.armed.lock().await.is_some()
    }
}

impl Default for DownscaleTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_callback(fired: &Arc<AtomicU32>) -> FireCallback {
        let fired = Arc::clone(fired);
        Box::new(move || {
            Box::pin(async move {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn fires_once_after_delay_and_disarms() {
        let timer = DownscaleTimer::new();
        let fired = Arc::new(AtomicU32::new(0));

        assert!(
            timer
                .arm(Duration::from_millis(20), counting_callback(&fired))
                .await
        );
        assert!(timer.is_armed().await);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed().await);
    }

    #[tokio::test]
    async fn rearm_while_armed_is_a_noop() {
        let timer = DownscaleTimer::new();
        let fired = Arc::new(AtomicU32::new(0));

        assert!(
            timer
                .arm(Duration::from_millis(20), counting_callback(&fired))
                .await
        );
        assert!(
            !timer
                .arm(Duration::from_millis(20), counting_callback(&fired))
                .await
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Only the first arm fired.
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disarm_prevents_fire() {
        let timer = DownscaleTimer::new();
        let fired = Arc::new(AtomicU32::new(0));

        timer
            .arm(Duration::from_millis(20), counting_callback(&fired))
            .await;
        assert!(timer.disarm().await);
        assert!(!timer.is_armed().await);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disarm_when_idle_reports_false() {
        let timer = DownscaleTimer::new();
        assert!(!timer.disarm().await);
    }

    #[tokio::test]
    async fn can_rearm_after_fire() {
        let timer = DownscaleTimer::new();
        let fired = Arc::new(AtomicU32::new(0));

        timer
            .arm(Duration::from_millis(10), counting_callback(&fired))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(
            timer
                .arm(Duration::from_millis(10), counting_callback(&fired))
                .await
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
