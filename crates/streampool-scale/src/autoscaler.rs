//! Autoscaler — wires the decision engine to scaling actions.
//!
//! The actual pool creation and deletion are performed by callbacks into
//! the deployment layer. Upscales run immediately in a background task;
//! downscales arm the debounce timer, and the timer's callback re-runs
//! the evaluation with the captured load snapshot against the then-fresh
//! pool inventory before deleting anything.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use streampool_batch::ConnectedServer;

use crate::debounce::DownscaleTimer;
use crate::engine::{DecisionEngine, ScalingVerdict};

type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Called with a freshly generated pool id to create a rendering pool.
pub type UpscaleCallback = Arc<dyn Fn(String) -> BoxFuture + Send + Sync>;

/// Called with the pool id selected for deletion.
pub type DownscaleCallback = Arc<dyn Fn(String) -> BoxFuture + Send + Sync>;

/// Reacts to load reports from the signaling tier.
pub struct Autoscaler {
    engine: Arc<DecisionEngine>,
    timer: Arc<DownscaleTimer>,
    upscale_fn: UpscaleCallback,
    downscale_fn: DownscaleCallback,
}

impl Autoscaler {
    pub fn new(
        engine: DecisionEngine,
        upscale_fn: UpscaleCallback,
        downscale_fn: DownscaleCallback,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            timer: Arc::new(DownscaleTimer::new()),
            upscale_fn,
            downscale_fn,
        }
    }

    pub fn enabled(&self) -> bool {
        self.engine.config().enabled()
    }

    /// Evaluate one load report and act on the verdict.
    ///
    /// Upscales are fire-and-forget: the deployment pipeline can take
    /// many minutes, and the report handler must not block on it.
    pub async fn handle_report(
        &self,
        total_clients: u32,
        servers: &[ConnectedServer],
    ) -> anyhow::Result<ScalingVerdict> {
        let verdict = self.engine.evaluate(total_clients, servers).await?;
        match &verdict {
            ScalingVerdict::NotEnabled => {}
            ScalingVerdict::Upscale => {
                // Load is climbing; a pending downscale no longer applies.
                self.timer.disarm().await;
                self.spawn_upscale();
            }
            ScalingVerdict::Downscale { pool_id } => {
                self.arm_downscale(pool_id, total_clients, servers).await;
            }
            ScalingVerdict::Hold => {
                self.timer.disarm().await;
            }
        }
        Ok(verdict)
    }

    fn spawn_upscale(&self) {
        let pool_id = Uuid::new_v4().to_string();
        info!(%pool_id, "upscaling: creating a new rendering pool");
        let upscale = Arc::clone(&self.upscale_fn);
        tokio::spawn(async move {
            if let Err(e) = upscale(pool_id.clone()).await {
                warn!(%pool_id, error = %e, "upscale deployment failed");
            }
        });
    }

    async fn arm_downscale(
        &self,
        pool_id: &str,
        total_clients: u32,
        servers: &[ConnectedServer],
    ) {
        let engine = Arc::clone(&self.engine);
        let downscale = Arc::clone(&self.downscale_fn);
        let snapshot = servers.to_vec();
        let delay = engine.config().downscale_delay;

        // A zero timeout disables the timer entirely; downscale verdicts
        // are observed but never acted on.
        if delay.is_zero() {
            debug!(%pool_id, "downscale timer disabled; verdict ignored");
            return;
        }

        let armed = self
            .timer
            .arm(
                delay,
                Box::new(move || {
                    Box::pin(async move {
                        // The load snapshot is the one that armed the
                        // timer, but the pool inventory is read fresh; the
                        // delete target is whatever the re-evaluation
                        // picks now.
                        match engine.evaluate(total_clients, &snapshot).await {
                            Ok(ScalingVerdict::Downscale { pool_id }) => {
                                info!(%pool_id, "downscale timer fired; deleting rendering pool");
                                if let Err(e) = downscale(pool_id.clone()).await {
                                    warn!(%pool_id, error = %e, "downscale deletion failed");
                                }
                            }
                            Ok(verdict) => {
                                debug!(?verdict, "conditions changed; downscale abandoned");
                            }
                            Err(e) => {
                                warn!(error = %e, "downscale re-evaluation failed");
                            }
                        }
                    })
                }),
            )
            .await;
        if armed {
            info!(%pool_id, delay_secs = delay.as_secs(), "downscale timer armed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::Mutex;

    use streampool_batch::{BatchProvider, InMemoryBatch, NodeState, PoolSpec};

    use crate::config::ScalingConfig;

    struct Recorded {
        upscales: Arc<Mutex<Vec<String>>>,
        downscales: Arc<Mutex<Vec<String>>>,
    }

    fn autoscaler(batch: &InMemoryBatch, config: ScalingConfig) -> (Autoscaler, Recorded) {
        let upscales: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let downscales: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let up = Arc::clone(&upscales);
        let upscale_fn: UpscaleCallback = Arc::new(move |pool_id| {
            let up = Arc::clone(&up);
            Box::pin(async move {
                up.lock().await.push(pool_id);
                Ok(())
            })
        });

        let down = Arc::clone(&downscales);
        let downscale_fn: DownscaleCallback = Arc::new(move |pool_id| {
            let down = Arc::clone(&down);
            Box::pin(async move {
                down.lock().await.push(pool_id);
                Ok(())
            })
        });

        let engine = DecisionEngine::new(Arc::new(batch.clone()), config);
        (
            Autoscaler::new(engine, upscale_fn, downscale_fn),
            Recorded {
                upscales,
                downscales,
            },
        )
    }

    fn config(up: u32, down: u32) -> ScalingConfig {
        ScalingConfig {
            up_threshold: up,
            down_threshold: down,
            minimum_rendering_pools: 0,
            max_users_per_rendering_node: 4,
            downscale_delay: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn upscale_verdict_invokes_upscale_with_fresh_pool_id() {
        let batch = InMemoryBatch::new();
        let (scaler, recorded) = autoscaler(&batch, config(80, 20));

        let verdict = scaler.handle_report(5, &[]).await.unwrap();
        assert_eq!(verdict, ScalingVerdict::Upscale);

        // The upscale runs in a spawned task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let upscales = recorded.upscales.lock().await;
        assert_eq!(upscales.len(), 1);
        assert!(Uuid::parse_str(&upscales[0]).is_ok());
    }

    #[tokio::test]
    async fn downscale_fires_after_delay() {
        let batch = InMemoryBatch::new();
        batch
            .create_pool(PoolSpec::rendering("render-1", 25, None))
            .await
            .unwrap();
        let (scaler, recorded) = autoscaler(&batch, config(80, 20));

        let verdict = scaler.handle_report(1, &[]).await.unwrap();
        assert!(matches!(verdict, ScalingVerdict::Downscale { .. }));
        assert!(recorded.downscales.lock().await.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            *recorded.downscales.lock().await,
            vec!["render-1".to_string()]
        );
    }

    #[tokio::test]
    async fn load_recovery_cancels_pending_downscale() {
        let batch = InMemoryBatch::new();
        batch
            .create_pool(PoolSpec::rendering("render-1", 25, None))
            .await
            .unwrap();
        let (scaler, recorded) = autoscaler(&batch, config(80, 20));

        scaler.handle_report(1, &[]).await.unwrap();
        // 50/100 sits between thresholds: Hold, which disarms the timer.
        let verdict = scaler.handle_report(50, &[]).await.unwrap();
        assert_eq!(verdict, ScalingVerdict::Hold);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(recorded.downscales.lock().await.is_empty());
    }

    #[tokio::test]
    async fn fire_reevaluates_before_deleting() {
        let batch = InMemoryBatch::new();
        batch
            .create_pool(PoolSpec::rendering("render-1", 25, None))
            .await
            .unwrap();
        let (scaler, recorded) = autoscaler(&batch, config(80, 20));

        scaler.handle_report(1, &[]).await.unwrap();

        // A task starts on the pool before the timer fires; the pool is
        // no longer idle, so the re-evaluation abandons the downscale.
        let node = batch.list_nodes("render-1").await.unwrap()[0].id.clone();
        batch
            .set_node_state("render-1", &node, NodeState::Running)
            .await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(recorded.downscales.lock().await.is_empty());
    }

    #[tokio::test]
    async fn zero_downscale_delay_never_deletes() {
        let batch = InMemoryBatch::new();
        batch
            .create_pool(PoolSpec::rendering("render-1", 25, None))
            .await
            .unwrap();
        let (scaler, recorded) = autoscaler(
            &batch,
            ScalingConfig {
                downscale_delay: Duration::ZERO,
                ..config(80, 20)
            },
        );

        let verdict = scaler.handle_report(1, &[]).await.unwrap();
        assert!(matches!(verdict, ScalingVerdict::Downscale { .. }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(recorded.downscales.lock().await.is_empty());
    }

    #[tokio::test]
    async fn disabled_scaling_reports_not_enabled_and_does_nothing() {
        let batch = InMemoryBatch::new();
        let (scaler, recorded) = autoscaler(&batch, config(0, 0));

        assert!(!scaler.enabled());
        let verdict = scaler.handle_report(100, &[]).await.unwrap();
        assert_eq!(verdict, ScalingVerdict::NotEnabled);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(recorded.upscales.lock().await.is_empty());
        assert!(recorded.downscales.lock().await.is_empty());
    }
}
