//! Bus worker — polls a subscription and dispatches commands.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use streampool_deploy::{DeployError, DeploymentParams, Orchestrator};

use crate::command::BusCommand;
use crate::error::BusResult;
use crate::provider::BusProvider;

const DEFAULT_TERMINATE_REASON: &str = "Terminated by bus command";

/// Outcome of one receive attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polled {
    /// A message was handled and removed from the subscription.
    Handled,
    /// A message failed dispatch and stays queued for redelivery.
    Deferred,
    /// Nothing pending.
    Idle,
}

/// Polls one subscription and turns commands into deployment calls.
///
/// Delivery semantics: a message is deleted after successful dispatch.
/// Dispatch failure leaves the message on the bus for redelivery;
/// malformed messages are deleted immediately so they cannot wedge the
/// subscription.
pub struct BusWorker {
    bus: Arc<dyn BusProvider>,
    orchestrator: Arc<Orchestrator>,
    /// Deployment template for `create` commands; per-message ids
    /// override the template's.
    template: DeploymentParams,
    topic: String,
    subscription: String,
}

impl BusWorker {
    pub fn new(
        bus: Arc<dyn BusProvider>,
        orchestrator: Arc<Orchestrator>,
        template: DeploymentParams,
        topic: &str,
        subscription: &str,
    ) -> Self {
        Self {
            bus,
            orchestrator,
            template,
            topic: topic.to_string(),
            subscription: subscription.to_string(),
        }
    }

    /// Create the topic and subscription this worker consumes.
    pub async fn ensure_entities(&self) -> BusResult<()> {
        self.bus.ensure_topic(&self.topic).await?;
        self.bus
            .ensure_subscription(&self.topic, &self.subscription)
            .await
    }

    /// Receive and handle at most one message.
    pub async fn process_next(&self) -> BusResult<Polled> {
        let Some(message) = self
            .bus
            .receive_with_lock(&self.topic, &self.subscription)
            .await?
        else {
            return Ok(Polled::Idle);
        };

        let command: BusCommand = match serde_json::from_str(&message.body) {
            Ok(command) => command,
            Err(e) => {
                warn!(body = %message.body, error = %e, "malformed bus command; discarding");
                self.bus.delete_message(&message).await?;
                return Ok(Polled::Handled);
            }
        };

        match self.dispatch(command).await {
            Ok(()) => {
                self.bus.delete_message(&message).await?;
                Ok(Polled::Handled)
            }
            Err(e) => {
                // Leave the message for redelivery on a later poll tick.
                warn!(error = %e, "bus command dispatch failed; message will redeliver");
                Ok(Polled::Deferred)
            }
        }
    }

    async fn dispatch(&self, command: BusCommand) -> Result<(), DeployError> {
        match command {
            BusCommand::Create {
                rendering_pool_id,
                rendering_job_id,
            } => {
                let mut params = self.template.clone();
                if let Some(pool_id) = rendering_pool_id {
                    params.rendering_pool_id = pool_id;
                }
                if let Some(job_id) = rendering_job_id {
                    params.rendering_job_id = job_id;
                }
                info!(pool = %params.rendering_pool_id, "bus command: create deployment");
                self.orchestrator.create_deployment(&params).await
            }
            BusCommand::Delete { pool_id } => {
                info!(pool = %pool_id, "bus command: delete pool");
                self.orchestrator.delete_pool(&pool_id).await
            }
            BusCommand::Terminate { job_id, reason } => {
                info!(job = %job_id, "bus command: terminate job");
                self.orchestrator
                    .terminate_job(&job_id, reason.as_deref().unwrap_or(DEFAULT_TERMINATE_REASON))
                    .await
            }
        }
    }

    /// Poll the subscription until shutdown.
    pub async fn run(
        &self,
        poll_interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        info!(
            topic = %self.topic,
            subscription = %self.subscription,
            "bus worker started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {
                    // Drain everything pending before sleeping again. A
                    // deferred message stops the drain: it sits at the
                    // front of the subscription, so continuing would
                    // re-dispatch the same message in a tight loop.
                    loop {
                        match self.process_next().await {
                            Ok(Polled::Handled) => continue,
                            Ok(Polled::Deferred) | Ok(Polled::Idle) => break,
                            Err(e) => {
                                warn!(error = %e, "bus receive failed");
                                break;
                            }
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("bus worker shutting down");
                    break;
                }
            }
        }
    }
}
