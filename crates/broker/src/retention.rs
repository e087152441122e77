//! Background sweep that drops expired messages. Runs on every node but
//! only the current leader proposes a purge.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::BrokerError;
use crate::topic_log::TopicLog;

pub fn spawn_retention_reaper(
    topics: TopicLog,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !topics.is_leader() || !topics.has_expired() {
                        continue;
                    }
                    match topics.purge_expired().await {
                        Ok(removed) => debug!(removed, "retention sweep finished"),
                        // leadership moved mid-sweep; the next leader's sweep covers it
                        Err(BrokerError::Coordinator(err)) if err.is_retryable() => {
                            debug!(error = %err, "retention sweep deferred")
                        }
                        Err(err) => warn!(error = %err, "retention sweep failed"),
                    }
                }
            }
        }
    })
}
