// Tephra Server - Periodic rule evaluation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Runs the rule book against the store on a fixed period and fans each
//! alert out to its notification channels.
//!
//! Ticks are awaited inline, so a slow tick delays the next one instead of
//! overlapping it; missed ticks are skipped.

use crate::metrics;
use crate::notify::{dispatch, Delivery, Dispatcher};
use std::sync::Arc;
use std::time::Duration;
use tephra::{ChannelStore, RuleBook};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Summary of one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Rules that fired
    pub alerts: usize,
    /// Rules skipped for lack of data
    pub skipped: usize,
    /// Delivery attempts across all alerts
    pub deliveries: usize,
    /// Failed delivery attempts
    pub failures: usize,
}

/// Periodic rule evaluator
pub struct RuleScheduler {
    rules: Arc<RuleBook>,
    store: Arc<ChannelStore>,
    dispatcher: Arc<dyn Dispatcher>,
    period: Duration,
}

impl RuleScheduler {
    /// Create a scheduler evaluating every `period`
    pub fn new(
        rules: Arc<RuleBook>,
        store: Arc<ChannelStore>,
        dispatcher: Arc<dyn Dispatcher>,
        period: Duration,
    ) -> Self {
        Self {
            rules,
            store,
            dispatcher,
            period,
        }
    }

    /// Evaluation period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Evaluate every enabled rule once and deliver the alerts
    pub async fn tick(&self) -> TickReport {
        let evaluation = self.rules.evaluate(&self.store);
        let mut report = TickReport {
            alerts: evaluation.alerts.len(),
            skipped: evaluation.skipped.len(),
            ..Default::default()
        };

        for rule_id in &evaluation.skipped {
            debug!(rule = %rule_id, "no data for rule, skipped");
        }

        for alert in evaluation.alerts {
            info!(
                rule = %alert.rule_id,
                channel = %alert.channel,
                current = alert.current,
                threshold = alert.threshold,
                "rule triggered"
            );
            let deliveries: Vec<Delivery> =
                dispatch(self.dispatcher.as_ref(), alert.targets, &alert.message).await;
            report.deliveries += deliveries.len();
            report.failures += deliveries.iter().filter(|d| !d.success).count();
        }

        metrics::record_tick(report.alerts);
        report
    }

    /// Tick every period until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; evaluation starts one period in
        ticker.tick().await;

        info!(period_secs = self.period.as_secs(), "rule scheduler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if report.failures > 0 {
                        warn!(
                            failures = report.failures,
                            deliveries = report.deliveries,
                            "some notifications failed"
                        );
                    }
                }
            }
        }
        info!("rule scheduler stopped");
    }
}
