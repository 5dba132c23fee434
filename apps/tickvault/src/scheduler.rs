use crate::engine::Engine;
use std::future::Future;
use tickvault_application::config::SchedulerConfig;
use tokio::time::{interval, MissedTickBehavior};

/// Drives reconcile and heartbeat ticks until `shutdown` resolves. A slow
/// reconcile pass delays the next one instead of stacking ticks, and a
/// shutdown during a pass abandons it; claimed jobs stay `Running`.
pub async fn run<S>(engine: &Engine, config: &SchedulerConfig, shutdown: S)
where
    S: Future<Output = ()>,
{
    let mut reconcile = interval(config.reconcile_interval());
    reconcile.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut heartbeat = interval(config.heartbeat_interval());
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    tracing::info!(
        reconcile_ms = config.reconcile_interval_ms,
        heartbeat_secs = config.heartbeat_interval_secs,
        "scheduler started"
    );
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("scheduler stopping");
                break;
            }
            _ = reconcile.tick() => {
                tokio::select! {
                    _ = &mut shutdown => {
                        tracing::info!("scheduler stopping mid-pass");
                        break;
                    }
                    _ = engine.reconciler.tick() => {}
                }
            }
            _ = heartbeat.tick() => {
                engine.reconciler.heartbeat();
            }
        }
    }
}
