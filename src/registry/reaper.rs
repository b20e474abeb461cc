// src/registry/reaper.rs

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

use crate::config::format_duration;
use crate::registry::TaskRegistry;

/// Periodically evict finished, unwatched tasks older than the configured
/// retention.
///
/// Holds only a weak reference; the loop ends once the registry is dropped.
pub fn spawn_reaper(registry: &Arc<TaskRegistry>) -> JoinHandle<()> {
    let every = registry.settings().registry.reap_interval;
    let retention = registry.settings().registry.retention;
    let weak: Weak<TaskRegistry> = Arc::downgrade(registry);

    debug!(
        every = %format_duration(every),
        retention = %format_duration(retention),
        "starting task reaper"
    );

    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(registry) = weak.upgrade() else {
                debug!("registry dropped; reaper exiting");
                break;
            };
            let removed = registry.reap_expired(retention);
            trace!(removed, remaining = registry.len(), "reaper pass");
        }
    })
}
