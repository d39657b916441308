// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background ticket GC.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ticket::TicketService;

/// Spawn the periodic ticket sweep. Failures are logged and retried on the
/// next tick; the loop exits when `shutdown` fires.
pub fn spawn_ticket_gc(
    tickets: TicketService,
    interval: Duration,
    retention: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            match tickets.gc(retention).await {
                Ok(removed) => {
                    failures = 0;
                    if removed > 0 {
                        tracing::info!(removed, "ticket gc swept rows");
                    } else {
                        tracing::debug!("ticket gc found nothing to remove");
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(failures, err = %e, "ticket gc failed");
                }
            }
        }
        tracing::debug!("ticket gc stopped");
    })
}
