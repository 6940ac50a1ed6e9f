// SPDX-License-Identifier: GPL-3.0-only

//! The event-dispatch loop
//!
//! All session state lives on the task running [`run`]. Other threads only
//! send [`DispatchEvent`]s into its queue.

use super::events::DispatchEvent;
use super::facade::SessionFacade;
use crate::errors::AppResult;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Start the facade and process events until [`DispatchEvent::Shutdown`]
/// or until every sender is gone. Returns the facade for inspection.
pub async fn run(
    mut facade: SessionFacade,
    mut events: UnboundedReceiver<DispatchEvent>,
) -> AppResult<SessionFacade> {
    facade.start()?;

    while let Some(event) = events.recv().await {
        if matches!(event, DispatchEvent::Shutdown) {
            info!("Shutdown requested");
            break;
        }
        facade.dispatch(event);
    }

    facade.shutdown();
    debug!("Dispatch loop finished");
    Ok(facade)
}

/// Dispatch everything already queued, including events queued while doing so.
///
/// Returns the number of events handled. Stops at a shutdown request.
pub fn pump_pending(
    facade: &mut SessionFacade,
    events: &mut UnboundedReceiver<DispatchEvent>,
) -> usize {
    let mut handled = 0;
    while let Ok(event) = events.try_recv() {
        let shutdown = matches!(event, DispatchEvent::Shutdown);
        facade.dispatch(event);
        handled += 1;
        if shutdown {
            break;
        }
    }
    handled
}
