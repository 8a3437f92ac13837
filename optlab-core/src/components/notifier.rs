//! Notifiers: out-of-band delivery of lifecycle events.
//!
//! Delivery is at-most-once: a failed notification is logged and dropped,
//! and engine state never depends on it.

use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{EventKind, ExitReason, LifecycleEvent};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("notification rejected with status {status}")]
    Rejected { status: u16 },
}

pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn notify(&self, event: &LifecycleEvent) -> Result<(), NotifyError>;
}

/// Deliver an event, logging (never propagating) a failure.
///
/// Returns whether delivery succeeded.
pub fn deliver(notifier: &dyn Notifier, event: &LifecycleEvent) -> bool {
    match notifier.notify(event) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                notifier = notifier.name(),
                kind = %event.kind,
                horizon = %event.horizon,
                error = %e,
                "notification failed"
            );
            false
        }
    }
}

/// Human-readable alert text in the chat-webhook style.
pub fn format_alert(event: &LifecycleEvent) -> String {
    let headline = match (event.kind, event.reason) {
        (EventKind::Entry, _) => format!("**{} ENTRY ALERT**", event.direction.as_str()),
        (EventKind::PartialTp, _) => "**PARTIAL TP HIT**".to_string(),
        (EventKind::Stop, _) => "**STOP HIT**".to_string(),
        (EventKind::Exit, Some(ExitReason::TakeProfit)) => "**FINAL TP HIT**".to_string(),
        (EventKind::Exit, Some(reason)) => format!("**EXIT ({reason})**"),
        (EventKind::Exit, None) => "**EXIT**".to_string(),
    };
    let mut msg = format!(
        "{headline}\nStrategy: `{}` | Horizon: {}\n{}: ${:.2} | Option: {:.4}",
        event.category, event.horizon, event.symbol, event.underlying, event.price
    );
    if let Some(p) = event.probability {
        msg.push_str(&format!("\nConfidence: {:.2}%", p * 100.0));
    }
    if let Some(pnl) = event.pnl {
        msg.push_str(&format!("\nPnL: {pnl:+.2}"));
    }
    msg.push_str(&format!(
        "\nTime: {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S")
    ));
    msg
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, event: &LifecycleEvent) -> Result<(), NotifyError> {
        info!(
            kind = %event.kind,
            horizon = %event.horizon,
            strategy = %event.category,
            direction = event.direction.as_str(),
            price = event.price,
            underlying = event.underlying,
            reason = event.reason.map(|r| r.as_str()),
            pnl = event.pnl,
            "lifecycle event"
        );
        Ok(())
    }
}
