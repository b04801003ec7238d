//! Missed-slot recovery, per-location execution locks and the activity log.

mod activity;
mod locks;
mod reconcile;

pub use activity::{ActivityAction, ActivityEntry, ActivityLog, STATUS_SUCCESS};
pub use locks::{ExecutionGuard, ExecutionLocks};
pub use reconcile::{ReconcileReport, Reconciler};
