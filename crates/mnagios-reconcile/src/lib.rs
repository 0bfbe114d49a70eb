//! mnagios-reconcile — bring Nagios back in line with the orchestrator.
//!
//! ```text
//!   tenants ──▶ monitored nodes (per tenant) ──▶ group by deployment
//!                                                   │
//!                        start-monitoring workflow ◀┘ one per deployment
//!                                                   │
//!                                     ReconcileReport (started / failed)
//! ```

pub mod reconciler;
pub mod report;

pub use reconciler::{
    LISTING_TENANT, MONITORING_PROPERTY, MonitoringState, ReconcileFilter, Reconciler, START_MONITORING_OPERATION,
};
pub use report::{ReconcileOutcome, ReconcileReport};
