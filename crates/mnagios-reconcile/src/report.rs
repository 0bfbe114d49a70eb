//! What a reconciliation run did, tenant by tenant.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Deployments whose start-monitoring workflow was accepted, by tenant.
    pub started: BTreeMap<String, Vec<String>>,
    /// Deployments whose workflow could not be started, by tenant.
    pub failed: BTreeMap<String, Vec<String>>,
    /// Tenants whose node listing failed; none of their deployments ran.
    pub tenant_errors: BTreeMap<String, String>,
    /// Set when even the tenant list could not be fetched.
    pub listing_error: Option<String>,
    /// Nodes left alone because Nagios already monitors them.
    pub skipped_nodes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Filtering left no targets, or nothing is monitored at all.
    NothingToDo,
    AllSucceeded { deployments: usize },
    Problems { tenants: usize, deployments: usize },
}

impl ReconcileReport {
    pub(crate) fn record_started(&mut self, tenant: &str, deployment: &str) {
        self.started
            .entry(tenant.to_string())
            .or_default()
            .push(deployment.to_string());
    }

    pub(crate) fn record_failed(&mut self, tenant: &str, deployment: &str) {
        self.failed
            .entry(tenant.to_string())
            .or_default()
            .push(deployment.to_string());
    }

    pub fn outcome(&self) -> ReconcileOutcome {
        let started: usize = self.started.values().map(Vec::len).sum();
        let failed: usize = self.failed.values().map(Vec::len).sum();
        let broken_tenants = self
            .tenant_errors
            .keys()
            .filter(|tenant| !self.failed.contains_key(*tenant))
            .count();

        if failed > 0 || broken_tenants > 0 || self.listing_error.is_some() {
            ReconcileOutcome::Problems {
                tenants: self.failed.len() + broken_tenants,
                deployments: failed,
            }
        } else if started == 0 {
            ReconcileOutcome::NothingToDo
        } else {
            ReconcileOutcome::AllSucceeded { deployments: started }
        }
    }

    pub fn is_clean(&self) -> bool {
        !matches!(self.outcome(), ReconcileOutcome::Problems { .. })
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome() {
            ReconcileOutcome::NothingToDo => write!(
                f,
                "nothing needed to be done: tenant and deployment filtering left no targets, \
                 or no deployments are monitored"
            ),
            ReconcileOutcome::AllSucceeded { deployments } => write!(
                f,
                "monitoring restart requested for {deployments} deployment(s); no problems were reported"
            ),
            ReconcileOutcome::Problems { tenants, deployments } => {
                write!(
                    f,
                    "{tenants} tenant(s) had problems starting workflows for {deployments} deployment(s)"
                )?;
                if let Some(error) = &self.listing_error {
                    write!(f, "; tenant listing failed: {error}")?;
                }
                for (tenant, deployments) in &self.failed {
                    write!(f, "; {tenant}: {}", deployments.join(","))?;
                }
                for (tenant, error) in &self.tenant_errors {
                    write!(f, "; {tenant}: node listing failed: {error}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_has_nothing_to_do() {
        let report = ReconcileReport::default();
        assert_eq!(report.outcome(), ReconcileOutcome::NothingToDo);
        assert!(report.is_clean());
    }

    #[test]
    fn failures_are_counted_across_tenants() {
        let mut report = ReconcileReport::default();
        report.record_started("t1", "d1");
        report.record_failed("t1", "d2");
        report.record_failed("t2", "d3");
        report.record_failed("t2", "d4");
        report
            .tenant_errors
            .insert("t3".to_string(), "no healthy managers were reachable".to_string());

        assert_eq!(
            report.outcome(),
            ReconcileOutcome::Problems {
                tenants: 3,
                deployments: 3
            }
        );
        let summary = report.to_string();
        assert!(summary.contains("t2: d3,d4"));
        assert!(summary.contains("t3: node listing failed"));
    }
}
