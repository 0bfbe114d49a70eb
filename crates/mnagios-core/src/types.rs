//! Domain specifications shared across the managed Nagios crates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::workflow::{WorkflowSpec, WorkflowValidationError};

/// Host health checks a target type may use.
pub const INSTANCE_HEALTH_CHECKS: &[&str] = &["do-not-check", "check-host-icmp"];

// ── Thresholds ─────────────────────────────────────────────────

/// Warning/critical thresholds for a value check. Unset thresholds are
/// rendered as empty arguments and ignored by the check scripts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub low_warning_threshold: Option<f64>,
    pub low_critical_threshold: Option<f64>,
    pub high_warning_threshold: Option<f64>,
    pub high_critical_threshold: Option<f64>,
}

impl Thresholds {
    /// Template parameters, keyed by field name.
    pub fn template_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("low_warning_threshold", render_threshold(self.low_warning_threshold)),
            ("low_critical_threshold", render_threshold(self.low_critical_threshold)),
            ("high_warning_threshold", render_threshold(self.high_warning_threshold)),
            ("high_critical_threshold", render_threshold(self.high_critical_threshold)),
        ]
    }
}

pub fn render_threshold(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// How aggregate checks combine their values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    ArithmeticMean,
    Sum,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::ArithmeticMean => "arithmetic_mean",
            Aggregation::Sum => "sum",
        }
    }
}

// ── Reactions ──────────────────────────────────────────────────

/// Instance-count bounds a reaction must respect (e.g. do not scale in
/// below `min_instances`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConstraints {
    pub min_instances: Option<u32>,
    pub max_instances: Option<u32>,
}

/// A workflow plus the constraints under which it may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionEntry {
    pub workflow: WorkflowSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<InstanceConstraints>,
}

impl ReactionEntry {
    /// Validate the workflow; an empty workflow yields no entry.
    pub fn validated(
        self,
        disallowed: &[&str],
    ) -> Result<Option<ReactionEntry>, WorkflowValidationError> {
        let constraints = self.constraints;
        Ok(self
            .workflow
            .validate(disallowed)?
            .map(|workflow| ReactionEntry {
                workflow,
                constraints,
            }))
    }
}

/// Reactions for the low and high threshold of one check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelReactions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<ReactionEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<ReactionEntry>,
}

impl LevelReactions {
    pub fn is_empty(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }

    pub fn validated(self, disallowed: &[&str]) -> Result<LevelReactions, WorkflowValidationError> {
        Ok(LevelReactions {
            low: self.low.map(|r| r.validated(disallowed)).transpose()?.flatten(),
            high: self.high.map(|r| r.validated(disallowed)).transpose()?.flatten(),
        })
    }
}

/// Per target type reaction descriptor read by the trap and check
/// handlers: check description → levels, trap OID → reaction, and the
/// host-failure reaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionBundle {
    pub checks: BTreeMap<String, LevelReactions>,
    pub traps: BTreeMap<String, ReactionEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<ReactionEntry>,
}

// ── Target types ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnmpV3 {
    pub username: String,
    pub auth_pass: String,
    pub priv_pass: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnmpV2c {
    pub community: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnmpProperties {
    pub v3: Option<SnmpV3>,
    pub v2c: Option<SnmpV2c>,
}

impl SnmpProperties {
    /// Connection parameters for the most secure configured protocol.
    pub fn connection_params(&self) -> Option<Vec<(&'static str, String)>> {
        if let Some(v3) = &self.v3 {
            let mut params = vec![
                ("protocol", "3".to_string()),
                ("seclevel", "authPriv".to_string()),
                ("authproto", "SHA".to_string()),
                ("privproto", "AES".to_string()),
                ("secname", v3.username.clone()),
                ("authpasswd", v3.auth_pass.clone()),
                ("privpasswd", v3.priv_pass.clone()),
            ];
            if let Some(context) = v3.context.as_ref().filter(|c| !c.is_empty()) {
                params.push(("context", context.clone()));
            }
            return Some(params);
        }
        self.v2c.as_ref().map(|v2c| {
            vec![
                ("protocol", "2c".to_string()),
                ("community", v2c.community.clone()),
            ]
        })
    }
}

fn default_interval() -> u32 {
    1
}

fn default_retries() -> u32 {
    3
}

/// Scheduling settings shared by host templates and checks (minutes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSchedule {
    #[serde(default = "default_interval")]
    pub check_interval: u32,
    #[serde(default = "default_interval")]
    pub retry_interval: u32,
    #[serde(default = "default_retries")]
    pub max_check_retries: u32,
}

impl Default for CheckSchedule {
    fn default() -> Self {
        Self {
            check_interval: default_interval(),
            retry_interval: default_interval(),
            max_check_retries: default_retries(),
        }
    }
}

impl CheckSchedule {
    /// Notifications repeat every minute or every check, whichever is
    /// longer. Nagios warns on reload about anything shorter.
    pub fn notification_interval(&self) -> u32 {
        self.check_interval.max(1)
    }
}

/// Poll a single SNMP value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnmpValueCheck {
    pub name: String,
    pub check_description: String,
    pub snmp_oid: String,
    #[serde(flatten)]
    pub thresholds: Thresholds,
    #[serde(flatten)]
    pub schedule: CheckSchedule,
    #[serde(default)]
    pub rate_check: bool,
    #[serde(default)]
    pub reactions: LevelReactions,
}

/// Poll several SNMP values and combine them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnmpAggregateCheck {
    pub name: String,
    pub check_description: String,
    pub snmp_oids: Vec<String>,
    pub on_unknown: String,
    #[serde(default)]
    pub aggregation_type: Aggregation,
    #[serde(flatten)]
    pub thresholds: Thresholds,
    #[serde(flatten)]
    pub schedule: CheckSchedule,
    #[serde(default)]
    pub rate_check: bool,
    #[serde(default)]
    pub reactions: LevelReactions,
}

/// React to an SNMP trap received from an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapReactionCheck {
    pub name: String,
    pub trap_oid: String,
    #[serde(default)]
    pub reaction: Option<ReactionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckSpec {
    SnmpValue(SnmpValueCheck),
    SnmpAggregate(SnmpAggregateCheck),
    TrapReaction(TrapReactionCheck),
}

impl CheckSpec {
    /// Identifier used to address the check's configuration file.
    pub fn name(&self) -> &str {
        match self {
            CheckSpec::SnmpValue(c) => &c.name,
            CheckSpec::SnmpAggregate(c) => &c.name,
            CheckSpec::TrapReaction(c) => &c.name,
        }
    }

    /// Object template the check is rendered with.
    pub fn template_name(&self) -> &'static str {
        match self {
            CheckSpec::SnmpValue(_) => "snmp_poll",
            CheckSpec::SnmpAggregate(_) => "snmp_aggregate",
            CheckSpec::TrapReaction(_) => "trap",
        }
    }
}

/// Everything needed to create a target type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTypeSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub instance_health_check: String,
    #[serde(flatten)]
    pub schedule: CheckSchedule,
    #[serde(default)]
    pub snmp: SnmpProperties,
    pub checks: Vec<CheckSpec>,
    #[serde(default)]
    pub instance_failure_reaction: Option<WorkflowSpec>,
}

// ── Groups ─────────────────────────────────────────────────────

/// Aggregate check configuration stored with a group type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCheckConfiguration {
    pub unknown: String,
    pub approach: Aggregation,
    #[serde(default = "default_interval")]
    pub check_interval: u32,
    #[serde(flatten)]
    pub thresholds: Thresholds,
}

/// Input for creating a group type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTypeSpec {
    pub name: String,
    pub checks: Vec<String>,
    #[serde(flatten)]
    pub check_configuration: GroupCheckConfiguration,
    #[serde(default)]
    pub reactions: LevelReactions,
}

/// The on-disk group type descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTypeDescriptor {
    pub services: Vec<String>,
    pub reactions: LevelReactions,
    pub check_configuration: GroupCheckConfiguration,
}

/// A meta-group: an aggregate over group instances sharing a name prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaGroupSpec {
    pub tenant: String,
    pub group_type: String,
    pub group_instance_prefix: String,
    pub approach: Aggregation,
    pub unknown: String,
    #[serde(default = "default_interval")]
    pub check_interval: u32,
    #[serde(flatten)]
    pub thresholds: Thresholds,
    pub reaction_target: String,
    #[serde(default)]
    pub low_reaction: Option<WorkflowSpec>,
    #[serde(default)]
    pub high_reaction: Option<WorkflowSpec>,
}

// ── Traps ──────────────────────────────────────────────────────

/// Where in a trap to find the instance it concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapInstanceLookup {
    pub oid: String,
    pub finder: String,
}

/// Per-OID trap handling configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrapConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<TrapInstanceLookup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid_for_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn thresholds_render_empty_when_unset() {
        let thresholds = Thresholds {
            high_critical_threshold: Some(90.0),
            low_warning_threshold: Some(2.5),
            ..Default::default()
        };
        let params: BTreeMap<_, _> = thresholds.template_params().into_iter().collect();
        assert_eq!(params["high_critical_threshold"], "90");
        assert_eq!(params["low_warning_threshold"], "2.5");
        assert_eq!(params["low_critical_threshold"], "");
    }

    #[test]
    fn snmp_v3_preferred_over_v2c() {
        let snmp = SnmpProperties {
            v3: Some(SnmpV3 {
                username: "mon".to_string(),
                auth_pass: "a".to_string(),
                priv_pass: "p".to_string(),
                context: None,
            }),
            v2c: Some(SnmpV2c {
                community: "public".to_string(),
            }),
        };
        let params = snmp.connection_params().unwrap();
        assert!(params.contains(&("protocol", "3".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "community"));
    }

    #[test]
    fn no_snmp_configuration() {
        assert!(SnmpProperties::default().connection_params().is_none());
    }

    #[test]
    fn check_spec_tagged_by_kind() {
        let check: CheckSpec = serde_json::from_value(json!({
            "kind": "snmp_aggregate",
            "name": "load",
            "check_description": "Load average",
            "snmp_oids": ["1.3.6.1.4.1.2021.10.1.3.1", "1.3.6.1.4.1.2021.10.1.3.2"],
            "on_unknown": "ignore",
            "aggregation_type": "sum",
            "high_critical_threshold": 4.0,
            "check_interval": 5
        }))
        .unwrap();
        assert_eq!(check.template_name(), "snmp_aggregate");
        let CheckSpec::SnmpAggregate(aggregate) = check else {
            panic!("expected aggregate check");
        };
        assert_eq!(aggregate.aggregation_type, Aggregation::Sum);
        assert_eq!(aggregate.schedule.check_interval, 5);
        assert_eq!(aggregate.schedule.max_check_retries, 3);
        assert_eq!(aggregate.thresholds.high_critical_threshold, Some(4.0));
    }

    #[test]
    fn notification_interval_at_least_one_minute() {
        let schedule = CheckSchedule {
            check_interval: 0,
            ..Default::default()
        };
        assert_eq!(schedule.notification_interval(), 1);
    }

    #[test]
    fn empty_reactions_dropped_on_validation() {
        let reactions = LevelReactions {
            low: Some(ReactionEntry {
                workflow: WorkflowSpec::new(""),
                constraints: None,
            }),
            high: Some(ReactionEntry {
                workflow: WorkflowSpec::new("scale"),
                constraints: Some(InstanceConstraints {
                    min_instances: None,
                    max_instances: Some(5),
                }),
            }),
        };
        let validated = reactions.validated(&[]).unwrap();
        assert!(validated.low.is_none());
        assert_eq!(validated.high.unwrap().workflow.workflow_id, "scale");
    }

    #[test]
    fn reaction_bundle_serializes_without_host() {
        let bundle = ReactionBundle::default();
        assert_eq!(
            serde_json::to_value(&bundle).unwrap(),
            json!({"checks": {}, "traps": {}})
        );
    }
}
