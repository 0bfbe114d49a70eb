//! Workflow reactions: what the orchestration engine should run when a
//! check crosses a threshold or a host fails.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Placeholder the trap/check handlers substitute with the reacting
/// instance id. Aggregate checks have no single instance, so it is
/// rejected there.
pub const INSTANCE_SUBSTITUTION: &str = "{{instance}}";

/// Errors raised while validating a workflow reaction.
#[derive(Debug, Error, PartialEq)]
pub enum WorkflowValidationError {
    #[error(
        "disallowed substitution found in workflow property \"{property}\". \
         Value was \"{value}\". Disallowed substitutions are {disallowed}"
    )]
    DisallowedSubstitution {
        property: String,
        value: String,
        disallowed: String,
    },
}

/// A workflow to start on the orchestration engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub workflow_id: String,
    #[serde(default = "empty_parameters")]
    pub parameters: Value,
    #[serde(default)]
    pub allow_custom_parameters: bool,
    #[serde(default)]
    pub force: bool,
}

fn empty_parameters() -> Value {
    Value::Object(Map::new())
}

impl WorkflowSpec {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            parameters: empty_parameters(),
            allow_custom_parameters: false,
            force: false,
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// A spec with an empty workflow id means "no reaction".
    pub fn is_empty(&self) -> bool {
        self.workflow_id.is_empty()
    }

    /// Validate against disallowed substrings.
    ///
    /// Returns `Ok(None)` for an empty spec. The workflow id and every
    /// string inside `parameters` (recursively) are checked.
    pub fn validate(
        self,
        disallowed: &[&str],
    ) -> Result<Option<WorkflowSpec>, WorkflowValidationError> {
        if self.is_empty() {
            return Ok(None);
        }
        check_string("workflow_id", &self.workflow_id, disallowed)?;
        check_value("parameters", &self.parameters, disallowed)?;
        Ok(Some(self))
    }
}

fn check_string(
    property: &str,
    value: &str,
    disallowed: &[&str],
) -> Result<(), WorkflowValidationError> {
    if disallowed.iter().any(|sub| value.contains(sub)) {
        return Err(WorkflowValidationError::DisallowedSubstitution {
            property: property.to_string(),
            value: value.to_string(),
            disallowed: disallowed.join(", "),
        });
    }
    Ok(())
}

fn check_value(
    property: &str,
    value: &Value,
    disallowed: &[&str],
) -> Result<(), WorkflowValidationError> {
    match value {
        Value::String(s) => check_string(property, s, disallowed),
        Value::Array(items) => items
            .iter()
            .try_for_each(|item| check_value(property, item, disallowed)),
        Value::Object(map) => map.iter().try_for_each(|(key, item)| {
            check_value(&format!("{property}.{key}"), item, disallowed)
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_workflow_is_no_reaction() {
        let spec = WorkflowSpec::new("");
        assert_eq!(spec.validate(&[INSTANCE_SUBSTITUTION]), Ok(None));
    }

    #[test]
    fn valid_workflow_passes_through() {
        let spec = WorkflowSpec::new("heal").with_parameters(json!({"node_instance_id": "{{instance}}"}));
        let validated = spec.clone().validate(&[]).unwrap();
        assert_eq!(validated, Some(spec));
    }

    #[test]
    fn nested_parameter_substitution_is_rejected() {
        let spec = WorkflowSpec::new("scale")
            .with_parameters(json!({"scalable_entity": {"ids": ["{{instance}}"]}}));
        let err = spec.validate(&[INSTANCE_SUBSTITUTION]).unwrap_err();
        let WorkflowValidationError::DisallowedSubstitution { property, .. } = err;
        assert_eq!(property, "parameters.scalable_entity.ids");
    }

    #[test]
    fn workflow_id_substitution_is_rejected() {
        let spec = WorkflowSpec::new("run_{{instance}}");
        assert!(spec.validate(&[INSTANCE_SUBSTITUTION]).is_err());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let spec: WorkflowSpec = serde_json::from_str(r#"{"workflow_id": "heal"}"#).unwrap();
        assert_eq!(spec.parameters, json!({}));
        assert!(!spec.allow_custom_parameters);
        assert!(!spec.force);
    }
}
