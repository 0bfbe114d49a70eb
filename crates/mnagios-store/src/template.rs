//! Nagios object templates and `{{ placeholder }}` rendering.
//!
//! Rendering is verbatim substitution in a single pass: substituted values
//! are never rescanned, and there are no conditionals or loops. A
//! placeholder without a parameter fails the render, so nothing half
//! rendered ever reaches the objects tree.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{StoreError, StoreResult};

/// Object templates shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTemplate {
    Hostgroup,
    Node,
    Target,
    TargetType,
    TargetTypeHost,
    SnmpPoll,
    SnmpAggregate,
    Trap,
    GroupType,
    Group,
    GroupCheck,
    MetaGroupCheck,
}

impl BuiltinTemplate {
    pub const ALL: [BuiltinTemplate; 12] = [
        BuiltinTemplate::Hostgroup,
        BuiltinTemplate::Node,
        BuiltinTemplate::Target,
        BuiltinTemplate::TargetType,
        BuiltinTemplate::TargetTypeHost,
        BuiltinTemplate::SnmpPoll,
        BuiltinTemplate::SnmpAggregate,
        BuiltinTemplate::Trap,
        BuiltinTemplate::GroupType,
        BuiltinTemplate::Group,
        BuiltinTemplate::GroupCheck,
        BuiltinTemplate::MetaGroupCheck,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinTemplate::Hostgroup => "hostgroup",
            BuiltinTemplate::Node => "node",
            BuiltinTemplate::Target => "target",
            BuiltinTemplate::TargetType => "target_type",
            BuiltinTemplate::TargetTypeHost => "target_type_host",
            BuiltinTemplate::SnmpPoll => "snmp_poll",
            BuiltinTemplate::SnmpAggregate => "snmp_aggregate",
            BuiltinTemplate::Trap => "trap",
            BuiltinTemplate::GroupType => "group_type",
            BuiltinTemplate::Group => "group",
            BuiltinTemplate::GroupCheck => "group_check",
            BuiltinTemplate::MetaGroupCheck => "meta_group_check",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    fn source(&self) -> &'static str {
        match self {
            BuiltinTemplate::Hostgroup => include_str!("../templates/hostgroup.template"),
            BuiltinTemplate::Node => include_str!("../templates/node.template"),
            BuiltinTemplate::Target => include_str!("../templates/target.template"),
            BuiltinTemplate::TargetType => include_str!("../templates/target_type.template"),
            BuiltinTemplate::TargetTypeHost => {
                include_str!("../templates/target_type_host.template")
            }
            BuiltinTemplate::SnmpPoll => include_str!("../templates/snmp_poll.template"),
            BuiltinTemplate::SnmpAggregate => include_str!("../templates/snmp_aggregate.template"),
            BuiltinTemplate::Trap => include_str!("../templates/trap.template"),
            BuiltinTemplate::GroupType => include_str!("../templates/group_type.template"),
            BuiltinTemplate::Group => include_str!("../templates/group.template"),
            BuiltinTemplate::GroupCheck => include_str!("../templates/group_check.template"),
            BuiltinTemplate::MetaGroupCheck => {
                include_str!("../templates/meta_group_check.template")
            }
        }
    }
}

/// Where a deployed object's text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Builtin(BuiltinTemplate),
    File(PathBuf),
}

impl From<BuiltinTemplate> for TemplateSource {
    fn from(template: BuiltinTemplate) -> Self {
        TemplateSource::Builtin(template)
    }
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateSource::Builtin(t) => f.write_str(t.name()),
            TemplateSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Substitution parameters for a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateParams(BTreeMap<String, String>);

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl ToString) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn extend<'a>(mut self, pairs: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        for (key, value) in pairs {
            self.0.insert(key.to_string(), value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Resolves template sources, preferring on-disk overrides.
#[derive(Debug, Clone, Default)]
pub struct Templates {
    override_dir: Option<PathBuf>,
}

impl Templates {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    pub fn load(&self, source: &TemplateSource) -> StoreResult<Cow<'static, str>> {
        match source {
            TemplateSource::Builtin(template) => {
                if let Some(dir) = &self.override_dir {
                    let path = dir.join(format!("{}.template", template.name()));
                    if path.is_file() {
                        return read_template(path).map(Cow::Owned);
                    }
                }
                Ok(Cow::Borrowed(template.source()))
            }
            TemplateSource::File(path) => read_template(path.clone()).map(Cow::Owned),
        }
    }

    /// Load and render `source` with `params`.
    pub fn render(&self, source: &TemplateSource, params: &TemplateParams) -> StoreResult<String> {
        let text = self.load(source)?;
        render(&source.to_string(), &text, params)
    }
}

fn read_template(path: PathBuf) -> StoreResult<String> {
    std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::TemplateMissing(path.display().to_string())
        } else {
            StoreError::io("read template", path, e)
        }
    })
}

/// Substitute every `{{ key }}` in `text`.
pub fn render(name: &str, text: &str, params: &TemplateParams) -> StoreResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let key = rest[start + 2..start + 2 + len].trim();
        let value = params.get(key).ok_or_else(|| StoreError::Template {
            template: name.to_string(),
            placeholder: key.to_string(),
        })?;
        out.push_str(&rest[..start]);
        out.push_str(value);
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_placeholders_verbatim() {
        let params = TemplateParams::new()
            .with("name", "tenant:acme")
            .with("description", "{{ name }}");
        let out = render("t", "hostgroup_name {{ name }}\nalias {{description}}\n", &params).unwrap();
        // Substituted values are not rescanned.
        assert_eq!(out, "hostgroup_name tenant:acme\nalias {{ name }}\n");
    }

    #[test]
    fn missing_parameter_is_an_error() {
        let err = render("hostgroup", "{{ name }} {{ alias }}", &TemplateParams::new().with("name", "x"))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Template { ref placeholder, .. } if placeholder == "alias"
        ));
    }

    #[test]
    fn unterminated_placeholder_left_alone() {
        let out = render("t", "a {{ b", &TemplateParams::new()).unwrap();
        assert_eq!(out, "a {{ b");
    }

    #[test]
    fn builtin_templates_round_trip_names() {
        for template in BuiltinTemplate::ALL {
            assert_eq!(BuiltinTemplate::from_name(template.name()), Some(template));
            assert!(template.source().contains("define "));
        }
    }

    #[test]
    fn override_dir_wins_over_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hostgroup.template"), "custom {{ name }}").unwrap();
        let templates = Templates::new(Some(dir.path().to_path_buf()));
        let out = templates
            .render(
                &BuiltinTemplate::Hostgroup.into(),
                &TemplateParams::new().with("name", "g"),
            )
            .unwrap();
        assert_eq!(out, "custom g");
    }

    #[test]
    fn missing_file_template() {
        let templates = Templates::default();
        let err = templates
            .load(&TemplateSource::File("/nonexistent/x.template".into()))
            .unwrap_err();
        assert!(matches!(err, StoreError::TemplateMissing(_)));
    }
}
