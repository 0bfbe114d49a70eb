//! Group instances, meta-groups and membership.
//!
//! Every group of a type in a tenant hangs its aggregate check off one
//! shared group host, `tenant:<T>/group_type:<G>`. Membership is one empty
//! marker file per node, so nodes joining concurrently never write the
//! same file:
//!
//! ```text
//! groups/members/<T>/<G>/<group>/<deployment>/<node>
//! ```

use std::path::Path;
use std::sync::Arc;

use mnagios_core::{
    INSTANCE_SUBSTITUTION, LevelReactions, MetaGroupSpec, ReactionEntry, WorkflowSpec,
};
use mnagios_store::{
    BuiltinTemplate, ConfigStore, DeployOptions, Privilege, Removal, RemoveOptions, TemplateParams,
};
use mnagios_targets::ensure_tenant_hostgroup;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{GroupError, GroupResult};
use crate::group_type::{check_group_name, load_group_type};

pub struct GroupManager {
    store: Arc<ConfigStore>,
    privilege: Privilege,
}

impl GroupManager {
    pub fn new(store: Arc<ConfigStore>, privilege: Privilege) -> Self {
        Self { store, privilege }
    }

    // ── Group instances ────────────────────────────────────────────

    pub fn create_group_instance(
        &self,
        tenant: &str,
        group_type: &str,
        group_name: &str,
        reaction_target: &str,
    ) -> GroupResult<()> {
        check_group_name(group_name)?;
        let layout = self.store.layout();
        let target_path = layout.group_reaction_target(tenant, group_type, group_name)?;
        let configuration = load_group_type(&self.store, group_type)?.check_configuration;

        info!(%tenant, %group_type, %group_name, "creating group instance");
        self.store
            .deploy_data(&target_path, reaction_target, self.privilege)?;
        self.ensure_group_host(tenant, group_type)?;

        let params = TemplateParams::new()
            .with("tenant", tenant)
            .with("group_type", group_type)
            .with("group_name", group_name)
            .with("approach", configuration.approach.as_str())
            .with("unknown", &configuration.unknown)
            .with("check_interval", configuration.check_interval)
            .extend(configuration.thresholds.template_params());
        self.store.deploy(
            &layout.group_instance(group_type, group_name, tenant),
            &BuiltinTemplate::GroupCheck.into(),
            &params,
            DeployOptions::new(self.privilege),
        )?;
        Ok(())
    }

    /// Remove a group instance's check, reaction target and member
    /// listing. Parts already gone are skipped.
    pub fn delete_group_instance(&self, tenant: &str, group_type: &str, group_name: &str) -> GroupResult<()> {
        let layout = self.store.layout();
        let target_path = layout.group_reaction_target(tenant, group_type, group_name)?;
        let members = layout.group_members(tenant, group_type, group_name)?;

        info!(%tenant, %group_type, %group_name, "deleting group instance");
        let removal = self.remove_check(&layout.group_instance(group_type, group_name, tenant))?;
        self.store.remove_tree(&target_path, self.privilege)?;
        self.store.remove_tree(&members, self.privilege)?;
        if removal == Removal::Removed {
            self.store.trigger_reload(self.privilege)?;
        }
        Ok(())
    }

    // ── Meta-groups ────────────────────────────────────────────────

    pub fn create_meta_group(&self, spec: &MetaGroupSpec) -> GroupResult<()> {
        let MetaGroupSpec {
            tenant,
            group_type,
            group_instance_prefix: prefix,
            ..
        } = spec;
        check_group_name(prefix)?;
        let layout = self.store.layout();
        let reactions_path = layout.meta_group_reactions(tenant, group_type, prefix)?;
        let target_path = layout.meta_group_reaction_target(tenant, group_type, prefix)?;
        load_group_type(&self.store, group_type)?;

        let reactions = LevelReactions {
            low: reaction(spec.low_reaction.as_ref()),
            high: reaction(spec.high_reaction.as_ref()),
        }
        .validated(&[INSTANCE_SUBSTITUTION])?;
        let reactions = serde_json::to_string(&json!({ "reactions": reactions })).map_err(|source| {
            GroupError::Encode {
                what: "meta group reactions",
                source,
            }
        })?;

        info!(%tenant, %group_type, %prefix, "creating meta group");
        self.store
            .deploy_data(&reactions_path, &reactions, self.privilege)?;
        self.store
            .deploy_data(&target_path, &spec.reaction_target, self.privilege)?;
        self.ensure_group_host(tenant, group_type)?;

        let params = TemplateParams::new()
            .with("tenant", tenant)
            .with("group_type", group_type)
            .with("group_instance_prefix", prefix)
            .with("approach", spec.approach.as_str())
            .with("unknown", &spec.unknown)
            .with("check_interval", spec.check_interval)
            .extend(spec.thresholds.template_params());
        self.store.deploy(
            &layout.meta_group(group_type, prefix, tenant),
            &BuiltinTemplate::MetaGroupCheck.into(),
            &params,
            DeployOptions::new(self.privilege),
        )?;
        Ok(())
    }

    pub fn delete_meta_group(&self, tenant: &str, group_type: &str, prefix: &str) -> GroupResult<()> {
        let layout = self.store.layout();
        let reactions_path = layout.meta_group_reactions(tenant, group_type, prefix)?;
        let target_path = layout.meta_group_reaction_target(tenant, group_type, prefix)?;

        info!(%tenant, %group_type, %prefix, "deleting meta group");
        let removal = self.remove_check(&layout.meta_group(group_type, prefix, tenant))?;
        self.store.remove_tree(&reactions_path, self.privilege)?;
        self.store.remove_tree(&target_path, self.privilege)?;
        if removal == Removal::Removed {
            self.store.trigger_reload(self.privilege)?;
        }
        Ok(())
    }

    // ── Membership ─────────────────────────────────────────────────

    pub fn associate_node_with_group(
        &self,
        tenant: &str,
        deployment: &str,
        node: &str,
        group_type: &str,
        group_name: &str,
    ) -> GroupResult<()> {
        let marker = self
            .store
            .layout()
            .group_member_node(tenant, deployment, group_type, group_name, node)?;
        load_group_type(&self.store, group_type)?;
        self.store.touch(&marker, self.privilege)?;
        debug!(%tenant, %deployment, %node, %group_type, %group_name, "node joined group");
        Ok(())
    }

    /// `(deployment, node)` pairs listed as members of a group.
    pub fn group_members(&self, tenant: &str, group_type: &str, group_name: &str) -> GroupResult<Vec<(String, String)>> {
        let dir = self.store.layout().group_members(tenant, group_type, group_name)?;
        let mut members = Vec::new();
        for deployment in self.store.list_dirs(&dir)? {
            for node in self.store.list_files(&dir.join(&deployment), None)? {
                members.push((deployment.clone(), node));
            }
        }
        Ok(members)
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn ensure_group_host(&self, tenant: &str, group_type: &str) -> GroupResult<()> {
        ensure_tenant_hostgroup(&self.store, tenant, self.privilege)?;
        self.store.ensure(
            &self.store.layout().group_host(group_type, tenant),
            &BuiltinTemplate::Group.into(),
            &TemplateParams::new()
                .with("tenant", tenant)
                .with("group_type", group_type),
            DeployOptions::new(self.privilege).without_reload(),
        )?;
        Ok(())
    }

    fn remove_check(&self, path: &Path) -> GroupResult<Removal> {
        Ok(self.store.remove(
            path,
            RemoveOptions::new(self.privilege)
                .without_reload()
                .ignoring_missing(),
        )?)
    }
}

fn reaction(workflow: Option<&WorkflowSpec>) -> Option<ReactionEntry> {
    workflow.map(|workflow| ReactionEntry {
        workflow: workflow.clone(),
        constraints: None,
    })
}
