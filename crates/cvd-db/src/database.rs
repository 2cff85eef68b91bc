use std::collections::HashMap;

use cvd_core::error::CvdError;
use cvd_core::group::Group;
use cvd_core::instance::InstanceId;
use tracing::{debug, info};

use crate::query::Query;

/// The in-memory, single-writer instance registry (spec §4.C).
///
/// Holds every live [`Group`], keyed by group name, plus a secondary index
/// from instance id to its owning group name so global id-uniqueness can be
/// checked in O(1). Not `Sync` by design — callers serialize access the way
/// the original `cvd_server` does, one request at a time.
#[derive(Debug, Default)]
pub struct Database {
    groups: HashMap<String, Group>,
    instance_owner: HashMap<InstanceId, String>,
    acloud_translator_optout: bool,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new group. Fails if the group name is already taken, if the
    /// group fails its own internal validation, or if any of its instance
    /// ids are already owned by another group (spec §4.C invariant:
    /// "`InstanceId` values are globally unique across all groups").
    pub fn add_group(&mut self, group: Group) -> Result<(), CvdError> {
        group.validate()?;
        if self.groups.contains_key(&group.group_name) {
            return Err(CvdError::conflict(format!(
                "group {:?} already exists",
                group.group_name
            )));
        }
        for id in group.instance_ids() {
            if let Some(owner) = self.instance_owner.get(&id) {
                return Err(CvdError::conflict(format!(
                    "instance id {id} already belongs to group {owner:?}"
                )));
            }
        }
        for id in group.instance_ids() {
            self.instance_owner.insert(id, group.group_name.clone());
        }
        info!(group = %group.group_name, instances = group.instances.len(), "added group");
        self.groups.insert(group.group_name.clone(), group);
        Ok(())
    }

    /// Remove the group whose `home_dir` equals `home_dir`. Used by group
    /// teardown, which locates the group by its working directory rather
    /// than by name (spec §4.C, mirrors `RemoveInstanceGroup(home)`).
    pub fn remove_group_by_home(&mut self, home_dir: &str) -> Result<Group, CvdError> {
        let name = self
            .groups
            .values()
            .find(|g| g.home_dir == home_dir)
            .map(|g| g.group_name.clone())
            .ok_or_else(|| CvdError::invalid_argument(format!("no group with home {home_dir:?}")))?;
        self.remove_group(&name)
    }

    pub fn remove_group(&mut self, group_name: &str) -> Result<Group, CvdError> {
        let group = self
            .groups
            .remove(group_name)
            .ok_or_else(|| CvdError::invalid_argument(format!("no such group {group_name:?}")))?;
        for id in group.instance_ids() {
            self.instance_owner.remove(&id);
        }
        debug!(group = group_name, "removed group");
        Ok(group)
    }

    /// Replace a group wholesale, re-validating and re-indexing it. The
    /// group must already exist under the same name.
    pub fn update_group(&mut self, group: Group) -> Result<(), CvdError> {
        group.validate()?;
        if !self.groups.contains_key(&group.group_name) {
            return Err(CvdError::invalid_argument(format!(
                "no such group {:?}",
                group.group_name
            )));
        }
        let old = self.groups.get(&group.group_name).unwrap();
        for id in old.instance_ids() {
            self.instance_owner.remove(&id);
        }
        for id in group.instance_ids() {
            if let Some(owner) = self.instance_owner.get(&id) {
                if owner != &group.group_name {
                    return Err(CvdError::conflict(format!(
                        "instance id {id} already belongs to group {owner:?}"
                    )));
                }
            }
        }
        for id in group.instance_ids() {
            self.instance_owner.insert(id, group.group_name.clone());
        }
        self.groups.insert(group.group_name.clone(), group);
        Ok(())
    }

    /// Update a single instance's mutable fields via `update_fn`, within the
    /// named group.
    pub fn update_instance<F>(&mut self, group_name: &str, instance_name: &str, update_fn: F) -> Result<(), CvdError>
    where
        F: FnOnce(&mut cvd_core::instance::Instance),
    {
        let group = self
            .groups
            .get_mut(group_name)
            .ok_or_else(|| CvdError::invalid_argument(format!("no such group {group_name:?}")))?;
        let instance = group
            .find_instance_mut(instance_name)
            .ok_or_else(|| CvdError::invalid_argument(format!("no such instance {instance_name:?}")))?;
        update_fn(instance);
        Ok(())
    }

    pub fn find_groups(&self, query: &Query) -> Vec<&Group> {
        self.groups.values().filter(|g| query.matches(g)).collect()
    }

    /// Find exactly one matching group, or error (spec §4.C: callers that
    /// need a single target, e.g. `cvd stop`, must disambiguate first).
    pub fn find_group(&self, query: &Query) -> Result<&Group, CvdError> {
        let mut matches = self.find_groups(query);
        match matches.len() {
            0 => Err(CvdError::invalid_argument("no group matches the given selectors")),
            1 => Ok(matches.pop().unwrap()),
            n => Err(CvdError::conflict(format!(
                "{n} groups match the given selectors, expected exactly one"
            ))),
        }
    }

    pub fn has_instance_groups(&self) -> bool {
        !self.groups.is_empty()
    }

    pub fn all_instance_ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instance_owner.keys().copied()
    }

    pub fn acloud_translator_optout(&self) -> bool {
        self.acloud_translator_optout
    }

    pub fn set_acloud_translator_optout(&mut self, value: bool) {
        self.acloud_translator_optout = value;
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }
}
