use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CvdError;
use crate::instance::{Instance, InstanceId};
use crate::naming::validate_group_name;

/// A set of instances launched and named together (spec §3).
///
/// Within a `Group`, `Instance::name` values are unique. Across all groups
/// in one [`crate::database`](../cvd_db) database, `Instance::id` values are
/// globally unique — that invariant is enforced by the database, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub group_name: String,
    pub home_dir: String,
    pub host_artifacts_path: String,
    pub product_out_path: String,
    pub instances: Vec<Instance>,
    /// RFC 3339 timestamp captured when the group was created. Not a
    /// monotonic clock reading — processes restart and this must survive
    /// JSON round-trips, unlike `std::time::Instant`.
    pub start_time: String,
}

impl Group {
    /// Validate the invariants in spec §3: at least one instance, unique
    /// instance ids within the group, unique instance names within the
    /// group, and a syntactically valid group name.
    pub fn validate(&self) -> Result<(), CvdError> {
        validate_group_name(&self.group_name)?;
        if self.instances.is_empty() {
            return Err(CvdError::invalid_argument(format!(
                "group {:?} must have at least one instance",
                self.group_name
            )));
        }
        let mut seen_ids: HashSet<InstanceId> = HashSet::new();
        let mut seen_names: HashSet<&str> = HashSet::new();
        for instance in &self.instances {
            if !seen_ids.insert(instance.id) {
                return Err(CvdError::conflict(format!(
                    "duplicate instance id {} within group {:?}",
                    instance.id, self.group_name
                )));
            }
            if !seen_names.insert(instance.name.as_str()) {
                return Err(CvdError::conflict(format!(
                    "duplicate instance name {:?} within group {:?}",
                    instance.name, self.group_name
                )));
            }
        }
        Ok(())
    }

    pub fn instance_ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances.iter().map(|i| i.id)
    }

    pub fn find_instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    pub fn find_instance_mut(&mut self, name: &str) -> Option<&mut Instance> {
        self.instances.iter_mut().find(|i| i.name == name)
    }
}
