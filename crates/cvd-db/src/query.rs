use cvd_core::group::Group;
use cvd_core::instance::InstanceId;

/// A conjunction of optional filters over groups (spec §4.C).
///
/// Every set field must match for a group to be selected; an unset field
/// imposes no constraint. An all-`None` query matches every group.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub group_name: Option<String>,
    pub home_dir: Option<String>,
    pub instance_id: Option<InstanceId>,
    pub instance_name: Option<String>,
}

impl Query {
    pub fn by_group_name(name: impl Into<String>) -> Self {
        Self {
            group_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn by_home_dir(home_dir: impl Into<String>) -> Self {
        Self {
            home_dir: Some(home_dir.into()),
            ..Default::default()
        }
    }

    pub fn by_instance_id(id: InstanceId) -> Self {
        Self {
            instance_id: Some(id),
            ..Default::default()
        }
    }

    pub fn matches(&self, group: &Group) -> bool {
        if let Some(name) = &self.group_name {
            if &group.group_name != name {
                return false;
            }
        }
        if let Some(home) = &self.home_dir {
            if &group.home_dir != home {
                return false;
            }
        }
        if let Some(id) = self.instance_id {
            if !group.instance_ids().any(|i| i == id) {
                return false;
            }
        }
        if let Some(name) = &self.instance_name {
            if group.find_instance(name).is_none() {
                return false;
            }
        }
        true
    }
}
