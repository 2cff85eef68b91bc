use serde::Serialize;
use tabled::Tabled;

use cvd_core::group::Group;

/// Display row for `cvd fleet` (one row per instance, grouped by group).
#[derive(Debug, Serialize, Tabled)]
pub struct InstanceRow {
    #[tabled(rename = "GROUP")]
    pub group_name: String,
    #[tabled(rename = "INSTANCE")]
    pub instance_name: String,
    #[tabled(rename = "ID")]
    pub instance_id: u32,
    #[tabled(rename = "STATUS")]
    pub status: String,
}

/// Display row for `cvd status` (one row per group).
#[derive(Debug, Serialize, Tabled)]
pub struct GroupRow {
    #[tabled(rename = "GROUP")]
    pub group_name: String,
    #[tabled(rename = "HOME")]
    pub home_dir: String,
    #[tabled(rename = "INSTANCES")]
    pub instance_count: usize,
    #[tabled(rename = "CREATED")]
    pub start_time: String,
}

impl From<&Group> for GroupRow {
    fn from(group: &Group) -> Self {
        Self {
            group_name: group.group_name.clone(),
            home_dir: group.home_dir.clone(),
            instance_count: group.instances.len(),
            start_time: group.start_time.clone(),
        }
    }
}

/// Flatten every instance across every group into display rows, for the
/// more detailed `cvd fleet` view.
pub fn instance_rows<'a>(groups: impl Iterator<Item = &'a Group>) -> Vec<InstanceRow> {
    groups
        .flat_map(|group| {
            group.instances.iter().map(move |inst| InstanceRow {
                group_name: group.group_name.clone(),
                instance_name: inst.name.clone(),
                instance_id: inst.id,
                status: inst.status.to_string(),
            })
        })
        .collect()
}
