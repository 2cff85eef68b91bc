use serde::{Deserialize, Serialize};

use cvd_core::error::CvdError;
use cvd_core::group::Group;

use crate::database::Database;

/// The on-disk shape of a [`Database`] (spec §4.C: "MUST be able to
/// serialize its full state to JSON and restore from it").
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotV1 {
    groups: Vec<Group>,
    acloud_translator_optout: bool,
}

impl Database {
    pub fn to_json(&self) -> Result<String, CvdError> {
        let snapshot = SnapshotV1 {
            groups: self.groups().cloned().collect(),
            acloud_translator_optout: self.acloud_translator_optout(),
        };
        serde_json::to_string_pretty(&snapshot).map_err(|e| CvdError::Io(e.to_string()))
    }

    /// Rebuild a database from a JSON snapshot. Every group is re-validated
    /// and re-indexed exactly as [`Database::add_group`] would; a corrupt or
    /// inconsistent snapshot (duplicate group names, duplicate instance ids,
    /// an internally invalid group) is rejected wholesale rather than
    /// partially loaded (spec §4.C: "a corrupt snapshot file MUST NOT be
    /// partially loaded").
    pub fn from_json(data: &str) -> Result<Self, CvdError> {
        let snapshot: SnapshotV1 =
            serde_json::from_str(data).map_err(|e| CvdError::corrupt_state(format!("parsing snapshot: {e}")))?;
        let mut db = Database::new();
        for group in snapshot.groups {
            db.add_group(group).map_err(|e| {
                CvdError::corrupt_state(format!("snapshot failed validation on reload: {e}"))
            })?;
        }
        db.set_acloud_translator_optout(snapshot.acloud_translator_optout);
        Ok(db)
    }
}
