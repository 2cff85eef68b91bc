use serde::{Deserialize, Serialize};

/// A positive integer in the host's candidate pool (spec §3).
pub type InstanceId = u32;

/// Instance lifecycle status (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Preparing,
    Starting,
    Stopped,
    Running,
    Unknown,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preparing => write!(f, "preparing"),
            Self::Starting => write!(f, "starting"),
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One virtual Android device within a [`crate::group::Group`].
///
/// `id` is immutable once assigned. `name` defaults to the decimal form of
/// `id` when the caller does not supply a per-instance name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub name: String,
    pub status: InstanceStatus,
}

impl Instance {
    pub fn new(id: InstanceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: InstanceStatus::Preparing,
        }
    }

    /// An instance whose per-instance name defaults to the decimal id.
    pub fn with_default_name(id: InstanceId) -> Self {
        Self::new(id, id.to_string())
    }
}
