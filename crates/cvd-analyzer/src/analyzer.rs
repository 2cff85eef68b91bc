use std::collections::{BTreeSet, HashMap};

use cvd_core::config::{ANDROID_HOST_OUT, ANDROID_PRODUCT_OUT, DEFAULT_GROUP_NAME, HOME};
use cvd_core::error::CvdError;
use cvd_core::instance::InstanceId;
use cvd_db::Database;
use cvd_lock::{allocate, IdRequest, LockFile, LockManager};
use tracing::info;

use crate::selector::{
    parse_selector_flags, resolve_id_source, resolve_name_selection, IdSource, NameSelection, SelectorFlags,
};

/// A single instance's resolved identity within a [`GroupCreationPlan`].
#[derive(Debug, Clone)]
pub struct PerInstancePlan {
    pub id: InstanceId,
    pub name: String,
}

/// The pure output of [`analyze`]: everything needed to create a group,
/// with locks already held on every id it names (spec §4.D).
pub struct GroupCreationPlan {
    pub group_name: String,
    pub home_dir: String,
    pub host_artifacts_path: String,
    pub product_out_path: String,
    pub instances: Vec<PerInstancePlan>,
    pub envs: HashMap<String, String>,
    pub locks: Vec<LockFile>,
}

/// Run the full 8-step analysis described in spec §4.D:
///
/// 1. Parse selector flags out of `selector_args`.
/// 2. Resolve where instance ids should come from (env, explicit,
///    base+count, or auto).
/// 3. Collect ids that are free in both the lock layer and the database.
/// 4. Allocate concrete ids against that pool.
/// 5. Keep only the locks for the allocated ids; release the rest.
/// 6. Name each instance (explicit names, or the decimal id).
/// 7. Resolve the group name.
/// 8. Resolve `HOME` and the artifact paths.
///
/// This function never mutates `db` — the caller commits the plan via
/// [`cvd_db::Database::add_group`] once it accepts the plan.
pub fn analyze(
    envs: &HashMap<String, String>,
    selector_args: &[String],
    db: &Database,
    lock_manager: &LockManager,
) -> Result<GroupCreationPlan, CvdError> {
    let (flags, _unrecognized) = parse_selector_flags(selector_args)?;
    let name_selection = resolve_name_selection(&flags)?;

    let id_source = resolve_id_source(&flags, &name_selection, envs)?;
    let held_locks = lock_manager.lock_all_available()?;
    let used_ids: BTreeSet<InstanceId> = db.all_instance_ids().collect();
    let available: BTreeSet<InstanceId> = held_locks
        .iter()
        .map(|l| l.instance_id())
        .filter(|id| !used_ids.contains(id))
        .collect();

    let request = match id_source {
        IdSource::Explicit(ids) => IdRequest::Explicit(ids.into_iter().collect()),
        IdSource::BaseAndCount { base, count } => {
            let run: BTreeSet<InstanceId> = (base..base + count as InstanceId).collect();
            IdRequest::Explicit(run)
        }
        IdSource::Auto(count) => IdRequest::Consecutive { count },
    };

    let allocated = allocate(&request, &available)?;

    let mut locks: Vec<LockFile> = Vec::new();
    for lock in held_locks {
        if allocated.contains(&lock.instance_id()) {
            locks.push(lock);
        }
        // locks not selected are dropped here, releasing them immediately.
    }
    locks.sort_by_key(|l| l.instance_id());

    let instance_names = resolve_instance_names(&flags, &name_selection, &allocated)?;
    let instances: Vec<PerInstancePlan> = allocated
        .iter()
        .zip(instance_names)
        .map(|(&id, name)| PerInstancePlan { id, name })
        .collect();

    let group_name = resolve_group_name(&flags, &name_selection, db, &allocated)?;
    let (home_dir, host_artifacts_path, product_out_path, envs_out) =
        resolve_home_and_artifacts(envs, &group_name)?;

    info!(group = %group_name, ids = ?allocated, "analyzed group creation plan");

    Ok(GroupCreationPlan {
        group_name,
        home_dir,
        host_artifacts_path,
        product_out_path,
        instances,
        envs: envs_out,
        locks,
    })
}

fn resolve_instance_names(
    flags: &SelectorFlags,
    name_selection: &Option<NameSelection>,
    allocated: &BTreeSet<InstanceId>,
) -> Result<Vec<String>, CvdError> {
    match name_selection {
        Some(NameSelection::Device { instances, .. }) => {
            if instances.len() != allocated.len() {
                return Err(CvdError::invalid_argument(format!(
                    "--name/--device_name lists {} instance(s) but {} id(s) were allocated",
                    instances.len(),
                    allocated.len()
                )));
            }
            Ok(instances.clone())
        }
        Some(NameSelection::InstanceList(names)) => {
            if names.len() != allocated.len() {
                return Err(CvdError::invalid_argument(format!(
                    "--name lists {} instance(s) but {} id(s) were allocated",
                    names.len(),
                    allocated.len()
                )));
            }
            Ok(names.clone())
        }
        Some(NameSelection::GroupOnly(_)) | None => {
            if let Some(names) = &flags.instance_names {
                if names.len() != allocated.len() {
                    return Err(CvdError::invalid_argument(format!(
                        "--instance_name lists {} names but {} ids were allocated",
                        names.len(),
                        allocated.len()
                    )));
                }
                return Ok(names.clone());
            }
            Ok(allocated.iter().map(|id| id.to_string()).collect())
        }
    }
}

/// `AnalyzeGroupName`: an explicit name wins; otherwise the literal
/// `"cvd"` if the database is empty, else `cvd_<id>_<id>_...` (verbatim
/// from the original's `GenDefaultGroupName`).
fn resolve_group_name(
    flags: &SelectorFlags,
    name_selection: &Option<NameSelection>,
    db: &Database,
    allocated: &BTreeSet<InstanceId>,
) -> Result<String, CvdError> {
    match name_selection {
        Some(NameSelection::Device { group, .. }) | Some(NameSelection::GroupOnly(group)) => {
            cvd_core::naming::validate_group_name(group)?;
            return Ok(group.clone());
        }
        Some(NameSelection::InstanceList(_)) | None => {}
    }
    if let Some(name) = &flags.group_name {
        cvd_core::naming::validate_group_name(name)?;
        return Ok(name.clone());
    }
    if !db.has_instance_groups() {
        return Ok(DEFAULT_GROUP_NAME.to_string());
    }
    let ids_joined = allocated
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("_");
    Ok(format!("cvd_{ids_joined}"))
}

/// `AnalyzeHome`: honor `$HOME` if the caller set one; otherwise synthesize
/// `<tmp>/<group_name>` and ensure it exists. `ANDROID_HOST_OUT` is
/// mandatory (spec §6); `ANDROID_PRODUCT_OUT` falls back to it.
fn resolve_home_and_artifacts(
    envs: &HashMap<String, String>,
    group_name: &str,
) -> Result<(String, String, String, HashMap<String, String>), CvdError> {
    let host_artifacts_path = envs
        .get(ANDROID_HOST_OUT)
        .cloned()
        .ok_or_else(|| CvdError::missing_env(ANDROID_HOST_OUT))?;
    let product_out_path = envs
        .get(ANDROID_PRODUCT_OUT)
        .cloned()
        .unwrap_or_else(|| host_artifacts_path.clone());

    let home_dir = match envs.get(HOME) {
        Some(home) if !home.is_empty() => home.clone(),
        _ => {
            let path = cvd_lock::temp_dir().join(group_name);
            std::fs::create_dir_all(&path).map_err(|e| CvdError::Io(e.to_string()))?;
            path.to_string_lossy().into_owned()
        }
    };

    let mut envs_out = envs.clone();
    envs_out.insert(HOME.to_string(), home_dir.clone());

    Ok((home_dir, host_artifacts_path, product_out_path, envs_out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet as BSet;

    fn envs_with_host_out(tmp: &std::path::Path) -> HashMap<String, String> {
        let mut e = HashMap::new();
        e.insert(ANDROID_HOST_OUT.to_string(), "/out".to_string());
        e.insert(HOME.to_string(), tmp.to_string_lossy().into_owned());
        e
    }

    #[test]
    fn test_analyze_first_group_defaults_to_cvd() {
        let tmp = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("TMPDIR", tmp.path()); }
        let db = Database::new();
        let lock_mgr = LockManager::with_pool(BSet::from([1, 2, 3]));
        let envs = envs_with_host_out(tmp.path());
        let plan = analyze(&envs, &[], &db, &lock_mgr).unwrap();
        assert_eq!(plan.group_name, "cvd");
        assert_eq!(plan.instances.len(), 1);
        assert_eq!(plan.instances[0].name, plan.instances[0].id.to_string());
    }

    #[test]
    fn test_analyze_missing_android_host_out_errors() {
        let tmp = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("TMPDIR", tmp.path()); }
        let db = Database::new();
        let lock_mgr = LockManager::with_pool(BSet::from([1]));
        let mut envs = HashMap::new();
        envs.insert(HOME.to_string(), tmp.path().to_string_lossy().into_owned());
        let err = analyze(&envs, &[], &db, &lock_mgr).unwrap_err();
        assert!(matches!(err, CvdError::MissingEnv(_)));
    }

    #[test]
    fn test_analyze_with_num_instances_allocates_consecutive() {
        let tmp = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("TMPDIR", tmp.path()); }
        let db = Database::new();
        let lock_mgr = LockManager::with_pool(BSet::from([1, 2, 3, 4]));
        let envs = envs_with_host_out(tmp.path());
        let args = vec!["--num_instances".to_string(), "2".to_string()];
        let plan = analyze(&envs, &args, &db, &lock_mgr).unwrap();
        let ids: Vec<_> = plan.instances.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_analyze_with_explicit_name() {
        let tmp = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("TMPDIR", tmp.path()); }
        let db = Database::new();
        let lock_mgr = LockManager::with_pool(BSet::from([1]));
        let envs = envs_with_host_out(tmp.path());
        let args = vec!["--name".to_string(), "mygroup-dev1".to_string()];
        let plan = analyze(&envs, &args, &db, &lock_mgr).unwrap();
        assert_eq!(plan.group_name, "mygroup");
        assert_eq!(plan.instances[0].name, "dev1");
    }

    /// spec §8 scenario 2: explicit ids plus a shared-group device name list.
    #[test]
    fn test_analyze_scenario_2_instance_nums_with_device_name_list() {
        let tmp = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("TMPDIR", tmp.path()); }
        let db = Database::new();
        let lock_mgr = LockManager::with_pool(BSet::from([1, 2, 3, 4]));
        let envs = envs_with_host_out(tmp.path());
        let args = vec![
            "--instance_nums".to_string(),
            "3,4".to_string(),
            "--name".to_string(),
            "foo-a,foo-b".to_string(),
        ];
        let plan = analyze(&envs, &args, &db, &lock_mgr).unwrap();
        assert_eq!(plan.group_name, "foo");
        let names: Vec<_> = plan.instances.iter().map(|i| i.name.as_str()).collect();
        let ids: Vec<_> = plan.instances.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(names, vec!["a", "b"]);
    }

    /// spec §8 scenario 3: a non-empty database falls back to `cvd_<id>_<id>`.
    #[test]
    fn test_analyze_scenario_3_default_name_with_existing_group() {
        let tmp = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("TMPDIR", tmp.path()); }
        let mut db = Database::new();
        db.add_group(cvd_core::group::Group {
            group_name: "cvd".to_string(),
            home_dir: "/home/cvd".to_string(),
            host_artifacts_path: "/out".to_string(),
            product_out_path: "/out".to_string(),
            instances: vec![cvd_core::instance::Instance::new(1, "1")],
            start_time: "2026-01-01T00:00:00Z".to_string(),
        })
        .unwrap();
        let lock_mgr = LockManager::with_pool(BSet::from([1, 2, 3, 4]));
        let envs = envs_with_host_out(tmp.path());
        let args = vec!["--num_instances".to_string(), "2".to_string()];
        let plan = analyze(&envs, &args, &db, &lock_mgr).unwrap();
        assert_eq!(plan.group_name, "cvd_2_3");
        let ids: Vec<_> = plan.instances.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    /// spec §8 scenario 4: `--name x --group_name y` is rejected.
    #[test]
    fn test_analyze_scenario_4_name_and_group_name_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("TMPDIR", tmp.path()); }
        let db = Database::new();
        let lock_mgr = LockManager::with_pool(BSet::from([1]));
        let envs = envs_with_host_out(tmp.path());
        let args = vec![
            "--name".to_string(),
            "x".to_string(),
            "--group_name".to_string(),
            "y".to_string(),
        ];
        let err = analyze(&envs, &args, &db, &lock_mgr).unwrap_err();
        assert!(matches!(err, CvdError::InvalidArgument(_)));
    }
}
