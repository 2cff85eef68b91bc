use std::collections::HashMap;

use cvd_core::error::CvdError;
use cvd_core::group::Group;
use cvd_core::instance::{Instance, InstanceStatus};
use cvd_core::time::utc_now;
use cvd_db::{Database, Query};
use cvd_lock::{InUseState, LockFile, LockManager};
use tracing::info;

/// The in-process root object wiring the lock layer to the database
/// (spec §0). One `CvdDaemon` owns every lock it has acquired on behalf of
/// a live group for as long as that group exists — the OS-level flock is
/// released only when the group is removed (spec §3 invariant iv).
pub struct CvdDaemon {
    lock_manager: LockManager,
    db: Database,
    held_locks: HashMap<String, Vec<LockFile>>,
}

impl CvdDaemon {
    pub fn new() -> Result<Self, CvdError> {
        Ok(Self {
            lock_manager: LockManager::discover()?,
            db: Database::new(),
            held_locks: HashMap::new(),
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Run the creation analyzer, mark every allocated lock `InUse`, and
    /// register the resulting group. On any failure after locks are
    /// acquired, the locks are dropped (and thus released) before the error
    /// propagates.
    pub fn create_group(&mut self, envs: &HashMap<String, String>, selector_args: &[String]) -> Result<String, CvdError> {
        let mut plan = cvd_analyzer::analyze(envs, selector_args, &self.db, &self.lock_manager)?;

        for lock in &mut plan.locks {
            lock.set_status(InUseState::InUse)?;
        }

        let group = Group {
            group_name: plan.group_name.clone(),
            home_dir: plan.home_dir,
            host_artifacts_path: plan.host_artifacts_path,
            product_out_path: plan.product_out_path,
            instances: plan
                .instances
                .into_iter()
                .map(|i| Instance::new(i.id, i.name))
                .collect(),
            start_time: utc_now(),
        };

        let group_name = group.group_name.clone();
        self.db.add_group(group)?;
        self.held_locks.insert(group_name.clone(), plan.locks);
        info!(group = %group_name, "created group");
        Ok(group_name)
    }

    /// Remove a group, release its locks, and delete their lockfiles from
    /// disk (spec §3: "Removing a Group MUST release all its lockfiles").
    pub fn remove_group(&mut self, group_name: &str) -> Result<(), CvdError> {
        let group = self.db.remove_group(group_name)?;
        if let Some(mut locks) = self.held_locks.remove(group_name) {
            for lock in &mut locks {
                lock.set_status(InUseState::NotInUse)?;
            }
            for lock in &locks {
                self.lock_manager.remove_lock_file(lock.instance_id())?;
            }
            // locks drop here, releasing the flock.
        } else {
            for id in group.instance_ids() {
                self.lock_manager.remove_lock_file(id)?;
            }
        }
        info!(group = %group_name, "removed group");
        Ok(())
    }

    pub fn set_group_status(&mut self, group_name: &str, status: InstanceStatus) -> Result<(), CvdError> {
        let instance_names: Vec<String> = {
            let group = self.db.find_group(&Query::by_group_name(group_name))?;
            group.instances.iter().map(|i| i.name.clone()).collect()
        };
        for name in instance_names {
            self.db.update_instance(group_name, &name, |inst| inst.status = status)?;
        }
        Ok(())
    }
}
