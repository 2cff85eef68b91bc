use std::collections::BTreeSet;

use cvd_core::error::CvdError;
use cvd_core::instance::InstanceId;

/// What the caller asked for when requesting instance ids (spec §4.B).
#[derive(Debug, Clone)]
pub enum IdRequest {
    /// Use exactly these ids. Fails unless every id is free.
    Explicit(BTreeSet<InstanceId>),
    /// Allocate `count` ids that form a consecutive run, preferring the
    /// smallest starting id. Fails if no such run of free ids exists.
    Consecutive { count: usize },
    /// Allocate any `count` free ids, ascending, no contiguity requirement.
    Any { count: usize },
}

/// Pick ids to satisfy `request` out of `available` (the ids whose lock was
/// just confirmed `NotInUse` by the lock manager). Pure function: never
/// touches the filesystem, so it's unit-testable without the lock layer.
///
/// Grounded on `IdAllocator::UniqueConsecutiveItems` /
/// `CreationAnalyzer::AnalyzeInstanceIdsWithLockInternal` in the original
/// sources: consecutive-run search always prefers the smallest valid start.
pub fn allocate(request: &IdRequest, available: &BTreeSet<InstanceId>) -> Result<BTreeSet<InstanceId>, CvdError> {
    match request {
        IdRequest::Explicit(ids) => {
            let missing: Vec<InstanceId> = ids.iter().filter(|id| !available.contains(id)).copied().collect();
            if !missing.is_empty() {
                return Err(CvdError::resource_busy(format!(
                    "requested instance id(s) not available: {missing:?}"
                )));
            }
            Ok(ids.clone())
        }
        IdRequest::Consecutive { count } => {
            allocate_consecutive(*count, available)
        }
        IdRequest::Any { count } => {
            if available.len() < *count {
                return Err(CvdError::resource_busy(format!(
                    "requested {count} instance ids but only {} are available",
                    available.len()
                )));
            }
            Ok(available.iter().take(*count).copied().collect())
        }
    }
}

fn allocate_consecutive(count: usize, available: &BTreeSet<InstanceId>) -> Result<BTreeSet<InstanceId>, CvdError> {
    if count == 0 {
        return Ok(BTreeSet::new());
    }
    let sorted: Vec<InstanceId> = available.iter().copied().collect();
    for (start_idx, &start_id) in sorted.iter().enumerate() {
        let mut run = BTreeSet::from([start_id]);
        let mut expected = start_id;
        for &candidate in &sorted[start_idx + 1..] {
            expected += 1;
            if candidate != expected {
                break;
            }
            run.insert(candidate);
            if run.len() == count {
                return Ok(run);
            }
        }
        if run.len() == count {
            return Ok(run);
        }
    }
    Err(CvdError::resource_busy(format!(
        "no run of {count} consecutive instance ids available"
    )))
}
