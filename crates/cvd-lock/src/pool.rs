use std::collections::BTreeSet;
use std::path::PathBuf;

use cvd_core::config::{TEMP, TMP, TMPDIR};
use cvd_core::error::CvdError;
use cvd_core::instance::InstanceId;

/// Virtual network interface prefixes that together identify a usable
/// instance id (spec §3, §6). A complete "quartet" of tap devices with the
/// same numeric suffix across all four prefixes must exist.
const TAP_PREFIXES: [&str; 4] = ["cvd-etap-", "cvd-mtap-", "cvd-wtap-", "cvd-wifiap-"];

/// Parse `/proc/net/dev` contents and return the set of instance ids for
/// which a complete TAP quartet exists.
///
/// Mirrors `InstanceLockFileManager::FindPotentialInstanceNumsFromNetDevices`
/// in the original cuttlefish sources: each prefix contributes its own set
/// of suffix numbers, and the pool is their intersection.
pub fn parse_proc_net_dev(contents: &str) -> BTreeSet<InstanceId> {
    let mut per_prefix: [BTreeSet<InstanceId>; 4] = Default::default();

    for line in contents.lines() {
        let line = line.trim_start();
        for (idx, prefix) in TAP_PREFIXES.iter().enumerate() {
            if let Some(rest) = line.strip_prefix(prefix) {
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                if let Ok(id) = digits.parse::<InstanceId>() {
                    per_prefix[idx].insert(id);
                }
                break;
            }
        }
    }

    per_prefix
        .into_iter()
        .reduce(|acc, set| acc.intersection(&set).copied().collect())
        .unwrap_or_default()
}

/// Read and parse `/proc/net/dev` to discover the candidate id pool.
/// The pool is immutable for a process lifetime (spec §3).
pub fn discover_pool() -> Result<BTreeSet<InstanceId>, CvdError> {
    let contents = std::fs::read_to_string("/proc/net/dev")
        .map_err(|e| CvdError::Io(format!("reading /proc/net/dev: {e}")))?;
    Ok(parse_proc_net_dev(&contents))
}

/// Replicates Python's `tempfile.gettempdir()`: the first existing directory
/// among `$TMPDIR`, `$TEMP`, `$TMP`, `/tmp`, `/var/tmp`, `/usr/tmp`, else the
/// current working directory (spec §3, §6).
pub fn temp_dir() -> PathBuf {
    let candidates = [
        std::env::var(TMPDIR).ok(),
        std::env::var(TEMP).ok(),
        std::env::var(TMP).ok(),
        Some("/tmp".to_string()),
        Some("/var/tmp".to_string()),
        Some("/usr/tmp".to_string()),
    ];
    for candidate in candidates.into_iter().flatten() {
        let path = PathBuf::from(&candidate);
        if path.is_dir() {
            return path;
        }
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
cvd-wtap-02:       0       0    0    0    0     0          0         0        0       0    0    0    0     0       0          0
cvd-etap-02:       0       0    0    0    0     0          0         0        0       0    0    0    0     0       0          0
cvd-mtap-02:       0       0    0    0    0     0          0         0        0       0    0    0    0     0       0          0
cvd-wifiap-02:     0       0    0    0    0     0          0         0        0       0    0    0    0     0       0          0
cvd-wtap-03:       0       0    0    0    0     0          0         0        0       0    0    0    0     0       0          0
cvd-etap-03:       0       0    0    0    0     0          0         0        0       0    0    0    0     0       0          0
  lo:              0       0    0    0    0     0          0         0        0       0    0    0    0     0       0          0
";

    #[test]
    fn test_parse_complete_quartet() {
        let pool = parse_proc_net_dev(SAMPLE);
        assert_eq!(pool, BTreeSet::from([2]));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_proc_net_dev("").is_empty());
    }

    #[test]
    fn test_parse_ignores_unrelated_lines() {
        let pool = parse_proc_net_dev("  lo: 0 0 0 0\neth0: 0 0 0 0\n");
        assert!(pool.is_empty());
    }

    #[test]
    fn test_temp_dir_falls_back_to_tmp() {
        // /tmp exists on virtually every host this runs on.
        let dir = temp_dir();
        assert!(dir.is_dir());
    }
}
