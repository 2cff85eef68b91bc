//! Environment variable names the core consumes (spec §6).

pub const TMPDIR: &str = "TMPDIR";
pub const TEMP: &str = "TEMP";
pub const TMP: &str = "TMP";
pub const HOME: &str = "HOME";
pub const USER: &str = "USER";
pub const ANDROID_HOST_OUT: &str = "ANDROID_HOST_OUT";
pub const ANDROID_SOONG_HOST_OUT: &str = "ANDROID_SOONG_HOST_OUT";
pub const ANDROID_PRODUCT_OUT: &str = "ANDROID_PRODUCT_OUT";
pub const CUTTLEFISH_INSTANCE: &str = "CUTTLEFISH_INSTANCE";

/// Default literal group name used when the database is empty (spec §4.D.5).
pub const DEFAULT_GROUP_NAME: &str = "cvd";

/// Prefix of `$USER` that implies an explicit base instance id, e.g. `vsoc-3`.
pub const VSOC_USER_PREFIX: &str = "vsoc-";

/// Lockfile directory name under the resolved temp directory (spec §6).
pub const LOCK_DIR_NAME: &str = "acloud_cvd_temp";

/// Directory under the resolved temp directory that acloud fetches into.
pub const ACLOUD_IMAGE_ARTIFACTS_DIR: &str = "acloud_image_artifacts";
