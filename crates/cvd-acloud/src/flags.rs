use std::path::PathBuf;

use cvd_core::error::CvdError;

/// Default branch used whenever a build family's branch flag is unset
/// (spec §4.E, verbatim from the original's hardcoded default).
pub const DEFAULT_BRANCH: &str = "aosp-master";
pub const DEFAULT_KERNEL_BRANCH: &str = "aosp_kernel-common-android-mainline";
pub const DEFAULT_KERNEL_BUILD_TARGET: &str = "kernel_virt_x86_64";
pub const DEFAULT_BOOTLOADER_BRANCH: &str = "aosp_u-boot-mainline";

/// One `branch[/build_target]` + optional `build_id` triple, as accepted by
/// each of `acloud create`'s build-flag families (main, `--system-*`,
/// `--bootloader-*`, `--boot-*`, `--ota-*`, `--kernel-*`).
#[derive(Debug, Clone, Default)]
pub struct BuildSpec {
    pub branch: Option<String>,
    pub build_id: Option<String>,
    pub build_target: Option<String>,
}

/// Parsed `acloud create` arguments (spec §4.E). Every field mirrors one
/// flag from `converter.cpp`; unrecognized flags are rejected rather than
/// silently ignored, matching the original's strict flag parser.
#[derive(Debug, Clone, Default)]
pub struct AcloudCreateArgs {
    pub build: BuildSpec,
    pub system_build: BuildSpec,
    pub bootloader_build: BuildSpec,
    pub boot_build: BuildSpec,
    pub ota_build: BuildSpec,
    pub kernel_build: BuildSpec,

    /// `--local-image`: selects the local-creation path (no fetch) rather
    /// than a path value — the original's `FlagConsumesArbitrary` setter
    /// only ever toggles a bool.
    pub local_image: bool,
    /// `--local-kernel-image`/`--local-boot-image` (aliased to the same
    /// field in the original): a directory to probe for kernel/boot images,
    /// or a direct path to a `boot.img`.
    pub local_kernel_image: Option<PathBuf>,
    /// `--local-instance [N]`: present with an optional numeric value.
    pub local_instance: Option<u32>,
    /// `--image-download-dir`: overrides the fetch destination root
    /// (default is the resolved temp directory).
    pub image_download_dir: Option<PathBuf>,
    /// `--config-file`: overrides the default acloud per-user config path.
    pub config_file: Option<PathBuf>,

    /// `--config`/`--flavor`: aliased to one field in the original, emitted
    /// as a single `-config <value>` pair.
    pub flavor: Option<String>,
    pub num_instances: Option<usize>,
    pub launch_args: Option<String>,

    /// `--pet-name G-i`: split into group + instance names and forwarded to
    /// the start command as selector options.
    pub pet_name: Option<String>,
    pub verbose: bool,
}

pub fn parse_acloud_args(argv: &[String]) -> Result<AcloudCreateArgs, CvdError> {
    let mut out = AcloudCreateArgs::default();
    let mut iter = argv.iter().peekable();

    while let Some(arg) = iter.next() {
        let (key, inline) = match arg.split_once('=') {
            Some((k, v)) => (k, Some(v.to_string())),
            None => (arg.as_str(), None),
        };
        let mut value = |name: &str| -> Result<String, CvdError> {
            if let Some(v) = &inline {
                return Ok(v.clone());
            }
            iter.next()
                .cloned()
                .ok_or_else(|| CvdError::invalid_argument(format!("{name} requires a value")))
        };

        match key {
            "--branch" => out.build.branch = Some(value(key)?),
            "--build-id" | "--build_id" => out.build.build_id = Some(value(key)?),
            "--build-target" | "--build_target" => out.build.build_target = Some(value(key)?),

            "--system-branch" => out.system_build.branch = Some(value(key)?),
            "--system-build-id" => out.system_build.build_id = Some(value(key)?),
            "--system-build-target" => out.system_build.build_target = Some(value(key)?),

            "--bootloader-branch" => out.bootloader_build.branch = Some(value(key)?),
            "--bootloader-build-id" => out.bootloader_build.build_id = Some(value(key)?),
            "--bootloader-build-target" => out.bootloader_build.build_target = Some(value(key)?),

            "--boot-branch" => out.boot_build.branch = Some(value(key)?),
            "--boot-build-id" => out.boot_build.build_id = Some(value(key)?),
            "--boot-build-target" => out.boot_build.build_target = Some(value(key)?),

            "--ota-branch" => out.ota_build.branch = Some(value(key)?),
            "--ota-build-id" => out.ota_build.build_id = Some(value(key)?),
            "--ota-build-target" => out.ota_build.build_target = Some(value(key)?),

            "--kernel-branch" => out.kernel_build.branch = Some(value(key)?),
            "--kernel-build-id" => out.kernel_build.build_id = Some(value(key)?),
            "--kernel-build-target" => out.kernel_build.build_target = Some(value(key)?),

            "--local-image" => out.local_image = true,
            "--local-kernel-image" | "--local-boot-image" => {
                out.local_kernel_image = Some(PathBuf::from(value(key)?))
            }
            "--local-instance" => {
                // Consumes an optional following numeric token; a following
                // flag (or end of args) leaves the instance number unset and
                // the allocator picks one.
                if let Some(v) = &inline {
                    out.local_instance = Some(
                        v.parse()
                            .map_err(|_| CvdError::invalid_argument("--local-instance must be a number"))?,
                    );
                } else if let Some(next) = iter.peek() {
                    if let Ok(n) = next.parse() {
                        out.local_instance = Some(n);
                        iter.next();
                    }
                }
            }
            "--image-download-dir" => out.image_download_dir = Some(PathBuf::from(value(key)?)),
            "--config-file" | "--config_file" => out.config_file = Some(PathBuf::from(value(key)?)),
            "--pet-name" => out.pet_name = Some(value(key)?),

            "--config" | "--flavor" => out.flavor = Some(value(key)?),
            "--num-instances" | "--num_avd" => {
                out.num_instances = Some(
                    value(key)?
                        .parse()
                        .map_err(|_| CvdError::invalid_argument("--num-instances must be a number"))?,
                )
            }
            "--launch-args" => out.launch_args = Some(value(key)?),
            "--verbose" | "-v" => out.verbose = true,

            other => {
                return Err(CvdError::invalid_argument(format!("unrecognized acloud flag {other:?}")));
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_basic() {
        let parsed = parse_acloud_args(&args(&["--branch", "my-branch", "--num-instances", "2"])).unwrap();
        assert_eq!(parsed.build.branch.as_deref(), Some("my-branch"));
        assert_eq!(parsed.num_instances, Some(2));
    }

    #[test]
    fn test_parse_local_image_is_a_bool_flag() {
        let parsed = parse_acloud_args(&args(&["--local-image"])).unwrap();
        assert!(parsed.local_image);
    }

    #[test]
    fn test_parse_local_instance_and_local_image_together() {
        // spec §8 scenario 5's literal input: --local-instance must not
        // swallow the following --local-image as its numeric value.
        let parsed = parse_acloud_args(&args(&["--local-instance", "--local-image"])).unwrap();
        assert!(parsed.local_image);
        assert_eq!(parsed.local_instance, None);
    }

    #[test]
    fn test_parse_local_instance_with_explicit_number() {
        let parsed = parse_acloud_args(&args(&["--local-instance", "3"])).unwrap();
        assert_eq!(parsed.local_instance, Some(3));
    }

    #[test]
    fn test_parse_local_boot_image_aliases_local_kernel_image() {
        let parsed = parse_acloud_args(&args(&["--local-boot-image", "/tmp/boot.img"])).unwrap();
        assert_eq!(parsed.local_kernel_image, Some(PathBuf::from("/tmp/boot.img")));
    }

    #[test]
    fn test_parse_config_and_flavor_share_one_field() {
        let parsed = parse_acloud_args(&args(&["--flavor", "phone"])).unwrap();
        assert_eq!(parsed.flavor.as_deref(), Some("phone"));
        let parsed = parse_acloud_args(&args(&["--config", "phone"])).unwrap();
        assert_eq!(parsed.flavor.as_deref(), Some("phone"));
    }

    #[test]
    fn test_parse_pet_name_image_download_dir_config_file() {
        let parsed = parse_acloud_args(&args(&[
            "--pet-name",
            "mygroup-dev1",
            "--image-download-dir",
            "/tmp/dl",
            "--config-file",
            "/tmp/acloud.config",
        ]))
        .unwrap();
        assert_eq!(parsed.pet_name.as_deref(), Some("mygroup-dev1"));
        assert_eq!(parsed.image_download_dir, Some(PathBuf::from("/tmp/dl")));
        assert_eq!(parsed.config_file, Some(PathBuf::from("/tmp/acloud.config")));
    }

    #[test]
    fn test_parse_unrecognized_flag_errors() {
        assert!(parse_acloud_args(&args(&["--not-a-real-flag"])).is_err());
    }
}
