use std::collections::HashMap;
use std::path::Path;

use cvd_core::config::{ACLOUD_IMAGE_ARTIFACTS_DIR, ANDROID_HOST_OUT, ANDROID_PRODUCT_OUT, CUTTLEFISH_INSTANCE};
use cvd_core::error::CvdError;
use cvd_core::naming::split_device_name;
use tracing::{info, warn};

use crate::command::{CommandRequest, Stdio};
use crate::flags::{
    AcloudCreateArgs, DEFAULT_BOOTLOADER_BRANCH, DEFAULT_BRANCH, DEFAULT_KERNEL_BRANCH, DEFAULT_KERNEL_BUILD_TARGET,
};
use crate::image_probe::{probe_local_kernel_image, LocalImageSelection};

/// Name of the memoization file written under a fetch's host directory,
/// verbatim from the original (spec §9).
pub const FETCH_CVD_ARGS_FILE: &str = "fetch-cvd-args.txt";

/// Translate a parsed `acloud create` invocation into the ordered command
/// requests `cvd` would issue on its behalf (spec §4.E). `envs` is the
/// caller's process environment; `ANDROID_HOST_OUT` must be present
/// regardless of `--local-image`, `ANDROID_PRODUCT_OUT` only when it is set.
///
/// Known, deliberately preserved defect (spec §9): the memoization check
/// against `fetch-cvd-args.txt` compares against the file's content *before*
/// the fetch actually runs, and the file is rewritten with the new args
/// regardless of whether the emitted fetch command below ever succeeds. A
/// failed fetch therefore leaves the memo file claiming the fetch is already
/// up to date, and a subsequent `acloud create` with identical flags will
/// skip fetching entirely. This is not fixed here.
pub fn translate(args: &AcloudCreateArgs, envs: &HashMap<String, String>) -> Result<Vec<CommandRequest>, CvdError> {
    let host_artifacts_path = envs
        .get(ANDROID_HOST_OUT)
        .ok_or_else(|| CvdError::missing_env(ANDROID_HOST_OUT))?;

    let selector_args = build_selector_args(args)?;

    if args.local_image {
        check_local_image_compatible(args)?;
        let product_out = envs
            .get(ANDROID_PRODUCT_OUT)
            .ok_or_else(|| CvdError::missing_env(ANDROID_PRODUCT_OUT))?;

        let mut env = HashMap::new();
        env.insert(ANDROID_HOST_OUT.to_string(), host_artifacts_path.clone());
        env.insert(ANDROID_PRODUCT_OUT.to_string(), product_out.clone());
        if let Some(instance) = args.local_instance {
            env.insert(CUTTLEFISH_INSTANCE.to_string(), instance.to_string());
        }

        let start = build_start_request(args, &selector_args, env)?;
        return Ok(vec![start]);
    }

    let mut requests = Vec::new();
    let artifact_root = args
        .image_download_dir
        .clone()
        .unwrap_or_else(cvd_lock::temp_dir)
        .join(ACLOUD_IMAGE_ARTIFACTS_DIR);

    if !artifact_root.is_dir() {
        let mut mkdir_env = HashMap::new();
        mkdir_env.insert(ANDROID_HOST_OUT.to_string(), host_artifacts_path.clone());
        requests.push(
            CommandRequest::new("mkdir", vec!["-p".to_string(), path_string(&artifact_root)]).with_env(mkdir_env),
        );
    }

    let host_dir = artifact_root.join(build_suffix(args));
    std::fs::create_dir_all(&host_dir)?;

    let fetch_args = build_fetch_args(args, &host_dir);
    let fetch_args_str = fetch_args.join(" ");
    let memo_path = host_dir.join(FETCH_CVD_ARGS_FILE);
    let previous = std::fs::read_to_string(&memo_path).ok();
    let up_to_date = previous.as_deref() == Some(fetch_args_str.as_str());

    // Defect preserved verbatim: this write happens unconditionally, before
    // the fetch command (pushed below) has had any chance to run.
    if let Err(e) = std::fs::write(&memo_path, &fetch_args_str) {
        warn!(error = %e, "failed to write fetch-cvd-args.txt memo");
    }

    if up_to_date {
        info!(host_dir = %host_dir.display(), "fetch args unchanged, skipping fetch");
    } else {
        let mut fetch_env = HashMap::new();
        fetch_env.insert(ANDROID_HOST_OUT.to_string(), host_artifacts_path.clone());
        requests.push(
            CommandRequest::new("fetch_cvd", fetch_args)
                .with_env(fetch_env)
                .with_stdio(if args.verbose { Stdio::Inherit } else { Stdio::Null }),
        );
    }

    let mut start_env = HashMap::new();
    start_env.insert(ANDROID_HOST_OUT.to_string(), path_string(&host_dir));
    start_env.insert(ANDROID_PRODUCT_OUT.to_string(), path_string(&host_dir));
    if let Some(instance) = args.local_instance {
        start_env.insert(CUTTLEFISH_INSTANCE.to_string(), instance.to_string());
    }
    requests.push(build_start_request(args, &selector_args, start_env)?);

    Ok(requests)
}

fn path_string(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

/// `--local-image` rejects any of the `--system-*`/`--bootloader-*`/
/// `--boot-*`/`--ota-*` families (spec §4.E, §7 `IncompatibleFlags`).
fn check_local_image_compatible(args: &AcloudCreateArgs) -> Result<(), CvdError> {
    let set = |b: &crate::flags::BuildSpec| b.branch.is_some() || b.build_id.is_some() || b.build_target.is_some();
    if set(&args.system_build) {
        return Err(CvdError::invalid_argument("--local-image incompatible with --system-* flags"));
    }
    if set(&args.bootloader_build) {
        return Err(CvdError::invalid_argument("--local-image incompatible with --bootloader-* flags"));
    }
    if set(&args.boot_build) {
        return Err(CvdError::invalid_argument("--local-image incompatible with --boot-* flags"));
    }
    if set(&args.ota_build) {
        return Err(CvdError::invalid_argument("--local-image incompatible with --ota-* flags"));
    }
    Ok(())
}

/// The build-specific suffix appended to the artifact root *after* the
/// mkdir-existence check runs against the bare root (spec §4.E, §8 scenario
/// 6): `<build-id-or-branch><target>` concatenated with no separator, or
/// `aosp-master` if none of the main build flags were given.
fn build_suffix(args: &AcloudCreateArgs) -> String {
    let b = &args.build;
    if b.branch.is_some() || b.build_id.is_some() || b.build_target.is_some() {
        let build = b.build_id.as_deref().or(b.branch.as_deref()).unwrap_or(DEFAULT_BRANCH);
        let target = b.build_target.as_deref().unwrap_or("");
        format!("{build}{target}")
    } else {
        DEFAULT_BRANCH.to_string()
    }
}

/// Pet-name-derived `--group_name`/`--instance_name`, plus the translator's
/// mandatory `--disable_default_group=true` (spec §4.E).
fn build_selector_args(args: &AcloudCreateArgs) -> Result<Vec<String>, CvdError> {
    let mut selector = vec!["--disable_default_group=true".to_string()];
    if let Some(pet_name) = &args.pet_name {
        let (group, instance) = split_device_name(pet_name)?;
        selector.push(format!("--group_name={group}"));
        selector.push(format!("--instance_name={instance}"));
    }
    Ok(selector)
}

/// One `--<family>_build <build>[/target]` fetch token, mirroring the
/// per-family default fallback chain in `converter.cpp` (build id beats
/// branch beats the family default; target falls back to `target_fallback`,
/// empty if none).
fn render_fetch_token(
    branch: Option<&str>,
    build_id: Option<&str>,
    build_target: Option<&str>,
    default_build: &str,
    target_fallback: Option<&str>,
) -> String {
    let build = build_id.or(branch).unwrap_or(default_build);
    match build_target.or(target_fallback) {
        Some(target) if !target.is_empty() => format!("{build}/{target}"),
        _ => build.to_string(),
    }
}

fn build_fetch_args(args: &AcloudCreateArgs, host_dir: &Path) -> Vec<String> {
    let mut out = vec!["--directory".to_string(), path_string(host_dir)];

    let b = &args.build;
    if b.branch.is_some() || b.build_id.is_some() || b.build_target.is_some() {
        out.push("--default_build".to_string());
        out.push(render_fetch_token(
            b.branch.as_deref(),
            b.build_id.as_deref(),
            b.build_target.as_deref(),
            DEFAULT_BRANCH,
            None,
        ));
    }

    let s = &args.system_build;
    if s.branch.is_some() || s.build_id.is_some() || s.build_target.is_some() {
        out.push("--system_build".to_string());
        out.push(render_fetch_token(
            s.branch.as_deref(),
            s.build_id.as_deref(),
            s.build_target.as_deref(),
            DEFAULT_BRANCH,
            b.build_target.as_deref(),
        ));
    }

    let bl = &args.bootloader_build;
    if bl.branch.is_some() || bl.build_id.is_some() || bl.build_target.is_some() {
        out.push("--bootloader_build".to_string());
        out.push(render_fetch_token(
            bl.branch.as_deref(),
            bl.build_id.as_deref(),
            bl.build_target.as_deref(),
            DEFAULT_BOOTLOADER_BRANCH,
            None,
        ));
    }

    let bt = &args.boot_build;
    if bt.branch.is_some() || bt.build_id.is_some() || bt.build_target.is_some() {
        out.push("--boot_build".to_string());
        out.push(render_fetch_token(
            bt.branch.as_deref(),
            bt.build_id.as_deref(),
            bt.build_target.as_deref(),
            DEFAULT_BRANCH,
            None,
        ));
    }

    let ota = &args.ota_build;
    if ota.branch.is_some() || ota.build_id.is_some() || ota.build_target.is_some() {
        out.push("--otatools_build".to_string());
        out.push(render_fetch_token(
            ota.branch.as_deref(),
            ota.build_id.as_deref(),
            ota.build_target.as_deref(),
            "",
            None,
        ));
    }

    let k = &args.kernel_build;
    if k.branch.is_some() || k.build_id.is_some() || k.build_target.is_some() {
        out.push("--kernel_build".to_string());
        // Deliberately reproduces the original's quirk verbatim (spec §9:
        // "reproduce verbatim; do not guess"): the kernel id falls back to
        // the *main* build's branch, never `--kernel-branch`, and the
        // target always falls back to the kernel default, never empty.
        out.push(render_fetch_token(
            b.branch.as_deref(),
            k.build_id.as_deref(),
            k.build_target.as_deref(),
            DEFAULT_KERNEL_BRANCH,
            Some(DEFAULT_KERNEL_BUILD_TARGET),
        ));
    }

    out
}

fn build_start_request(
    args: &AcloudCreateArgs,
    selector_args: &[String],
    env: HashMap<String, String>,
) -> Result<CommandRequest, CvdError> {
    let mut cmd_args = vec![
        "--daemon".to_string(),
        "--undefok".to_string(),
        "report_anonymous_usage_stats".to_string(),
        "--report_anonymous_usage_stats".to_string(),
        "y".to_string(),
    ];

    if let Some(flavor) = &args.flavor {
        cmd_args.push("-config".to_string());
        cmd_args.push(flavor.clone());
    }

    if let Some(path) = &args.local_kernel_image {
        match probe_local_kernel_image(path)? {
            LocalImageSelection::KernelAndInitramfs { kernel, initramfs } => {
                cmd_args.push("-kernel_path".to_string());
                cmd_args.push(path_string(&kernel));
                cmd_args.push("-initramfs_path".to_string());
                cmd_args.push(path_string(&initramfs));
            }
            LocalImageSelection::Boot { boot, vendor_boot } => {
                cmd_args.push("-boot_image".to_string());
                cmd_args.push(path_string(&boot));
                if let Some(vendor_boot) = vendor_boot {
                    cmd_args.push("-vendor_boot_image".to_string());
                    cmd_args.push(path_string(&vendor_boot));
                }
            }
        }
    }

    if let Some(launch_args) = &args.launch_args {
        cmd_args.extend(tokenize_launch_args(launch_args)?);
    }
    if let Some(config_file) = &args.config_file {
        let contents = std::fs::read_to_string(config_file)?;
        cmd_args.extend(tokenize_launch_args(&contents)?);
    }

    cmd_args.extend_from_slice(selector_args);

    Ok(CommandRequest::new("cvd_internal_start", cmd_args).with_env(env))
}

fn tokenize_launch_args(raw: &str) -> Result<Vec<String>, CvdError> {
    shell_words::split(raw).map_err(|e| CvdError::invalid_argument(format!("not valid shell syntax: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::parse_acloud_args;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn env_with_host_out(dir: &Path) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(ANDROID_HOST_OUT.to_string(), path_string(dir));
        env
    }

    #[test]
    fn test_translate_requires_android_host_out() {
        let parsed = parse_acloud_args(&[]).unwrap();
        let err = translate(&parsed, &HashMap::new()).unwrap_err();
        assert_eq!(err.kind(), "MissingEnv");
    }

    #[test]
    fn test_translate_remote_fetch_then_start() {
        let host_out = tempfile::tempdir().unwrap();
        let envs = env_with_host_out(host_out.path());
        let parsed = parse_acloud_args(&args(&["--branch", "my-branch"])).unwrap();
        let requests = translate(&parsed, &envs).unwrap();
        let programs: Vec<_> = requests.iter().map(|r| r.program.as_str()).collect();
        assert!(programs.contains(&"fetch_cvd"));
        assert_eq!(programs.last(), Some(&"cvd_internal_start"));
    }

    #[test]
    fn test_translate_fetch_args_are_double_dash() {
        let host_out = tempfile::tempdir().unwrap();
        let envs = env_with_host_out(host_out.path());
        let parsed = parse_acloud_args(&args(&["--branch", "aosp-main", "--build-target", "tgt"])).unwrap();
        let requests = translate(&parsed, &envs).unwrap();
        let fetch = requests.iter().find(|r| r.program == "fetch_cvd").unwrap();
        assert!(fetch.args.contains(&"--directory".to_string()));
        assert!(fetch.args.contains(&"--default_build".to_string()));
        assert!(fetch.args.contains(&"aosp-main/tgt".to_string()));
    }

    /// spec §8 scenario 6.
    #[test]
    fn test_translate_scenario_6_host_dir_and_default_build() {
        let tmp = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("TMPDIR", tmp.path()); }
        let envs = env_with_host_out(tmp.path());
        let parsed = parse_acloud_args(&args(&[
            "--local-instance",
            "--branch",
            "aosp-main",
            "--build-target",
            "tgt",
        ]))
        .unwrap();
        let requests = translate(&parsed, &envs).unwrap();
        let programs: Vec<_> = requests.iter().map(|r| r.program.as_str()).collect();
        assert_eq!(programs, vec!["mkdir", "fetch_cvd", "cvd_internal_start"]);

        let expected_dir = tmp.path().join(ACLOUD_IMAGE_ARTIFACTS_DIR).join("aosp-maintgt");
        let fetch = requests.iter().find(|r| r.program == "fetch_cvd").unwrap();
        let dir_idx = fetch.args.iter().position(|a| a == "--directory").unwrap();
        assert_eq!(fetch.args[dir_idx + 1], path_string(&expected_dir));
    }

    /// spec §8 scenario 5.
    #[test]
    fn test_translate_scenario_5_local_instance_and_local_image() {
        let mut envs = HashMap::new();
        envs.insert(ANDROID_HOST_OUT.to_string(), "/h".to_string());
        envs.insert(ANDROID_PRODUCT_OUT.to_string(), "/p".to_string());
        let parsed = parse_acloud_args(&args(&["--local-instance", "--local-image"])).unwrap();
        let requests = translate(&parsed, &envs).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].program, "cvd_internal_start");
        assert_eq!(requests[0].env.get(ANDROID_HOST_OUT), Some(&"/h".to_string()));
        assert_eq!(requests[0].env.get(ANDROID_PRODUCT_OUT), Some(&"/p".to_string()));
    }

    #[test]
    fn test_translate_local_image_requires_product_out() {
        let mut envs = HashMap::new();
        envs.insert(ANDROID_HOST_OUT.to_string(), "/h".to_string());
        let parsed = parse_acloud_args(&args(&["--local-image"])).unwrap();
        let err = translate(&parsed, &envs).unwrap_err();
        assert_eq!(err.kind(), "MissingEnv");
    }

    #[test]
    fn test_translate_local_image_rejects_system_build() {
        let mut envs = HashMap::new();
        envs.insert(ANDROID_HOST_OUT.to_string(), "/h".to_string());
        envs.insert(ANDROID_PRODUCT_OUT.to_string(), "/p".to_string());
        let parsed = parse_acloud_args(&args(&["--local-image", "--system-branch", "foo"])).unwrap();
        let err = translate(&parsed, &envs).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn test_translate_second_run_with_same_args_skips_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("TMPDIR", tmp.path()); }
        let envs = env_with_host_out(tmp.path());
        let parsed = parse_acloud_args(&args(&["--branch", "my-branch"])).unwrap();
        let first = translate(&parsed, &envs).unwrap();
        assert!(first.iter().any(|r| r.program == "fetch_cvd"));

        let second = translate(&parsed, &envs).unwrap();
        assert!(!second.iter().any(|r| r.program == "fetch_cvd"));
    }

    #[test]
    fn test_translate_launch_args_tokenized() {
        let host_out = tempfile::tempdir().unwrap();
        let envs = env_with_host_out(host_out.path());
        let parsed = parse_acloud_args(&args(&["--launch-args", "--foo bar --baz 'quoted value'"])).unwrap();
        let requests = translate(&parsed, &envs).unwrap();
        let start = requests.iter().find(|r| r.program == "cvd_internal_start").unwrap();
        assert!(start.args.contains(&"quoted value".to_string()));
    }

    #[test]
    fn test_translate_config_emitted_single_dash_two_tokens() {
        let host_out = tempfile::tempdir().unwrap();
        let envs = env_with_host_out(host_out.path());
        let parsed = parse_acloud_args(&args(&["--flavor", "phone"])).unwrap();
        let requests = translate(&parsed, &envs).unwrap();
        let start = requests.iter().find(|r| r.program == "cvd_internal_start").unwrap();
        let idx = start.args.iter().position(|a| a == "-config").unwrap();
        assert_eq!(start.args[idx + 1], "phone");
    }

    #[test]
    fn test_translate_kernel_and_initramfs_both_present() {
        let host_out = tempfile::tempdir().unwrap();
        let envs = env_with_host_out(host_out.path());
        let kernel_dir = tempfile::tempdir().unwrap();
        std::fs::write(kernel_dir.path().join("bzImage"), b"").unwrap();
        std::fs::write(kernel_dir.path().join("initramfs.img"), b"").unwrap();
        std::fs::write(kernel_dir.path().join("boot.img"), b"").unwrap();
        let parsed =
            parse_acloud_args(&args(&["--local-kernel-image", &kernel_dir.path().to_string_lossy()])).unwrap();
        let requests = translate(&parsed, &envs).unwrap();
        let start = requests.iter().find(|r| r.program == "cvd_internal_start").unwrap();
        assert!(start.args.contains(&"-kernel_path".to_string()));
        assert!(start.args.contains(&"-initramfs_path".to_string()));
        assert!(!start.args.contains(&"-boot_image".to_string()));
    }

    #[test]
    fn test_translate_regular_file_kernel_image_is_boot_only() {
        let host_out = tempfile::tempdir().unwrap();
        let envs = env_with_host_out(host_out.path());
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("my-boot.img");
        std::fs::write(&file, b"").unwrap();
        let parsed = parse_acloud_args(&args(&["--local-kernel-image", &file.to_string_lossy()])).unwrap();
        let requests = translate(&parsed, &envs).unwrap();
        let start = requests.iter().find(|r| r.program == "cvd_internal_start").unwrap();
        assert!(!start.args.contains(&"-kernel_path".to_string()));
        assert!(!start.args.contains(&"-initramfs_path".to_string()));
        assert!(start.args.contains(&"-boot_image".to_string()));
    }

    #[test]
    fn test_translate_pet_name_emits_selector_args() {
        let host_out = tempfile::tempdir().unwrap();
        let envs = env_with_host_out(host_out.path());
        let parsed = parse_acloud_args(&args(&["--pet-name", "mygroup-dev1"])).unwrap();
        let requests = translate(&parsed, &envs).unwrap();
        let start = requests.iter().find(|r| r.program == "cvd_internal_start").unwrap();
        assert!(start.args.contains(&"--group_name=mygroup".to_string()));
        assert!(start.args.contains(&"--instance_name=dev1".to_string()));
    }
}
