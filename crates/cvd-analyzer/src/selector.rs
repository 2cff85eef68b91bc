use std::collections::HashMap;

use cvd_core::config::{CUTTLEFISH_INSTANCE, USER, VSOC_USER_PREFIX};
use cvd_core::error::CvdError;
use cvd_core::instance::InstanceId;
use cvd_core::naming::{split_device_name, split_non_empty};

/// The selector flags a caller may pass alongside a creation request
/// (spec §4.D). Parsed once, then resolved against the environment and the
/// database by [`crate::analyzer::analyze`].
#[derive(Debug, Clone, Default)]
pub struct SelectorFlags {
    /// `--name`: accepts either a plain name, a comma list of plain instance
    /// names, or one/more `<group>-<instance>` device names (spec §4.D.1).
    pub name: Option<String>,
    /// `--device_name`: always device-name syntax, one or more
    /// `<group>-<instance>` tokens sharing a single group.
    pub device_name: Option<String>,
    pub group_name: Option<String>,
    pub instance_names: Option<Vec<String>>,
    pub num_instances: Option<usize>,
    pub instance_nums: Option<Vec<InstanceId>>,
    pub base_instance_num: Option<InstanceId>,
}

/// Scan a flat argv-style slice for `--flag value` and `--flag=value` forms.
/// Unrecognized flags are left in place for the caller to treat as a
/// trailing query (spec §4.D: remaining args become substring selectors).
pub fn parse_selector_flags(args: &[String]) -> Result<(SelectorFlags, Vec<String>), CvdError> {
    let mut flags = SelectorFlags::default();
    let mut rest = Vec::new();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        let (key, inline_value) = match arg.split_once('=') {
            Some((k, v)) => (k, Some(v.to_string())),
            None => (arg.as_str(), None),
        };

        let mut take_value = |name: &str| -> Result<String, CvdError> {
            if let Some(v) = &inline_value {
                return Ok(v.clone());
            }
            iter.next()
                .cloned()
                .ok_or_else(|| CvdError::invalid_argument(format!("{name} requires a value")))
        };

        match key {
            "--name" => flags.name = Some(take_value(key)?),
            "--device_name" => flags.device_name = Some(take_value(key)?),
            "--group_name" => flags.group_name = Some(take_value(key)?),
            "--instance_name" => {
                flags.instance_names = Some(split_non_empty(&take_value(key)?, ','));
            }
            "--num_instances" => {
                let v = take_value(key)?;
                flags.num_instances = Some(
                    v.parse()
                        .map_err(|_| CvdError::invalid_argument(format!("--num_instances {v:?} is not a number")))?,
                );
            }
            "--instance_nums" => {
                let v = take_value(key)?;
                let mut nums = Vec::new();
                for tok in split_non_empty(&v, ',') {
                    nums.push(
                        tok.parse()
                            .map_err(|_| CvdError::invalid_argument(format!("--instance_nums {tok:?} is not a number")))?,
                    );
                }
                flags.instance_nums = Some(nums);
            }
            "--base_instance_num" => {
                let v = take_value(key)?;
                flags.base_instance_num = Some(
                    v.parse()
                        .map_err(|_| CvdError::invalid_argument(format!("--base_instance_num {v:?} is not a number")))?,
                );
            }
            _ => rest.push(arg.clone()),
        }
    }

    verify_name_options(&flags)?;
    Ok((flags, rest))
}

/// `VerifyNameOptions`: `--name`/`--device_name` are mutually exclusive with
/// each other and with `--group_name`/`--instance_name` (spec §4.D.1: "mixing
/// `--name` with any of the other three → error").
fn verify_name_options(flags: &SelectorFlags) -> Result<(), CvdError> {
    if flags.name.is_some() && flags.device_name.is_some() {
        return Err(CvdError::invalid_argument(
            "--name and --device_name cannot both be given",
        ));
    }
    if (flags.name.is_some() || flags.device_name.is_some())
        && (flags.group_name.is_some() || flags.instance_names.is_some())
    {
        return Err(CvdError::invalid_argument(
            "--name/--device_name cannot be combined with --group_name or --instance_name",
        ));
    }
    Ok(())
}

/// What `--name`/`--device_name` resolved to, per the grammar table in
/// spec §4.D.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSelection {
    /// A single bare token with no group/instance separator: the group name
    /// alone, per-instance names auto-derived (`--name A`).
    GroupOnly(String),
    /// Two or more bare, comma-separated tokens, none of them valid device
    /// names: an explicit per-instance name list, group auto-generated
    /// (`--name A,B`).
    InstanceList(Vec<String>),
    /// One or more `<group>-<instance>` tokens sharing the same group half
    /// (`--device_name A-x,A-y`, or `--name Ga-x`).
    Device { group: String, instances: Vec<String> },
}

impl NameSelection {
    pub fn instance_count(&self) -> Option<usize> {
        match self {
            Self::GroupOnly(_) => None,
            Self::InstanceList(names) => Some(names.len()),
            Self::Device { instances, .. } => Some(instances.len()),
        }
    }
}

/// Resolve `--name`/`--device_name` into a [`NameSelection`], implementing
/// the dispatch table from spec §4.D.1. `--device_name` always requires
/// device-name syntax; `--name` additionally accepts a bare group name or a
/// bare instance-name list.
pub fn resolve_name_selection(flags: &SelectorFlags) -> Result<Option<NameSelection>, CvdError> {
    let (value, is_name_alias) = match (&flags.name, &flags.device_name) {
        (Some(v), None) => (v, true),
        (None, Some(v)) => (v, false),
        (None, None) => return Ok(None),
        (Some(_), Some(_)) => unreachable!("verify_name_options rejects this combination"),
    };

    let tokens = split_non_empty(value, ',');
    if tokens.is_empty() {
        return Err(CvdError::invalid_argument("--name/--device_name must not be empty"));
    }

    let looks_like_device_names = tokens.iter().any(|t| t.contains('-'));

    if looks_like_device_names || !is_name_alias {
        let mut group: Option<String> = None;
        let mut instances = Vec::with_capacity(tokens.len());
        for tok in &tokens {
            let (g, i) = split_device_name(tok)?;
            match &group {
                None => group = Some(g.to_string()),
                Some(existing) if existing != g => {
                    return Err(CvdError::invalid_argument(format!(
                        "device names in {value:?} do not share a common group"
                    )));
                }
                _ => {}
            }
            instances.push(i.to_string());
        }
        return Ok(Some(NameSelection::Device {
            group: group.unwrap(),
            instances,
        }));
    }

    if tokens.len() == 1 {
        Ok(Some(NameSelection::GroupOnly(tokens.into_iter().next().unwrap())))
    } else {
        Ok(Some(NameSelection::InstanceList(tokens)))
    }
}

/// How the set of instance ids for the new group should be determined
/// (spec §4.D / §4.B).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSource {
    /// `--instance_nums`: use exactly these ids.
    Explicit(Vec<InstanceId>),
    /// `--base_instance_num` (optionally with an env-derived base): a
    /// consecutive run of `count` ids starting at `base`.
    BaseAndCount { base: InstanceId, count: usize },
    /// No id hint at all: allocate `count` ids however the allocator prefers.
    Auto(usize),
}

/// `VerifyNumOfInstances` + `HandleInstanceIds`: reconcile `--num_instances`
/// against whatever instance-count is implied by other flags, then decide
/// where the actual ids come from.
pub fn resolve_id_source(
    flags: &SelectorFlags,
    name_selection: &Option<NameSelection>,
    envs: &HashMap<String, String>,
) -> Result<IdSource, CvdError> {
    let implied_counts: Vec<usize> = [
        flags.num_instances,
        flags.instance_names.as_ref().map(|v| v.len()),
        flags.instance_nums.as_ref().map(|v| v.len()),
        name_selection.as_ref().and_then(NameSelection::instance_count),
    ]
    .into_iter()
    .flatten()
    .collect();

    let count = match implied_counts.split_first() {
        None => 1,
        Some((first, rest)) => {
            if rest.iter().any(|c| c != first) {
                return Err(CvdError::invalid_argument(format!(
                    "conflicting instance counts implied by flags: {implied_counts:?}"
                )));
            }
            *first
        }
    };

    if let Some(nums) = &flags.instance_nums {
        if nums.len() != count {
            return Err(CvdError::invalid_argument(format!(
                "--instance_nums lists {} ids but {count} instances were requested",
                nums.len()
            )));
        }
        return Ok(IdSource::Explicit(nums.clone()));
    }

    if let Some(base) = flags.base_instance_num {
        return Ok(IdSource::BaseAndCount { base, count });
    }

    if let Some(base) = base_instance_num_from_env(envs)? {
        return Ok(IdSource::BaseAndCount { base, count });
    }

    Ok(IdSource::Auto(count))
}

/// `TryFromCuttlefishInstance` / `TryFromUser`: resolve a base instance
/// number purely from the environment, in that priority order.
fn base_instance_num_from_env(envs: &HashMap<String, String>) -> Result<Option<InstanceId>, CvdError> {
    if let Some(v) = envs.get(CUTTLEFISH_INSTANCE) {
        let id = v
            .parse()
            .map_err(|_| CvdError::invalid_argument(format!("${CUTTLEFISH_INSTANCE}={v:?} is not a number")))?;
        return Ok(Some(id));
    }
    if let Some(user) = envs.get(USER) {
        if let Some(suffix) = user.strip_prefix(VSOC_USER_PREFIX) {
            if let Ok(id) = suffix.parse() {
                return Ok(Some(id));
            }
        }
    }
    Ok(None)
}
