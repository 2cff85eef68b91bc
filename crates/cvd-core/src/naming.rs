use crate::error::CvdError;

/// Validate a group name: non-empty, `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_group_name(name: &str) -> Result<(), CvdError> {
    validate_identifier(name, "Group")
}

/// Validate a per-instance name: non-empty, `[A-Za-z0-9_]+`.
pub fn validate_instance_name(name: &str) -> Result<(), CvdError> {
    if name.is_empty() {
        return Err(CvdError::invalid_argument("instance name must not be empty"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CvdError::invalid_argument(format!(
            "instance name {name:?} must match [A-Za-z0-9_]+"
        )));
    }
    Ok(())
}

fn validate_identifier(name: &str, kind: &str) -> Result<(), CvdError> {
    if name.is_empty() {
        return Err(CvdError::invalid_argument(format!(
            "{kind} name must not be empty"
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(CvdError::invalid_argument(format!(
            "{kind} name {name:?} must start with a letter or underscore"
        )));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CvdError::invalid_argument(format!(
            "{kind} name {name:?} must match [A-Za-z_][A-Za-z0-9_]*"
        )));
    }
    Ok(())
}

/// Split a device name `<group>-<instance>` without validating the halves.
/// The separating `-` may not occur again in either half.
pub fn split_device_name(device_name: &str) -> Result<(&str, &str), CvdError> {
    let mut parts = device_name.splitn(2, '-');
    let group = parts.next().filter(|s| !s.is_empty());
    let instance = parts.next().filter(|s| !s.is_empty());
    match (group, instance) {
        (Some(g), Some(i)) if !i.contains('-') => Ok((g, i)),
        _ => Err(CvdError::invalid_argument(format!(
            "{device_name:?} is not a valid device name (<group>-<instance>)"
        ))),
    }
}

/// A valid device name splits into a valid group name and a valid instance name.
pub fn is_valid_device_name(device_name: &str) -> bool {
    match split_device_name(device_name) {
        Ok((group, instance)) => {
            validate_group_name(group).is_ok() && validate_instance_name(instance).is_ok()
        }
        Err(_) => false,
    }
}

/// Split a comma-separated token list, dropping empty tokens.
/// Mirrors the original `SeparateButWithNoEmptyToken(str, ",")`.
pub fn split_non_empty(value: &str, sep: char) -> Vec<String> {
    value
        .split(sep)
        .filter(|tok| !tok.is_empty())
        .map(|tok| tok.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_group_name() {
        assert!(validate_group_name("cvd").is_ok());
        assert!(validate_group_name("_private").is_ok());
        assert!(validate_group_name("Abc_123").is_ok());
        assert!(validate_group_name("").is_err());
        assert!(validate_group_name("1abc").is_err());
        assert!(validate_group_name("a-b").is_err());
    }

    #[test]
    fn test_validate_instance_name() {
        assert!(validate_instance_name("1").is_ok());
        assert!(validate_instance_name("x").is_ok());
        assert!(validate_instance_name("").is_err());
        assert!(validate_instance_name("a-b").is_err());
    }

    #[test]
    fn test_split_device_name() {
        assert_eq!(split_device_name("foo-bar").unwrap(), ("foo", "bar"));
        assert!(split_device_name("foo").is_err());
        assert!(split_device_name("foo-bar-baz").is_err());
        assert!(split_device_name("-bar").is_err());
        assert!(split_device_name("foo-").is_err());
    }

    #[test]
    fn test_is_valid_device_name() {
        assert!(is_valid_device_name("foo-bar"));
        assert!(!is_valid_device_name("foo"));
        assert!(!is_valid_device_name("1foo-bar"));
    }

    #[test]
    fn test_split_non_empty() {
        assert_eq!(split_non_empty("a,b,,c", ','), vec!["a", "b", "c"]);
        assert_eq!(split_non_empty("", ','), Vec::<String>::new());
    }
}
