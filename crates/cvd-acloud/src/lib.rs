// cvd-acloud: translates legacy `acloud create` argv into cvd command
// requests. Depends on cvd-core for error/env types and cvd-lock for
// temp-directory resolution.

pub mod command;
pub mod flags;
pub mod image_probe;
pub mod translator;

pub use command::{CommandRequest, Stdio};
pub use flags::{parse_acloud_args, AcloudCreateArgs, BuildSpec};
pub use translator::translate;
