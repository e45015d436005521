//! System-wide constants and default paths.

/// Separator between segments of a parameter-store key.
pub const KEY_SEPARATOR: char = '/';

/// Opening marker of a legacy render-time resolve token.
pub const LEGACY_TOKEN_OPEN: &str = "{{resolve:ssm:";

/// Closing marker of a legacy render-time resolve token.
pub const LEGACY_TOKEN_CLOSE: &str = "}}";

/// Default path of the file-backed parameter store.
pub const DEFAULT_STORE_FILE: &str = ".stackwire/parameters.json";

/// Default deployment file read by the CLI.
pub const DEFAULT_DEPLOYMENT_FILE: &str = "stackwire.yaml";

/// Separator used for nested variable lookups (`env-dict.ApiName`).
pub const VARIABLE_PATH_SEPARATOR: char = '.';

/// Application name used in CLI output and store files.
pub const APP_NAME: &str = "stackwire";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "stw";
