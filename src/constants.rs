//! Global constants used throughout the pppackage codebase.
//!
//! Environment variable names, well-known paths inside build roots, and the
//! timeout/retry parameters shared by several modules.

use std::time::Duration;

/// Environment variable overriding the configuration file path.
pub const CONFIG_ENV: &str = "PPPACKAGE_CONFIG";

/// Environment variable disabling progress bars when set.
pub const NO_PROGRESS_ENV: &str = "PPPACKAGE_NO_PROGRESS";

/// Environment variable carrying the build root into sandboxed commands.
pub const ROOTFS_ENV: &str = "PPPACKAGE_ROOTFS";

/// Placeholder substituted with the build root in containerizer commands.
pub const ROOTFS_PLACEHOLDER: &str = "{rootfs}";

/// Configuration file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pppackage.toml";

/// Directory, relative to a build root, where a meta build leaves its output.
pub const BUILD_OUTPUT_DIR: &str = "mnt/output";

/// File name of the product artifact in [`BUILD_OUTPUT_DIR`] and in cache entries.
pub const PRODUCT_FILE: &str = "product";

/// File name of the installer tag in [`BUILD_OUTPUT_DIR`].
pub const INSTALLER_FILE: &str = "installer";

/// Timeout for a single HTTP request to a remote repository (60 seconds).
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for a sandboxed build command (1 hour).
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Starting delay for archive download retries (100ms).
pub const DOWNLOAD_RETRY_BASE_MS: u64 = 100;

/// Maximum backoff delay between archive download retries (2 seconds).
pub const DOWNLOAD_RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Number of retries after a failed archive download.
pub const DOWNLOAD_RETRIES: usize = 3;
