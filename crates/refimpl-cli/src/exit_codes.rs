//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success, or the user declined the confirmation prompt
pub const SUCCESS: i32 = 0;

/// General error - configuration, input data, timeouts, tool failures
pub const ERROR: i32 = 1;

/// Local kubeconfig file missing or unreadable
pub const CREDENTIAL_UNAVAILABLE: i32 = 2;

/// Fetched kubeconfig was empty
pub const CREDENTIAL_EMPTY: i32 = 3;

/// A required external tool is not installed
pub const TOOL_MISSING: i32 = 4;

/// Stopped by SIGINT or SIGTERM (128 + SIGINT)
pub const INTERRUPTED: i32 = 130;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
