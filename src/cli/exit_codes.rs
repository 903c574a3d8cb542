//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Interrupted by the user (128 + SIGINT)
    pub const INTERRUPTED: u8 = 130;
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        130 => "Interrupted by user",
        _ => "Unknown error",
    }
}

/// Convert an exit code constant to a process exit code
pub fn to_exit_code(code: u8) -> ExitCode {
    ExitCode::from(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_descriptions() {
        assert_eq!(exit_code_description(ExitCodes::SUCCESS), "Success");
        assert_eq!(
            exit_code_description(ExitCodes::INTERRUPTED),
            "Interrupted by user"
        );
        assert_eq!(exit_code_description(42), "Unknown error");
    }
}
