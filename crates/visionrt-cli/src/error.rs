// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors

use std::fmt;
use std::io;
use std::process::ExitCode;

/// CLI-specific error type with exit code mapping
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line arguments
    InvalidArgs(String),
    /// Camera device not found or inaccessible
    CameraNotFound(String),
    /// Device lacks a capability or format the command needs
    Unsupported(String),
    /// Frame capture failed mid-stream
    Capture(String),
    /// General error from VisionRT library
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::CameraNotFound(msg) => write!(f, "Camera not found: {}", msg),
            CliError::Unsupported(msg) => write!(f, "Unsupported device: {}", msg),
            CliError::Capture(msg) => write!(f, "Capture failed: {}", msg),
            CliError::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    fn code(&self) -> u8 {
        match self {
            CliError::InvalidArgs(_) => 2,
            CliError::CameraNotFound(_) => 3,
            CliError::Unsupported(_) => 4,
            CliError::Capture(_) => 5,
            CliError::General(_) => 1,
        }
    }
}

/// Map visionrt::Error to CliError with appropriate exit codes
impl From<visionrt::Error> for CliError {
    fn from(err: visionrt::Error) -> Self {
        use visionrt::Error;

        match err {
            // Open failures carry the OS error, capability failures do not
            Error::Device {
                source: Some(ref io_err),
                ..
            } => match io_err.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    CliError::CameraNotFound(err.to_string())
                }
                _ => CliError::General(err.to_string()),
            },
            Error::Device { source: None, .. } => CliError::Unsupported(err.to_string()),

            Error::Protocol { .. } => CliError::Unsupported(err.to_string()),

            Error::Capture(_) | Error::Buffer { .. } | Error::Upload(_) => {
                CliError::Capture(err.to_string())
            }

            Error::OutOfRange { .. } => CliError::InvalidArgs(err.to_string()),

            Error::Io(ref io_err) if io_err.kind() == io::ErrorKind::NotFound => {
                CliError::CameraNotFound(err.to_string())
            }

            Error::State(_) | Error::Io(_) => CliError::General(err.to_string()),
        }
    }
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> Self {
        CliError::General(format!("I/O error: {}", err))
    }
}

/// Helper function to convert result to exit code
pub fn result_to_exit_code<T>(result: Result<T, CliError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}
