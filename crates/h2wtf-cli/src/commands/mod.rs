//! CLI subcommand implementations.

use std::process::ExitCode;

pub mod lines;
pub mod summary;

/// Result of a command that produced no fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Something was shown.
    Data,
    /// Nothing matched; not an error, but scripts may want to know.
    NoData,
}

impl Outcome {
    pub const fn from_found(found: bool) -> Self {
        if found { Self::Data } else { Self::NoData }
    }

    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Data => ExitCode::SUCCESS,
            Self::NoData => ExitCode::from(2),
        }
    }
}
