pub mod files;
pub mod inspect;
pub mod weave;

use std::process::ExitCode;

/// Overall outcome of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Everything succeeded, including modules with nothing to weave
    Success,
    /// At least one module was rejected by validation
    Rejected,
    /// An I/O failure or internal error stopped processing
    Fatal,
}

impl Status {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Status::Success => ExitCode::SUCCESS,
            Status::Rejected => ExitCode::from(1),
            Status::Fatal => ExitCode::from(2),
        }
    }
}
