use thiserror::Error;

/// Error conditions shared by every component and by the REST wire format.
///
/// The numeric codes returned by [`KiwibesError::code`] are part of the REST
/// contract and of the process exit status; they must never be renumbered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KiwibesError {
    #[error("failed to parse the command line")]
    CmdlineParse,

    #[error("invalid log level, must be in the range [0,2]")]
    CmdlineInvLogLevel,

    #[error("invalid log maximum size, must be at most 100 MB")]
    CmdlineInvLogMaxSize,

    #[error("invalid data store maximum size, must be at most 100 MB")]
    CmdlineInvDataStoreMaxSize,

    #[error("home folder does not exist")]
    CmdlineInvHome,

    #[error("the jobs database file does not exist")]
    NoDatabaseFile,

    #[error("failed to parse the JSON database file")]
    JsonParseFail,

    #[error("interrupted by a termination signal")]
    MainInterrupted,

    #[error("Job not found")]
    JobNameUnknown,

    #[error("Job name already exists")]
    JobNameTaken,

    #[error("Bad request")]
    JobDescriptionInvalid,

    #[error("Bad request")]
    EmptyRestRequest,

    #[error("Job is running")]
    JobIsRunning,

    #[error("Job is not running")]
    JobIsNotRunning,

    #[error("Invalid job schedule")]
    JobScheduleInvalid,

    #[error("Failed to start job")]
    ProcessLaunchFailed,

    #[error("Data key already exists")]
    DataKeyTaken,

    #[error("Data key not found")]
    DataKeyUnknown,

    #[error("Not enough space in the data storage")]
    DataStoreFull,

    #[error("Authentication failed")]
    AuthenticationFail,
}

impl KiwibesError {
    /// Stable wire code, also used as the process exit status.
    pub fn code(&self) -> u32 {
        match self {
            KiwibesError::CmdlineParse => 1,
            KiwibesError::CmdlineInvLogLevel => 2,
            KiwibesError::CmdlineInvLogMaxSize => 3,
            KiwibesError::CmdlineInvDataStoreMaxSize => 4,
            KiwibesError::CmdlineInvHome => 5,
            KiwibesError::NoDatabaseFile => 6,
            KiwibesError::JsonParseFail => 7,
            KiwibesError::MainInterrupted => 8,
            KiwibesError::JobNameUnknown => 9,
            KiwibesError::JobNameTaken => 10,
            KiwibesError::JobDescriptionInvalid => 11,
            KiwibesError::EmptyRestRequest => 12,
            KiwibesError::JobIsRunning => 13,
            KiwibesError::JobIsNotRunning => 14,
            KiwibesError::JobScheduleInvalid => 15,
            KiwibesError::ProcessLaunchFailed => 16,
            KiwibesError::DataKeyTaken => 17,
            KiwibesError::DataKeyUnknown => 18,
            KiwibesError::DataStoreFull => 19,
            KiwibesError::AuthenticationFail => 20,
        }
    }
}

pub type Result<T> = std::result::Result<T, KiwibesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes_are_stable() {
        assert_eq!(KiwibesError::CmdlineParse.code(), 1);
        assert_eq!(KiwibesError::NoDatabaseFile.code(), 6);
        assert_eq!(KiwibesError::JobNameUnknown.code(), 9);
        assert_eq!(KiwibesError::JobScheduleInvalid.code(), 15);
        assert_eq!(KiwibesError::AuthenticationFail.code(), 20);
    }
}
