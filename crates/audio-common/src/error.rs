//! Error handling for distributed audio
//!
//! Every fallible operation in the workspace returns [`Result`]. Each
//! [`DAudioError`] variant carries a stable numeric code so results can cross
//! the IPC boundary unchanged (see [`DAudioError::code`]).

use thiserror::Error;

/// Result type alias for distributed audio operations
pub type Result<T> = std::result::Result<T, DAudioError>;

/// Status code reported for a successful operation
pub const DH_SUCCESS: i32 = 0;

/// Numeric status codes carried by [`DAudioError`]
pub mod codes {
    pub const ERR_DH_AUDIO_FAILED: i32 = -40000;
    pub const ERR_DH_AUDIO_NOT_SUPPORT: i32 = -40001;
    pub const ERR_DH_AUDIO_NULLPTR: i32 = -40002;
    pub const ERR_DH_AUDIO_NOT_FOUND_KEY: i32 = -40003;
    pub const ERR_DH_AUDIO_SA_PARAM_INVALID: i32 = -40010;
    pub const ERR_DH_AUDIO_SA_WAIT_TIMEOUT: i32 = -40011;
    pub const ERR_DH_AUDIO_SA_DEVICE_NOT_EXIST: i32 = -40012;
    pub const ERR_DH_AUDIO_TRANS_ILLEGAL_OPERATION: i32 = -40040;
    pub const ERR_DH_AUDIO_BUFFER_FULL: i32 = -40050;
    pub const ERR_DH_AUDIO_BUFFER_INSUFFICIENT: i32 = -40051;
    pub const ERR_DH_AUDIO_ALLOC: i32 = -40052;
    pub const ERR_DH_AUDIO_CONFIG: i32 = -40060;
}

/// Error type for distributed audio operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DAudioError {
    /// Generic failure reported by a collaborator
    #[error("Operation failed: {reason}")]
    Failed { reason: String },

    /// Device handle or operation not supported
    #[error("Not supported: {what}")]
    NotSupport { what: String },

    /// A required collaborator (transport, callback, worker) is not wired up
    #[error("Null dependency: {what}")]
    Nullptr { what: String },

    /// Missing, oversized or malformed argument
    #[error("Invalid parameter: {details}")]
    ParamInvalid { details: String },

    /// Required JSON key absent
    #[error("Key not found: {key}")]
    NotFoundKey { key: String },

    /// The remote side never answered within the bound
    #[error("Timed out after {millis}ms waiting for {what}")]
    WaitTimeout { what: String, millis: u64 },

    /// Remote device or local audio device unknown
    #[error("Device does not exist: {dev_id}")]
    DeviceNotExist { dev_id: String },

    /// Transport status machine rejected the operation
    #[error("Illegal operation {operation} in transport state {state}")]
    IllegalOperation { state: String, operation: String },

    /// Ring buffer cannot accept the write
    #[error("Buffer full: need {needed} bytes, {free} free")]
    BufferFull { needed: usize, free: usize },

    /// Ring buffer holds fewer bytes than requested
    #[error("Insufficient data: requested {requested} bytes, {available} available")]
    InsufficientData { requested: usize, available: usize },

    /// Backing storage could not be allocated
    #[error("Allocation of {size} bytes failed")]
    Alloc { size: usize },

    /// The remote device answered with a failure code
    #[error("Remote device reported failure code {code}")]
    Remote { code: i32 },

    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl DAudioError {
    /// Create a generic failure
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Create a not-supported error
    pub fn not_support(what: impl Into<String>) -> Self {
        Self::NotSupport { what: what.into() }
    }

    /// Create a null-dependency error
    pub fn nullptr(what: impl Into<String>) -> Self {
        Self::Nullptr { what: what.into() }
    }

    /// Create an invalid-parameter error
    pub fn param_invalid(details: impl Into<String>) -> Self {
        Self::ParamInvalid {
            details: details.into(),
        }
    }

    /// Create a missing-key error
    pub fn not_found_key(key: impl Into<String>) -> Self {
        Self::NotFoundKey { key: key.into() }
    }

    /// Create a timeout error
    pub fn wait_timeout(what: impl Into<String>, millis: u64) -> Self {
        Self::WaitTimeout {
            what: what.into(),
            millis,
        }
    }

    /// Create an illegal transport operation error
    pub fn illegal_operation(state: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::IllegalOperation {
            state: state.into(),
            operation: operation.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Rebuild an error from a status code received over IPC/RPC.
    ///
    /// Returns `None` for [`DH_SUCCESS`].
    pub fn from_code(code: i32) -> Option<Self> {
        use codes::*;
        let err = match code {
            DH_SUCCESS => return None,
            ERR_DH_AUDIO_NOT_SUPPORT => Self::not_support("remote"),
            ERR_DH_AUDIO_NULLPTR => Self::nullptr("remote"),
            ERR_DH_AUDIO_SA_PARAM_INVALID => Self::param_invalid("remote"),
            _ => Self::Remote { code },
        };
        Some(err)
    }

    /// Stable numeric status code of this error
    pub fn code(&self) -> i32 {
        use codes::*;
        match self {
            Self::Failed { .. } => ERR_DH_AUDIO_FAILED,
            Self::NotSupport { .. } => ERR_DH_AUDIO_NOT_SUPPORT,
            Self::Nullptr { .. } => ERR_DH_AUDIO_NULLPTR,
            Self::ParamInvalid { .. } => ERR_DH_AUDIO_SA_PARAM_INVALID,
            Self::NotFoundKey { .. } => ERR_DH_AUDIO_NOT_FOUND_KEY,
            Self::WaitTimeout { .. } => ERR_DH_AUDIO_SA_WAIT_TIMEOUT,
            Self::DeviceNotExist { .. } => ERR_DH_AUDIO_SA_DEVICE_NOT_EXIST,
            Self::IllegalOperation { .. } => ERR_DH_AUDIO_TRANS_ILLEGAL_OPERATION,
            Self::BufferFull { .. } => ERR_DH_AUDIO_BUFFER_FULL,
            Self::InsufficientData { .. } => ERR_DH_AUDIO_BUFFER_INSUFFICIENT,
            Self::Alloc { .. } => ERR_DH_AUDIO_ALLOC,
            Self::Remote { code } => *code,
            Self::Config { .. } => ERR_DH_AUDIO_CONFIG,
        }
    }

    /// Whether re-invoking the operation later can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Fixed by wiring the dependency or waiting for the peer
            Self::Nullptr { .. }
            | Self::WaitTimeout { .. }
            | Self::BufferFull { .. }
            | Self::InsufficientData { .. }
            | Self::Remote { .. }
            | Self::Failed { .. } => true,

            Self::NotSupport { .. }
            | Self::ParamInvalid { .. }
            | Self::NotFoundKey { .. }
            | Self::DeviceNotExist { .. }
            | Self::IllegalOperation { .. }
            | Self::Alloc { .. }
            | Self::Config { .. } => false,
        }
    }
}

/// Status code of a unit result, as reported to IPC callers
pub fn result_code(result: &Result<()>) -> i32 {
    match result {
        Ok(()) => DH_SUCCESS,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            DAudioError::failed("x"),
            DAudioError::not_support("x"),
            DAudioError::nullptr("x"),
            DAudioError::param_invalid("x"),
            DAudioError::not_found_key("x"),
            DAudioError::wait_timeout("x", 1),
            DAudioError::illegal_operation("STOP", "pause"),
            DAudioError::config("x"),
        ];
        let mut seen: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), errors.len());
        assert!(seen.iter().all(|c| *c != DH_SUCCESS));
    }

    #[test]
    fn test_from_code_round_trip() {
        assert!(DAudioError::from_code(DH_SUCCESS).is_none());
        let err = DAudioError::from_code(codes::ERR_DH_AUDIO_NULLPTR).unwrap();
        assert_eq!(err.code(), codes::ERR_DH_AUDIO_NULLPTR);
        let remote = DAudioError::from_code(-12345).unwrap();
        assert_eq!(remote, DAudioError::Remote { code: -12345 });
        assert_eq!(remote.code(), -12345);
    }

    #[test]
    fn test_result_code() {
        assert_eq!(result_code(&Ok(())), DH_SUCCESS);
        assert_eq!(
            result_code(&Err(DAudioError::wait_timeout("rpc", 10))),
            codes::ERR_DH_AUDIO_SA_WAIT_TIMEOUT
        );
    }

    #[test]
    fn test_recoverability() {
        assert!(DAudioError::nullptr("worker").is_recoverable());
        assert!(!DAudioError::illegal_operation("PAUSE", "start").is_recoverable());
    }
}
