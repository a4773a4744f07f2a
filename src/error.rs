/// Errors returned by the AT core string helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtError {
    /// Input was empty or malformed for the requested operation.
    BadParameter,
    /// The destination buffer is too small.
    NoMemory,
    Unsupported,
    /// Generic parse failure.
    Error,
}

/// Errors returned by a [`CommInterface`](crate::comm::CommInterface)
/// implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommError {
    Failure,
    BadParameter,
    NoMemory,
    Timeout,
    DriverError,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    InvalidHandle,
    ModemNotReady,
    LibraryNotOpen,
    LibraryAlreadyOpen,
    BadParameter,
    NoMemory,
    Timeout,
    SocketClosed,
    SocketNotConnected,
    InternalFailure,
    ResourceCreationFail,
    Unsupported,
    NotAllowed,
    Unknown,

    /// The modem answered the command with an error token.
    ModemError,

    At(AtError),
    Comm(CommError),
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter<'_>) {
        match self {
            Self::InvalidHandle => defmt::write!(f, "InvalidHandle"),
            Self::ModemNotReady => defmt::write!(f, "ModemNotReady"),
            Self::LibraryNotOpen => defmt::write!(f, "LibraryNotOpen"),
            Self::LibraryAlreadyOpen => defmt::write!(f, "LibraryAlreadyOpen"),
            Self::BadParameter => defmt::write!(f, "BadParameter"),
            Self::NoMemory => defmt::write!(f, "NoMemory"),
            Self::Timeout => defmt::write!(f, "Timeout"),
            Self::SocketClosed => defmt::write!(f, "SocketClosed"),
            Self::SocketNotConnected => defmt::write!(f, "SocketNotConnected"),
            Self::InternalFailure => defmt::write!(f, "InternalFailure"),
            Self::ResourceCreationFail => defmt::write!(f, "ResourceCreationFail"),
            Self::Unsupported => defmt::write!(f, "Unsupported"),
            Self::NotAllowed => defmt::write!(f, "NotAllowed"),
            Self::Unknown => defmt::write!(f, "Unknown"),
            Self::ModemError => defmt::write!(f, "ModemError"),
            Self::At(e) => defmt::write!(f, "At({:?})", e),
            Self::Comm(e) => defmt::write!(f, "Comm({:?})", e),
        }
    }
}

impl From<AtError> for Error {
    fn from(e: AtError) -> Self {
        match e {
            AtError::BadParameter => Self::BadParameter,
            AtError::NoMemory => Self::NoMemory,
            AtError::Unsupported => Self::Unsupported,
            AtError::Error => Self::At(e),
        }
    }
}

impl From<CommError> for Error {
    fn from(e: CommError) -> Self {
        match e {
            CommError::Timeout => Self::Timeout,
            e => Self::Comm(e),
        }
    }
}

impl From<embassy_time::TimeoutError> for Error {
    fn from(_: embassy_time::TimeoutError) -> Self {
        Self::Timeout
    }
}

/// Failure of the packet layer for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum PktStatus {
    /// No final result code in time.
    Timeout,
    /// The comm interface accepted fewer bytes than requested.
    SendError,
    /// Raw payload larger than the response can hold.
    SizeMismatch,
}

impl From<PktStatus> for Error {
    fn from(status: PktStatus) -> Self {
        match status {
            PktStatus::Timeout => Self::Timeout,
            PktStatus::SendError => Self::Comm(CommError::Failure),
            PktStatus::SizeMismatch => Self::InternalFailure,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn comm_timeout_maps_to_timeout() {
        assert_eq!(Error::from(CommError::Timeout), Error::Timeout);
        assert_eq!(
            Error::from(CommError::DriverError),
            Error::Comm(CommError::DriverError)
        );
    }

    #[test]
    fn at_errors_flatten() {
        assert_eq!(Error::from(AtError::NoMemory), Error::NoMemory);
        assert_eq!(Error::from(AtError::Error), Error::At(AtError::Error));
        assert_eq!(Error::from(PktStatus::SendError), Error::Comm(CommError::Failure));
        assert_eq!(Error::from(PktStatus::SizeMismatch), Error::InternalFailure);
    }
}
