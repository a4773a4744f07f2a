use embassy_time::Duration;

/// Maximum length of a single response line, and of any string copied out
/// of one.
pub const AT_MAX_STRING_SIZE: usize = 256;
/// Maximum length of an AT command, excluding the terminator.
pub const AT_CMD_MAX_SIZE: usize = 200;
pub const PKTIO_READ_BUFFER_SIZE: usize = 1600;
/// Intermediate lines kept for a single response.
pub const MAX_RESPONSE_LINES: usize = 32;
pub const MAX_PREFIX_STRING_LENGTH: usize = 32;

pub const NUM_SOCKET_MAX: usize = 12;
pub const MIN_PDN_CONTEXT_ID: u8 = 1;
pub const MAX_PDN_CONTEXT_ID: u8 = 16;
pub const MAX_PDN_CONTEXTS: usize = (MAX_PDN_CONTEXT_ID - MIN_PDN_CONTEXT_ID + 1) as usize;

pub const IP_ADDRESS_MAX_SIZE: usize = 40;
pub const MAX_SEND_DATA_LEN: usize = 1460;
pub const MAX_RECV_DATA_LEN: usize = 1500;

pub const COMM_IF_SEND_TIMEOUT_MS: u64 = 1000;
pub const COMM_IF_RECV_TIMEOUT_MS: u64 = 1000;
pub const AT_COMMAND_TIMEOUT_MS: u64 = 5000;

/// How the packet layer decides where a response line ends.
///
/// Empty lines are skipped in either mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineTermination {
    /// Any of `\r`, `\n` or `\0` ends a line.
    #[default]
    Any,
    /// Only `\r\n` ends a line. A lone `\r` or `\n` is kept as line content.
    CrLf,
}

pub trait CellularConfig {
    /// Time to wait for the final result code of a command.
    const COMMAND_TIMEOUT: Duration = Duration::from_millis(AT_COMMAND_TIMEOUT_MS);
    const COMM_SEND_TIMEOUT: Duration = Duration::from_millis(COMM_IF_SEND_TIMEOUT_MS);
    const COMM_RECV_TIMEOUT: Duration = Duration::from_millis(COMM_IF_RECV_TIMEOUT_MS);

    /// Appended to every command sent.
    const COMMAND_TERMINATOR: &'static str = "\r";
    const LINE_TERMINATION: LineTermination = LineTermination::Any;
}

/// Configuration using the library defaults for everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl CellularConfig for DefaultConfig {}
