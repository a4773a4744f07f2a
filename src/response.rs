//! AT requests and classification of the lines that answer them.

use heapless::{String, Vec};

use crate::at;
use crate::config::{AT_MAX_STRING_SIZE, MAX_RECV_DATA_LEN, MAX_RESPONSE_LINES};
use crate::error::{AtError, Error};
use crate::token_table::TokenTable;

/// What a command is expected to answer with, before its final result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtCommandType {
    /// Only a final result code.
    NoResult,
    /// One line without prefix.
    WoPrefix,
    /// One line starting with the response prefix.
    WithPrefix,
    MultiWithPrefix,
    MultiWoPrefix,
    /// Any number of lines, possibly followed by raw payload.
    MultiDataWoPrefix,
    /// One line without prefix and no final result code.
    WoPrefixNoResultCode,
    /// One prefixed line and no final result code.
    WithPrefixNoResultCode,
    /// No command in flight.
    #[default]
    NoCommand,
}

impl AtCommandType {
    pub fn requires_prefix(&self) -> bool {
        matches!(
            self,
            Self::WithPrefix | Self::MultiWithPrefix | Self::WithPrefixNoResultCode
        )
    }

    fn completes_without_result_code(&self) -> bool {
        matches!(self, Self::WoPrefixNoResultCode | Self::WithPrefixNoResultCode)
    }
}

/// A single AT command.
#[derive(Debug, Clone, Copy)]
pub struct AtRequest<'r> {
    /// Command text without terminator, e.g. `AT+CSQ`.
    pub cmd: &'r str,
    pub cmd_type: AtCommandType,
    /// Prefix of the solicited lines, e.g. `+CSQ`.
    pub prefix: Option<&'r str>,
}

impl<'r> AtRequest<'r> {
    pub const fn new(cmd: &'r str, cmd_type: AtCommandType) -> Self {
        Self {
            cmd,
            cmd_type,
            prefix: None,
        }
    }

    pub const fn with_prefix(cmd: &'r str, cmd_type: AtCommandType, prefix: &'r str) -> Self {
        Self {
            cmd,
            cmd_type,
            prefix: Some(prefix),
        }
    }
}

/// Raw payload sent after a command prompt, e.g. for socket sends.
#[derive(Debug, Clone, Copy)]
pub struct AtDataRequest<'d> {
    pub data: &'d [u8],
    /// Sent right after the payload when the modem needs a terminator
    /// such as `Ctrl-Z`.
    pub end_pattern: Option<&'d [u8]>,
}

/// Result of a raw payload detection at the start of the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPrefix {
    /// Bytes from the start of the buffer to the first payload byte. The
    /// header is handed to the classifier as a normal line.
    pub data_start: usize,
    pub data_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPrefixError {
    /// The header is not complete yet.
    Incomplete,
    /// The header announces a payload larger than the engine can hold.
    TooLarge,
}

/// Detects a `<header><payload>` response at the start of the read buffer.
///
/// Returns `Ok(None)` when the buffer does not start with a payload header.
pub type DataPrefixFn = fn(&[u8]) -> Result<Option<DataPrefix>, DataPrefixError>;

/// Detects a prompt without line end, such as `>`, at the start of the read
/// buffer and returns its length.
pub type DataSendPrefixFn = fn(&[u8]) -> Option<usize>;

/// The usual `>` data prompt, with its trailing space when it has already
/// been received.
pub fn data_prompt(buf: &[u8]) -> Option<usize> {
    match buf {
        [b'>', b' ', ..] => Some(2),
        [b'>', ..] => Some(1),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseStatus {
    /// Terminated by a success token.
    Success,
    /// Terminated by an error token.
    ModemError,
    /// The lines did not match what the command type allows.
    Error,
    /// Terminated by a success token, but the expected prefix never came.
    Unknown,
}

impl ResponseStatus {
    pub fn check(&self) -> Result<(), Error> {
        match self {
            Self::Success => Ok(()),
            Self::ModemError => Err(Error::ModemError),
            Self::Error => Err(Error::At(AtError::Error)),
            Self::Unknown => Err(Error::Unknown),
        }
    }
}

/// Lines and payload collected for a single request.
#[derive(Debug, Clone)]
pub struct AtResponse {
    status: ResponseStatus,
    lines: Vec<String<AT_MAX_STRING_SIZE>, MAX_RESPONSE_LINES>,
    data: Vec<u8, MAX_RECV_DATA_LEN>,
}

impl Default for AtResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl AtResponse {
    pub const fn new() -> Self {
        Self {
            status: ResponseStatus::Error,
            lines: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    /// Intermediate lines, in arrival order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|l| l.as_str())
    }

    pub fn first_line(&self) -> Option<&str> {
        self.lines.first().map(|l| l.as_str())
    }

    /// First line with `prefix` and everything up to its `:` removed, and
    /// leading whitespace trimmed.
    pub fn payload(&self, prefix: &str) -> Result<&str, AtError> {
        let line = self
            .lines()
            .find(|l| l.starts_with(prefix))
            .ok_or(AtError::Error)?;
        let rest = at::remove_prefix(line)?;
        Ok(rest.trim_start_matches(|c: char| c.is_ascii_whitespace()))
    }

    /// Raw payload collected through a data prefix.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn clear(&mut self) {
        self.status = ResponseStatus::Error;
        self.lines.clear();
        self.data.clear();
    }

    pub(crate) fn push_line(&mut self, line: &str) -> Result<(), Error> {
        let line = String::try_from(line).map_err(|_| Error::NoMemory)?;
        self.lines.push(line).map_err(|_| Error::NoMemory)
    }

    pub(crate) fn push_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.data
            .extend_from_slice(data)
            .map_err(|_| Error::NoMemory)
    }

    fn finish(&mut self, status: ResponseStatus) -> Progress {
        self.status = status;
        Progress::Complete(status)
    }

    /// Map the final status to the caller facing result.
    pub fn check(&self) -> Result<(), Error> {
        self.status.check()
    }

    pub fn into_result(self) -> Result<Self, Error> {
        self.check().map(|()| self)
    }
}

/// How a received line relates to the command in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum MsgType {
    Solicited,
    Unsolicited,
    /// Neither part of the pending response nor a recognisable URC.
    Undefined,
}

/// Decide whether `line` answers the pending command or is unsolicited.
///
/// URC tokens without prefix always win. A prefixed line is solicited only
/// while a command is pending and it carries the command's prefix. Lines
/// without prefix are solicited while a command without prefix is pending,
/// or when the command type allows unprefixed continuation lines.
pub(crate) fn msg_type(
    table: &TokenTable,
    cmd_type: AtCommandType,
    prefix: Option<&str>,
    line: &str,
) -> MsgType {
    if table.is_urc_without_prefix(line) {
        return MsgType::Unsolicited;
    }

    let with_prefix = at::is_prefix_present(line).unwrap_or(false);

    if with_prefix {
        let with_resp_prefix = prefix
            .map(|p| at::str_starts_with(line, p).unwrap_or(false))
            .unwrap_or(false);
        if cmd_type != AtCommandType::NoCommand && with_resp_prefix {
            MsgType::Solicited
        } else {
            MsgType::Unsolicited
        }
    } else if (cmd_type != AtCommandType::NoCommand && prefix.is_none())
        || matches!(
            cmd_type,
            AtCommandType::MultiDataWoPrefix
                | AtCommandType::WithPrefix
                | AtCommandType::MultiWithPrefix
        )
    {
        MsgType::Solicited
    } else {
        MsgType::Undefined
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    /// More lines are needed.
    Pending,
    Complete(ResponseStatus),
}

/// Feed one solicited line into `resp`.
///
/// Terminal tokens are checked first: extra success tokens (table wide and
/// request specific), then success tokens, then error tokens, all by prefix
/// match. Anything else is an intermediate line handled per command type.
pub(crate) fn process_line(
    table: &TokenTable,
    request_success_tokens: &[&str],
    cmd_type: AtCommandType,
    prefix: Option<&str>,
    resp: &mut AtResponse,
    line: &str,
) -> Progress {
    let is_success = [
        table.extra_success_tokens,
        request_success_tokens,
        table.success_tokens,
    ]
    .iter()
    .any(|tokens| at::check_error_code(line, tokens).unwrap_or(false));

    if is_success {
        if cmd_type.requires_prefix() && !has_prefixed_line(resp, prefix) {
            warn!("Success without any line carrying the response prefix");
            return resp.finish(ResponseStatus::Unknown);
        }
        debug!("Final AT response is SUCCESS [{}]", line);
        return resp.finish(ResponseStatus::Success);
    }

    if at::check_error_code(line, table.error_tokens).unwrap_or(false) {
        error!("Modem returned ERROR: {}", line);
        return resp.finish(ResponseStatus::ModemError);
    }

    process_intermediate(cmd_type, prefix, resp, line)
}

fn has_prefixed_line(resp: &AtResponse, prefix: Option<&str>) -> bool {
    match prefix {
        Some(prefix) => resp.lines().any(|l| l.starts_with(prefix)),
        None => false,
    }
}

fn process_intermediate(
    cmd_type: AtCommandType,
    prefix: Option<&str>,
    resp: &mut AtResponse,
    line: &str,
) -> Progress {
    let single_line = matches!(
        cmd_type,
        AtCommandType::WoPrefix
            | AtCommandType::WithPrefix
            | AtCommandType::WoPrefixNoResultCode
            | AtCommandType::WithPrefixNoResultCode
    );

    if single_line && !resp.lines.is_empty() {
        error!("{:?} got a second intermediate line: {}", cmd_type, line);
        return resp.finish(ResponseStatus::Error);
    }

    if let Err(_e) = resp.push_line(line) {
        error!("Response does not fit, dropping: {}", line);
        return resp.finish(ResponseStatus::Error);
    }

    if cmd_type.completes_without_result_code() {
        if cmd_type.requires_prefix() && !has_prefixed_line(resp, prefix) {
            return resp.finish(ResponseStatus::Unknown);
        }
        return resp.finish(ResponseStatus::Success);
    }

    Progress::Pending
}
