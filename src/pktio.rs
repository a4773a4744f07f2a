//! Splits the byte stream coming from the comm interface into lines and
//! raw payloads.

use core::ops::Range;

use crate::config::{LineTermination, PKTIO_READ_BUFFER_SIZE};
use crate::fmt::LossyStr;
use crate::response::{DataPrefixError, DataPrefixFn, DataSendPrefixFn};

/// Per request hooks that change how the buffer is framed.
#[derive(Clone, Copy, Default)]
pub(crate) struct FrameHooks {
    pub data_prefix: Option<DataPrefixFn>,
    pub data_send_prefix: Option<DataSendPrefixFn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    /// A complete line without terminator.
    Line(Range<usize>),
    /// Raw payload announced by the preceding line.
    Data(Range<usize>),
}

pub(crate) struct PacketIo {
    buf: [u8; PKTIO_READ_BUFFER_SIZE],
    len: usize,
    /// Payload bytes still owed by a data prefix header.
    pending_data: Option<usize>,
}

impl PacketIo {
    pub const fn new() -> Self {
        Self {
            buf: [0; PKTIO_READ_BUFFER_SIZE],
            len: 0,
            pending_data: None,
        }
    }

    /// Free space to receive into. Commit what was written with
    /// [`Self::commit`].
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    pub fn commit(&mut self, n: usize) {
        self.len = (self.len + n).min(self.buf.len());
    }

    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    pub fn reset(&mut self) {
        self.len = 0;
        self.pending_data = None;
    }

    pub fn slice(&self, range: Range<usize>) -> &[u8] {
        &self.buf[range]
    }

    /// Drop the first `n` bytes of the buffer.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.buf.copy_within(n..self.len, 0);
        self.len -= n;
    }

    /// Find the next complete frame.
    ///
    /// Returns the frame and the number of bytes to [`Self::consume`] once
    /// it has been handled, or `None` if more bytes are needed. The ranges
    /// stay valid until the next mutation.
    pub fn next_frame(
        &mut self,
        hooks: &FrameHooks,
        termination: LineTermination,
    ) -> Option<(Frame, usize)> {
        if let Some(data_len) = self.pending_data {
            if self.len < data_len {
                return None;
            }
            self.pending_data = None;
            return Some((Frame::Data(0..data_len), data_len));
        }

        self.skip_line_ends(termination);
        if self.len == 0 {
            return None;
        }

        if let Some(prompt) = hooks.data_send_prefix {
            if let Some(n) = prompt(&self.buf[..self.len]) {
                if n > 0 && n <= self.len {
                    return Some((Frame::Line(0..n), n));
                }
            }
        }

        if let Some(detect) = hooks.data_prefix {
            match detect(&self.buf[..self.len]) {
                Ok(Some(prefix)) => {
                    let header_end = trim_line_end(&self.buf[..prefix.data_start]);
                    if prefix.data_len > 0 {
                        self.pending_data = Some(prefix.data_len);
                    }
                    return Some((Frame::Line(0..header_end), prefix.data_start));
                }
                Ok(None) => {}
                Err(DataPrefixError::Incomplete) => return None,
                Err(DataPrefixError::TooLarge) => {
                    error!("Data prefix announces a payload larger than the buffer");
                    self.reset();
                    return None;
                }
            }
        }

        let (end, skip) = match find_line_end(&self.buf[..self.len], termination) {
            Some(found) => found,
            None => {
                if self.is_full() {
                    error!(
                        "Read buffer full without a line end, dropping {:?}",
                        LossyStr(&self.buf[..self.len])
                    );
                    self.reset();
                }
                return None;
            }
        };

        Some((Frame::Line(0..end), end + skip))
    }

    fn skip_line_ends(&mut self, termination: LineTermination) {
        let skip = match termination {
            LineTermination::Any => self.buf[..self.len]
                .iter()
                .take_while(|&&b| matches!(b, b'\r' | b'\n' | b'\0'))
                .count(),
            LineTermination::CrLf => {
                let pairs = self.buf[..self.len]
                    .chunks_exact(2)
                    .take_while(|c| *c == b"\r\n")
                    .count();
                pairs * 2
            }
        };
        if skip > 0 {
            self.consume(skip);
        }
    }
}

/// Position of the first line end, and the length of the terminator.
fn find_line_end(buf: &[u8], termination: LineTermination) -> Option<(usize, usize)> {
    match termination {
        LineTermination::Any => buf
            .iter()
            .position(|&b| matches!(b, b'\r' | b'\n' | b'\0'))
            .map(|i| (i, 1)),
        LineTermination::CrLf => buf.windows(2).position(|w| w == b"\r\n").map(|i| (i, 2)),
    }
}

fn trim_line_end(header: &[u8]) -> usize {
    header
        .iter()
        .rposition(|&b| !matches!(b, b'\r' | b'\n' | b'\0'))
        .map(|i| i + 1)
        .unwrap_or(0)
}
