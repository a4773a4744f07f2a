//! Byte transport between the engine and the modem.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{with_timeout, Duration, Instant};
use embedded_io_async::{Read, Write};

use crate::error::CommError;

/// Transport the engine talks to the modem through.
///
/// Sending happens from the caller of a request while receiving happens in
/// the runner, so every method takes `&self`.
#[allow(async_fn_in_trait)]
pub trait CommInterface {
    async fn open(&self) -> Result<(), CommError>;

    /// Send `data`, giving up after `timeout`. Returns the number of bytes
    /// actually sent, which may be short if the timeout expired midway.
    async fn send(&self, data: &[u8], timeout: Duration) -> Result<usize, CommError>;

    /// Receive whatever is available into `buf`, waiting up to `timeout`
    /// for the first byte. Expiry is reported as [`CommError::Timeout`].
    async fn recv(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, CommError>;

    async fn close(&self) -> Result<(), CommError>;
}

/// [`CommInterface`] over a split async serial port.
pub struct IoComm<R, W> {
    reader: Mutex<NoopRawMutex, R>,
    writer: Mutex<NoopRawMutex, W>,
    open: Cell<bool>,
}

impl<R: Read, W: Write> IoComm<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            open: Cell::new(false),
        }
    }

    fn check_open(&self) -> Result<(), CommError> {
        if self.open.get() {
            Ok(())
        } else {
            Err(CommError::Failure)
        }
    }
}

impl<R: Read, W: Write> CommInterface for IoComm<R, W> {
    async fn open(&self) -> Result<(), CommError> {
        if self.open.replace(true) {
            warn!("Comm interface already open");
        }
        Ok(())
    }

    async fn send(&self, data: &[u8], timeout: Duration) -> Result<usize, CommError> {
        self.check_open()?;
        if data.is_empty() {
            return Err(CommError::BadParameter);
        }

        let mut writer = self.writer.lock().await;
        let deadline = Instant::now() + timeout;
        let mut sent = 0;

        while sent < data.len() {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            match with_timeout(remaining, writer.write(&data[sent..])).await {
                Ok(Ok(0)) => return Err(CommError::Failure),
                Ok(Ok(n)) => sent += n,
                Ok(Err(_)) => return Err(CommError::DriverError),
                Err(_) => break,
            }
        }

        if sent == 0 {
            return Err(CommError::Timeout);
        }

        let remaining = deadline
            .checked_duration_since(Instant::now())
            .unwrap_or(Duration::from_ticks(0));
        match with_timeout(remaining, writer.flush()).await {
            Ok(Err(_)) => Err(CommError::DriverError),
            _ => Ok(sent),
        }
    }

    async fn recv(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, CommError> {
        self.check_open()?;
        if buf.is_empty() {
            return Err(CommError::NoMemory);
        }

        let mut reader = self.reader.lock().await;
        match with_timeout(timeout, reader.read(buf)).await {
            Ok(Ok(0)) => Err(CommError::Failure),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(_)) => Err(CommError::DriverError),
            Err(_) => Err(CommError::Timeout),
        }
    }

    async fn close(&self) -> Result<(), CommError> {
        if !self.open.replace(false) {
            return Err(CommError::Failure);
        }
        Ok(())
    }
}
