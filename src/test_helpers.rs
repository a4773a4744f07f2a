//! Scripted modem used by the engine tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::string::String;
use std::vec::Vec;

use embassy_futures::join::join;
use embassy_futures::{block_on, yield_now};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Timer};

use crate::asynch::control::Control;
use crate::asynch::runner::Runner;
use crate::comm::CommInterface;
use crate::config::CellularConfig;
use crate::error::CommError;

/// Short timeouts so failing paths do not stall the test suite.
pub struct TestConfig;

impl CellularConfig for TestConfig {
    const COMMAND_TIMEOUT: Duration = Duration::from_millis(200);
    const COMM_SEND_TIMEOUT: Duration = Duration::from_millis(50);
    const COMM_RECV_TIMEOUT: Duration = Duration::from_millis(20);
}

enum Reply {
    Output(Vec<u8>),
    Fail(CommError),
}

#[derive(Default)]
struct Inner {
    open: bool,
    sent: Vec<u8>,
    rx: VecDeque<u8>,
    script: VecDeque<(Vec<u8>, Reply)>,
    recv_error: Option<CommError>,
    send_limit: Option<usize>,
    stall_send: bool,
}

/// In-memory [`CommInterface`] that records everything sent and answers
/// scripted requests with canned modem output.
///
/// Script entries are matched in order against the tail of the bytes sent
/// so far.
pub struct MockComm {
    inner: RefCell<Inner>,
    rx_ready: Signal<NoopRawMutex, ()>,
}

impl MockComm {
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(Inner::default()),
            rx_ready: Signal::new(),
        }
    }

    /// Answer with `output` once `request` has been sent.
    pub fn expect(&self, request: &str, output: &str) -> &Self {
        self.push_script(request.as_bytes(), Reply::Output(output.as_bytes().to_vec()))
    }

    /// Fail the next receive once `request` has been sent.
    pub fn fail_after(&self, request: &str, error: CommError) -> &Self {
        self.push_script(request.as_bytes(), Reply::Fail(error))
    }

    fn push_script(&self, request: &[u8], reply: Reply) -> &Self {
        self.inner
            .borrow_mut()
            .script
            .push_back((request.to_vec(), reply));
        self
    }

    /// Make modem output available right away, e.g. a URC.
    pub fn inject(&self, output: &str) {
        self.inner.borrow_mut().rx.extend(output.as_bytes());
        self.rx_ready.signal(());
    }

    /// Accept at most `limit` bytes per send.
    pub fn limit_send(&self, limit: usize) {
        self.inner.borrow_mut().send_limit = Some(limit);
    }

    /// Never complete a send, as a wedged UART would. Sends fail with
    /// [`CommError::Timeout`] once their timeout expires.
    pub fn stall_send(&self) {
        self.inner.borrow_mut().stall_send = true;
    }

    pub fn sent(&self) -> String {
        String::from_utf8_lossy(&self.inner.borrow().sent).into_owned()
    }

    pub fn is_open(&self) -> bool {
        self.inner.borrow().open
    }

    pub fn script_done(&self) -> bool {
        self.inner.borrow().script.is_empty()
    }
}

impl CommInterface for MockComm {
    async fn open(&self) -> Result<(), CommError> {
        // Opening a real port takes a while.
        yield_now().await;
        self.inner.borrow_mut().open = true;
        Ok(())
    }

    async fn send(&self, data: &[u8], timeout: Duration) -> Result<usize, CommError> {
        if self.inner.borrow().stall_send {
            Timer::after(timeout).await;
            return Err(CommError::Timeout);
        }

        let mut inner = self.inner.borrow_mut();
        if !inner.open {
            return Err(CommError::Failure);
        }

        let n = inner.send_limit.unwrap_or(usize::MAX).min(data.len());
        inner.sent.extend_from_slice(&data[..n]);

        let matched = match inner.script.front() {
            Some((request, _)) => inner.sent.ends_with(request),
            None => false,
        };
        if matched {
            if let Some((_, reply)) = inner.script.pop_front() {
                match reply {
                    Reply::Output(output) => inner.rx.extend(output),
                    Reply::Fail(e) => inner.recv_error = Some(e),
                }
                self.rx_ready.signal(());
            }
        }

        Ok(n)
    }

    async fn recv(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, CommError> {
        loop {
            {
                let mut inner = self.inner.borrow_mut();
                if !inner.open {
                    return Err(CommError::Failure);
                }
                if let Some(e) = inner.recv_error.take() {
                    return Err(e);
                }
                if !inner.rx.is_empty() {
                    let n = buf.len().min(inner.rx.len());
                    for (dst, src) in buf.iter_mut().zip(inner.rx.drain(..n)) {
                        *dst = src;
                    }
                    return Ok(n);
                }
            }

            if with_timeout(timeout, self.rx_ready.wait()).await.is_err() {
                return Err(CommError::Timeout);
            }
        }
    }

    async fn close(&self) -> Result<(), CommError> {
        self.inner.borrow_mut().open = false;
        Ok(())
    }
}

/// Drive `runner` while `test` runs against the opened engine, then close
/// it and check that the runner stopped cleanly.
pub fn run_engine<'a, C, Cfg, F>(control: &Control<'a, C, Cfg>, runner: &mut Runner<'a, C, Cfg>, test: F)
where
    C: CommInterface,
    Cfg: CellularConfig,
    F: core::future::Future<Output = ()>,
{
    block_on(async {
        let test = async {
            control.wait_open().await;
            test.await;
            control.close().await.unwrap();
        };
        let (result, ()) = join(runner.run(), test).await;
        result.unwrap();
    });
}
