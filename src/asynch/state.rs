use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Context, Poll};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embassy_sync::signal::Signal;
use embassy_sync::waitqueue::WakerRegistration;
use heapless::String;

use crate::config::MAX_PREFIX_STRING_LENGTH;
use crate::error::Error;
use crate::pdn::PdnTable;
use crate::pktio::FrameHooks;
use crate::registration::RegistrationState;
use crate::response::{AtCommandType, AtResponse, ResponseStatus};
use crate::socket::SocketSet;
use crate::types::SignalInfo;
use crate::urc::UrcHandlers;

/// Whether the runner owns an open comm interface.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LibraryStatus {
    Closed,
    /// The runner is opening the comm interface.
    Opening,
    Open,
}

/// Description of the command in flight, as the runner needs it to route
/// and frame incoming bytes.
#[derive(Clone)]
pub(crate) struct PendingRequest {
    pub cmd_type: AtCommandType,
    pub prefix: Option<String<MAX_PREFIX_STRING_LENGTH>>,
    pub hooks: FrameHooks,
    /// Extra success tokens valid for this request only.
    pub success_tokens: &'static [&'static str],
}

impl PendingRequest {
    pub const fn none() -> Self {
        Self {
            cmd_type: AtCommandType::NoCommand,
            prefix: None,
            hooks: FrameHooks {
                data_prefix: None,
                data_send_prefix: None,
            },
            success_tokens: &[],
        }
    }
}

pub(crate) struct Shared<'a> {
    status: LibraryStatus,
    pending: PendingRequest,
    pub(crate) handlers: UrcHandlers<'a>,
    pub(crate) registration: RegistrationState,
    pub(crate) signal: SignalInfo,
    status_waker: WakerRegistration,
}

/// Everything the runner and the control handles share.
pub struct State<'a> {
    shared: Mutex<NoopRawMutex, RefCell<Shared<'a>>>,
    response: Mutex<NoopRawMutex, RefCell<AtResponse>>,
    done: Signal<NoopRawMutex, Result<ResponseStatus, Error>>,
    pub(crate) shutdown: Signal<NoopRawMutex, ()>,
    /// Serializes requests; only one command may be in flight.
    pub(crate) request_lock: AsyncMutex<NoopRawMutex, ()>,
    pub(crate) sockets: SocketSet<'a>,
    pub(crate) pdn: PdnTable,
}

impl<'a> Default for State<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> State<'a> {
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared {
                status: LibraryStatus::Closed,
                pending: PendingRequest::none(),
                handlers: UrcHandlers::default(),
                registration: RegistrationState::new(),
                signal: SignalInfo::default(),
                status_waker: WakerRegistration::new(),
            })),
            response: Mutex::new(RefCell::new(AtResponse::new())),
            done: Signal::new(),
            shutdown: Signal::new(),
            request_lock: AsyncMutex::new(()),
            sockets: SocketSet::new(),
            pdn: PdnTable::new(),
        }
    }

    pub(crate) fn with_shared<R>(&self, f: impl FnOnce(&mut Shared<'a>) -> R) -> R {
        self.shared.lock(|s| f(&mut s.borrow_mut()))
    }

    pub(crate) fn handlers(&self) -> UrcHandlers<'a> {
        self.with_shared(|s| s.handlers)
    }

    pub fn library_status(&self, cx: Option<&mut Context>) -> LibraryStatus {
        self.with_shared(|s| {
            if let Some(cx) = cx {
                s.status_waker.register(cx.waker());
            }
            s.status
        })
    }

    pub(crate) fn check_open(&self) -> Result<(), Error> {
        match self.library_status(None) {
            LibraryStatus::Open => Ok(()),
            LibraryStatus::Closed | LibraryStatus::Opening => Err(Error::LibraryNotOpen),
        }
    }

    pub(crate) fn set_library_status(&self, status: LibraryStatus) -> Result<(), Error> {
        self.with_shared(|s| {
            let refused = match status {
                LibraryStatus::Opening => s.status != LibraryStatus::Closed,
                LibraryStatus::Open => s.status == LibraryStatus::Open,
                LibraryStatus::Closed => false,
            };
            if refused {
                return Err(Error::LibraryAlreadyOpen);
            }
            s.status = status;
            s.status_waker.wake();
            Ok(())
        })
    }

    pub async fn wait_for_library_status(&self, status: LibraryStatus) {
        poll_fn(|cx| {
            if self.library_status(Some(cx)) == status {
                return Poll::Ready(());
            }
            Poll::Pending
        })
        .await
    }

    pub(crate) fn pending(&self) -> PendingRequest {
        self.with_shared(|s| s.pending.clone())
    }

    /// Install `pending` as the command in flight and drop whatever the
    /// previous one left behind.
    pub(crate) fn begin_request(&self, pending: PendingRequest) {
        self.response.lock(|r| r.borrow_mut().clear());
        self.done.reset();
        self.with_shared(|s| s.pending = pending);
    }

    /// Forget the command in flight, e.g. after a timeout. Lines that still
    /// arrive for it are no longer solicited.
    pub(crate) fn end_request(&self) {
        self.with_shared(|s| s.pending = PendingRequest::none());
        self.response.lock(|r| r.borrow_mut().clear());
    }

    /// Hand the outcome of the command in flight to the waiting caller.
    pub(crate) fn complete_request(&self, result: Result<ResponseStatus, Error>) {
        let was_pending = self.with_shared(|s| {
            let was_pending = s.pending.cmd_type != AtCommandType::NoCommand;
            s.pending = PendingRequest::none();
            was_pending
        });
        if was_pending {
            self.done.signal(result);
        }
    }

    pub(crate) async fn wait_response(&self) -> Result<ResponseStatus, Error> {
        self.done.wait().await
    }

    pub(crate) fn with_response<R>(&self, f: impl FnOnce(&mut AtResponse) -> R) -> R {
        self.response.lock(|r| f(&mut r.borrow_mut()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn library_opens_once() {
        let state = State::new();
        assert_eq!(state.check_open(), Err(Error::LibraryNotOpen));
        state.set_library_status(LibraryStatus::Opening).unwrap();
        assert_eq!(state.check_open(), Err(Error::LibraryNotOpen));
        assert_eq!(
            state.set_library_status(LibraryStatus::Opening),
            Err(Error::LibraryAlreadyOpen)
        );
        state.set_library_status(LibraryStatus::Open).unwrap();
        assert_eq!(
            state.set_library_status(LibraryStatus::Open),
            Err(Error::LibraryAlreadyOpen)
        );
        assert_eq!(
            state.set_library_status(LibraryStatus::Opening),
            Err(Error::LibraryAlreadyOpen)
        );
        assert_eq!(state.check_open(), Ok(()));
        state.set_library_status(LibraryStatus::Closed).unwrap();
        assert_eq!(state.check_open(), Err(Error::LibraryNotOpen));
    }

    #[test]
    fn completion_without_pending_request_is_dropped() {
        let state = State::new();
        state.complete_request(Ok(ResponseStatus::Success));
        assert!(!state.done.signaled());

        state.begin_request(PendingRequest {
            cmd_type: AtCommandType::NoResult,
            ..PendingRequest::none()
        });
        state.complete_request(Ok(ResponseStatus::Success));
        assert!(state.done.signaled());
        assert_eq!(state.pending().cmd_type, AtCommandType::NoCommand);
    }
}
