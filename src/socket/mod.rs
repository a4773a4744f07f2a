mod set;

use core::fmt;

use embassy_time::Duration;
use embedded_nal::SocketAddr;
use serde::{Deserialize, Serialize};

use crate::config::{COMM_IF_RECV_TIMEOUT_MS, COMM_IF_SEND_TIMEOUT_MS};
use crate::error::Error;
use crate::urc::{SocketClosed, SocketDataReady, SocketOpened, UrcEvent};

pub use self::set::SocketSet;

/// A handle, identifying a socket in a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SocketHandle(pub u8);

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a socket context.
///
/// ```text
/// Created -> Opening -> Connected  -> Closing -> Closed
///                    \-> OpenFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketState {
    Created,
    Opening,
    Connected,
    OpenFailed,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketDomain {
    Inet,
    Inet6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketType {
    Stream,
    Dgram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketProtocol {
    Tcp,
    Udp,
}

/// How received data reaches the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccessMode {
    /// The modem buffers data and announces it with a URC.
    #[default]
    Buffer,
    /// The modem pushes data inside the URC.
    DirectPush,
    Transparent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketOption {
    SendTimeout(Duration),
    RecvTimeout(Duration),
    /// Only while [`SocketState::Created`].
    PdnContextId(u8),
    /// Only while [`SocketState::Created`].
    LocalPort(u16),
}

/// Copy of a socket context without its callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketInfo {
    pub handle: SocketHandle,
    pub context_id: u8,
    pub state: SocketState,
    pub domain: SocketDomain,
    pub socket_type: SocketType,
    pub protocol: SocketProtocol,
    pub access_mode: AccessMode,
    pub local_port: u16,
    pub remote: Option<SocketAddr>,
    pub send_timeout: Duration,
    pub recv_timeout: Duration,
}

impl SocketInfo {
    pub(crate) fn new(
        handle: SocketHandle,
        context_id: u8,
        domain: SocketDomain,
        socket_type: SocketType,
        protocol: SocketProtocol,
    ) -> Self {
        Self {
            handle,
            context_id,
            state: SocketState::Created,
            domain,
            socket_type,
            protocol,
            access_mode: AccessMode::Buffer,
            local_port: 0,
            remote: None,
            send_timeout: Duration::from_millis(COMM_IF_SEND_TIMEOUT_MS),
            recv_timeout: Duration::from_millis(COMM_IF_RECV_TIMEOUT_MS),
        }
    }
}

/// Events driving [`SocketState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketEvent {
    /// An open request was sent to the modem.
    Open,
    /// The modem confirmed the open.
    Opened,
    /// The modem refused the open.
    OpenFailed,
    /// The modem has data for the socket.
    DataReady,
    /// A close request was sent to the modem.
    Close,
    /// The modem confirmed the close.
    Closed,
    /// The modem closed the socket on its own.
    RemoteClosed,
    /// The link to the modem broke.
    LinkFailed,
}

/// Callback due after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notify {
    Opened(UrcEvent),
    DataReady,
    Closed,
}

pub(crate) struct SocketContext<'a> {
    pub info: SocketInfo,
    pub data_ready: Option<&'a dyn SocketDataReady>,
    pub opened: Option<&'a dyn SocketOpened>,
    pub closed: Option<&'a dyn SocketClosed>,
}

impl<'a> SocketContext<'a> {
    pub fn new(info: SocketInfo) -> Self {
        Self {
            info,
            data_ready: None,
            opened: None,
            closed: None,
        }
    }

    pub fn set_option(&mut self, option: SocketOption) -> Result<(), Error> {
        match option {
            SocketOption::SendTimeout(t) => self.info.send_timeout = t,
            SocketOption::RecvTimeout(t) => self.info.recv_timeout = t,
            SocketOption::PdnContextId(_) | SocketOption::LocalPort(_)
                if self.info.state != SocketState::Created =>
            {
                return Err(Error::NotAllowed);
            }
            SocketOption::PdnContextId(id) => {
                crate::pdn::check_context_id(id)?;
                self.info.context_id = id;
            }
            SocketOption::LocalPort(port) => self.info.local_port = port,
        }
        Ok(())
    }

    /// Apply `event` and return the callback it triggers, if any.
    ///
    /// Repeating the event that led to the current state is accepted
    /// without a callback, so each callback fires at most once per
    /// transition.
    ///
    /// A close initiated by the modem (`RemoteClosed`, `LinkFailed`) moves a
    /// connected socket straight to `Closed`, skipping `Closing`. The modem
    /// has already released the connection at that point.
    pub fn apply(&mut self, event: SocketEvent) -> Result<Option<Notify>, Error> {
        use SocketEvent as E;
        use SocketState as S;

        let (next, notify) = match (self.info.state, event) {
            (S::Created, E::Open) => (S::Opening, None),

            (S::Opening, E::Opened) => (S::Connected, Some(Notify::Opened(UrcEvent::SocketOpened))),
            (S::Connected, E::Opened) => return Ok(None),

            (S::Opening, E::OpenFailed | E::RemoteClosed | E::LinkFailed) => (
                S::OpenFailed,
                Some(Notify::Opened(UrcEvent::SocketOpenFailed)),
            ),
            (S::OpenFailed, E::OpenFailed | E::RemoteClosed | E::LinkFailed) => return Ok(None),

            (S::Connected, E::DataReady) => (S::Connected, Some(Notify::DataReady)),
            (S::Closed, E::DataReady) => return Err(Error::SocketClosed),
            (_, E::DataReady) => return Err(Error::SocketNotConnected),

            (S::Opening | S::Connected, E::Close) => (S::Closing, None),
            (S::Created | S::OpenFailed, E::Close) => (S::Closed, None),
            (S::Closing, E::Close) => return Ok(None),

            (S::Closing, E::Closed)
            | (S::Connected | S::Closing, E::RemoteClosed | E::LinkFailed) => {
                (S::Closed, Some(Notify::Closed))
            }
            (S::Closed, E::Closed | E::RemoteClosed | E::LinkFailed) => return Ok(None),
            (S::Created, E::LinkFailed) => return Ok(None),

            (state, event) => {
                warn!(
                    "Socket {}: {:?} not allowed in state {:?}",
                    self.info.handle.0, event, state
                );
                return Err(Error::NotAllowed);
            }
        };

        if next != self.info.state {
            debug!(
                "Socket {}: {:?} -> {:?}",
                self.info.handle.0, self.info.state, next
            );
        }
        self.info.state = next;
        Ok(notify)
    }
}
