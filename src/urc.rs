//! Unsolicited result code events and the handler capabilities they are
//! delivered to.

use crate::socket::SocketHandle;
use crate::types::{ServiceStatus, SignalInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UrcEvent {
    /// Circuit switched registration changed (`+CREG`).
    NetworkCsRegistration,
    /// Packet switched registration changed (`+CGREG`, `+CEREG`).
    NetworkPsRegistration,
    PdnActivated,
    PdnDeactivated,
    SignalChanged,
    SocketOpened,
    SocketOpenFailed,
    /// A line without a parser, or one its parser rejected.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemEvent {
    BootupOrReboot,
    PoweredDown,
    PsmEnter,
}

pub trait NetworkRegistrationHandler {
    fn on_registration(&self, event: UrcEvent, status: &ServiceStatus);
}

impl<F: Fn(UrcEvent, &ServiceStatus)> NetworkRegistrationHandler for F {
    fn on_registration(&self, event: UrcEvent, status: &ServiceStatus) {
        self(event, status)
    }
}

pub trait PdnEventHandler {
    fn on_pdn_event(&self, event: UrcEvent, context_id: u8);
}

impl<F: Fn(UrcEvent, u8)> PdnEventHandler for F {
    fn on_pdn_event(&self, event: UrcEvent, context_id: u8) {
        self(event, context_id)
    }
}

/// Receives [`UrcEvent::SignalChanged`] with the new signal.
pub trait SignalHandler {
    fn on_signal_changed(&self, event: UrcEvent, info: &SignalInfo);
}

impl<F: Fn(UrcEvent, &SignalInfo)> SignalHandler for F {
    fn on_signal_changed(&self, event: UrcEvent, info: &SignalInfo) {
        self(event, info)
    }
}

pub trait ModemEventHandler {
    fn on_modem_event(&self, event: ModemEvent);
}

impl<F: Fn(ModemEvent)> ModemEventHandler for F {
    fn on_modem_event(&self, event: ModemEvent) {
        self(event)
    }
}

/// Receives every unsolicited line without a matching table entry, as
/// [`UrcEvent::Other`].
pub trait GenericUrcHandler {
    fn on_urc(&self, event: UrcEvent, line: &str);
}

impl<F: Fn(UrcEvent, &str)> GenericUrcHandler for F {
    fn on_urc(&self, event: UrcEvent, line: &str) {
        self(event, line)
    }
}

/// Notified when the modem has data buffered for a connected socket.
pub trait SocketDataReady {
    fn on_data_ready(&self, socket: SocketHandle);
}

impl<F: Fn(SocketHandle)> SocketDataReady for F {
    fn on_data_ready(&self, socket: SocketHandle) {
        self(socket)
    }
}

/// Notified once an open request settles, with either
/// [`UrcEvent::SocketOpened`] or [`UrcEvent::SocketOpenFailed`].
pub trait SocketOpened {
    fn on_socket_opened(&self, event: UrcEvent, socket: SocketHandle);
}

impl<F: Fn(UrcEvent, SocketHandle)> SocketOpened for F {
    fn on_socket_opened(&self, event: UrcEvent, socket: SocketHandle) {
        self(event, socket)
    }
}

pub trait SocketClosed {
    fn on_socket_closed(&self, socket: SocketHandle);
}

impl<F: Fn(SocketHandle)> SocketClosed for F {
    fn on_socket_closed(&self, socket: SocketHandle) {
        self(socket)
    }
}

/// Registered URC callbacks, one slot per capability.
#[derive(Clone, Copy, Default)]
pub(crate) struct UrcHandlers<'a> {
    pub network_registration: Option<&'a dyn NetworkRegistrationHandler>,
    pub pdn_event: Option<&'a dyn PdnEventHandler>,
    pub signal: Option<&'a dyn SignalHandler>,
    pub modem_event: Option<&'a dyn ModemEventHandler>,
    pub generic: Option<&'a dyn GenericUrcHandler>,
}
