use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_nal::SocketAddr;

use super::{
    Notify, SocketContext, SocketDomain, SocketEvent, SocketHandle, SocketInfo, SocketProtocol,
    SocketState, SocketType,
};
use crate::config::NUM_SOCKET_MAX;
use crate::error::Error;
use crate::urc::{SocketClosed, SocketDataReady, SocketOpened};

type Slot<'a> = Mutex<NoopRawMutex, RefCell<Option<SocketContext<'a>>>>;

/// Fixed table of socket contexts.
///
/// Every slot is locked on its own, so the runner updating one socket never
/// waits on an application call touching another.
pub struct SocketSet<'a> {
    slots: [Slot<'a>; NUM_SOCKET_MAX],
}

impl<'a> Default for SocketSet<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> SocketSet<'a> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Mutex::new(RefCell::new(None))),
        }
    }

    fn slot(&self, handle: SocketHandle) -> Result<&Slot<'a>, Error> {
        self.slots
            .get(handle.0 as usize)
            .ok_or(Error::InvalidHandle)
    }

    /// Run `f` on the context behind `handle`.
    pub(crate) fn with<R>(
        &self,
        handle: SocketHandle,
        f: impl FnOnce(&mut SocketContext<'a>) -> R,
    ) -> Result<R, Error> {
        self.slot(handle)?.lock(|cell| {
            let mut slot = cell.borrow_mut();
            slot.as_mut().map(f).ok_or(Error::InvalidHandle)
        })
    }

    /// Take the lowest free slot.
    pub fn allocate(
        &self,
        context_id: u8,
        domain: SocketDomain,
        socket_type: SocketType,
        protocol: SocketProtocol,
    ) -> Result<SocketHandle, Error> {
        crate::pdn::check_context_id(context_id)?;
        match (socket_type, protocol) {
            (SocketType::Stream, SocketProtocol::Tcp) | (SocketType::Dgram, SocketProtocol::Udp) => {}
            _ => return Err(Error::BadParameter),
        }

        for (i, slot) in self.slots.iter().enumerate() {
            let handle = SocketHandle(i as u8);
            let taken = slot.lock(|cell| {
                let mut slot = cell.borrow_mut();
                if slot.is_some() {
                    return false;
                }
                *slot = Some(SocketContext::new(SocketInfo::new(
                    handle,
                    context_id,
                    domain,
                    socket_type,
                    protocol,
                )));
                true
            });
            if taken {
                debug!("Allocated socket {}", i);
                return Ok(handle);
            }
        }

        warn!("No free socket slot");
        Err(Error::NoMemory)
    }

    /// Free the slot. Only sockets that never opened, failed to open or are
    /// closed may be removed.
    pub fn remove(&self, handle: SocketHandle) -> Result<(), Error> {
        self.slot(handle)?.lock(|cell| {
            let mut slot = cell.borrow_mut();
            match slot.as_ref().map(|s| s.info.state) {
                None => Err(Error::InvalidHandle),
                Some(SocketState::Created | SocketState::OpenFailed | SocketState::Closed) => {
                    *slot = None;
                    Ok(())
                }
                Some(_) => Err(Error::NotAllowed),
            }
        })
    }

    pub fn info(&self, handle: SocketHandle) -> Result<SocketInfo, Error> {
        self.with(handle, |s| s.info)
    }

    pub fn state(&self, handle: SocketHandle) -> Result<SocketState, Error> {
        self.with(handle, |s| s.info.state)
    }

    /// Record the peer of an open request.
    pub fn set_remote(&self, handle: SocketHandle, remote: SocketAddr) -> Result<(), Error> {
        self.with(handle, |s| s.info.remote = Some(remote))
    }

    pub fn handles(&self) -> impl Iterator<Item = SocketHandle> + '_ + use<'_, 'a> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.lock(|cell| cell.borrow().is_some())
                .then_some(SocketHandle(i as u8))
        })
    }

    pub fn set_data_ready_callback(
        &self,
        handle: SocketHandle,
        callback: Option<&'a dyn SocketDataReady>,
    ) -> Result<(), Error> {
        self.with(handle, |s| s.data_ready = callback)
    }

    pub fn set_opened_callback(
        &self,
        handle: SocketHandle,
        callback: Option<&'a dyn SocketOpened>,
    ) -> Result<(), Error> {
        self.with(handle, |s| s.opened = callback)
    }

    pub fn set_closed_callback(
        &self,
        handle: SocketHandle,
        callback: Option<&'a dyn SocketClosed>,
    ) -> Result<(), Error> {
        self.with(handle, |s| s.closed = callback)
    }

    /// Drive the state machine of `handle`, then invoke the resulting
    /// callback with the slot unlocked.
    pub fn transition(&self, handle: SocketHandle, event: SocketEvent) -> Result<(), Error> {
        let pending = self.with(handle, |s| {
            s.apply(event).map(|notify| {
                notify.map(|n| (n, s.data_ready, s.opened, s.closed))
            })
        })??;

        if let Some((notify, data_ready, opened, closed)) = pending {
            match notify {
                Notify::Opened(ev) => {
                    if let Some(cb) = opened {
                        cb.on_socket_opened(ev, handle);
                    }
                }
                Notify::DataReady => {
                    if let Some(cb) = data_ready {
                        cb.on_data_ready(handle);
                    }
                }
                Notify::Closed => {
                    if let Some(cb) = closed {
                        cb.on_socket_closed(handle);
                    }
                }
            }
        }
        Ok(())
    }

    /// Move every live socket towards failure after the link to the modem
    /// broke.
    pub(crate) fn fail_all(&self) {
        for i in 0..NUM_SOCKET_MAX {
            let handle = SocketHandle(i as u8);
            if let Err(e) = self.transition(handle, SocketEvent::LinkFailed) {
                if e != Error::InvalidHandle {
                    warn!("Socket {}: {:?}", i, e);
                }
            }
        }
    }
}
