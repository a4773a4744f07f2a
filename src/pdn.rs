//! Activation state of the packet data network contexts.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_nal::IpAddr;
use heapless::Vec;

use crate::config::{MAX_PDN_CONTEXTS, MAX_PDN_CONTEXT_ID, MIN_PDN_CONTEXT_ID};
use crate::error::Error;
use crate::types::{PdnContextType, PdnStatus};

pub(crate) fn check_context_id(context_id: u8) -> Result<(), Error> {
    if (MIN_PDN_CONTEXT_ID..=MAX_PDN_CONTEXT_ID).contains(&context_id) {
        Ok(())
    } else {
        Err(Error::BadParameter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PdnState {
    #[default]
    Inactive,
    /// Activation requested, waiting for the modem.
    Activating,
    Active,
    /// Deactivation requested, waiting for the modem.
    Deactivating,
}

#[derive(Debug, Clone, Copy, Default)]
struct PdnEntry {
    state: PdnState,
    context_type: PdnContextType,
    ip_address: Option<IpAddr>,
}

pub struct PdnTable {
    entries: Mutex<NoopRawMutex, RefCell<[PdnEntry; MAX_PDN_CONTEXTS]>>,
}

impl Default for PdnTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PdnTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(RefCell::new([PdnEntry::default(); MAX_PDN_CONTEXTS])),
        }
    }

    fn with<R>(&self, context_id: u8, f: impl FnOnce(&mut PdnEntry) -> R) -> Result<R, Error> {
        check_context_id(context_id)?;
        let index = (context_id - MIN_PDN_CONTEXT_ID) as usize;
        Ok(self
            .entries
            .lock(|entries| f(&mut entries.borrow_mut()[index])))
    }

    pub fn state(&self, context_id: u8) -> Result<PdnState, Error> {
        self.with(context_id, |e| e.state)
    }

    pub fn status(&self, context_id: u8) -> Result<PdnStatus, Error> {
        self.with(context_id, |e| PdnStatus {
            context_id,
            active: e.state == PdnState::Active,
            context_type: e.context_type,
            ip_address: e.ip_address,
        })
    }

    /// Mark `context_id` as activating. Only an inactive context may be
    /// activated.
    pub fn begin_activate(&self, context_id: u8, context_type: PdnContextType) -> Result<(), Error> {
        self.with(context_id, |e| match e.state {
            PdnState::Inactive => {
                e.state = PdnState::Activating;
                e.context_type = context_type;
                Ok(())
            }
            _ => Err(Error::NotAllowed),
        })?
    }

    pub fn begin_deactivate(&self, context_id: u8) -> Result<(), Error> {
        self.with(context_id, |e| match e.state {
            PdnState::Active => {
                e.state = PdnState::Deactivating;
                Ok(())
            }
            _ => Err(Error::NotAllowed),
        })?
    }

    /// Drop the pending marker after a request that did not go through.
    pub fn abort(&self, context_id: u8) -> Result<(), Error> {
        self.with(context_id, |e| match e.state {
            PdnState::Activating => e.state = PdnState::Inactive,
            PdnState::Deactivating => e.state = PdnState::Active,
            _ => {}
        })
    }

    /// Returns `true` if the context was not active before.
    pub fn set_active(&self, context_id: u8, ip_address: Option<IpAddr>) -> Result<bool, Error> {
        self.with(context_id, |e| {
            let changed = e.state != PdnState::Active;
            e.state = PdnState::Active;
            if ip_address.is_some() {
                e.ip_address = ip_address;
            }
            changed
        })
    }

    /// Returns `true` if the context was not inactive before.
    pub fn set_inactive(&self, context_id: u8) -> Result<bool, Error> {
        self.with(context_id, |e| {
            let changed = e.state != PdnState::Inactive;
            e.state = PdnState::Inactive;
            e.ip_address = None;
            changed
        })
    }

    pub fn set_ip_address(&self, context_id: u8, ip_address: IpAddr) -> Result<(), Error> {
        self.with(context_id, |e| e.ip_address = Some(ip_address))
    }

    /// Deactivate everything, returning the ids that were not inactive.
    pub fn deactivate_all(&self) -> Vec<u8, MAX_PDN_CONTEXTS> {
        self.entries.lock(|entries| {
            let mut changed = Vec::new();
            for (i, e) in entries.borrow_mut().iter_mut().enumerate() {
                if e.state != PdnState::Inactive {
                    *e = PdnEntry::default();
                    // Capacity equals the table size.
                    let _ = changed.push(i as u8 + MIN_PDN_CONTEXT_ID);
                }
            }
            changed
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use embedded_nal::Ipv4Addr;

    #[test]
    fn context_id_range() {
        let table = PdnTable::new();
        assert_eq!(table.state(0), Err(Error::BadParameter));
        assert_eq!(table.state(17), Err(Error::BadParameter));
        assert_eq!(table.state(16), Ok(PdnState::Inactive));
    }

    #[test]
    fn activation_cycle() {
        let table = PdnTable::new();
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

        table.begin_activate(1, PdnContextType::Ipv4).unwrap();
        assert_eq!(table.begin_activate(1, PdnContextType::Ipv4), Err(Error::NotAllowed));
        assert_eq!(table.state(1), Ok(PdnState::Activating));

        assert_eq!(table.set_active(1, Some(ip)), Ok(true));
        assert_eq!(table.set_active(1, None), Ok(false));
        let status = table.status(1).unwrap();
        assert!(status.active);
        assert_eq!(status.ip_address, Some(ip));

        table.begin_deactivate(1).unwrap();
        table.abort(1).unwrap();
        assert_eq!(table.state(1), Ok(PdnState::Active));

        assert_eq!(table.set_inactive(1), Ok(true));
        assert_eq!(table.set_inactive(1), Ok(false));
        assert_eq!(table.status(1).unwrap().ip_address, None);
    }

    #[test]
    fn deactivate_all_reports_changed() {
        let table = PdnTable::new();
        table.set_active(2, None).unwrap();
        table.begin_activate(5, PdnContextType::Ipv6).unwrap();
        assert_eq!(table.deactivate_all().as_slice(), &[2, 5]);
        assert!(table.deactivate_all().is_empty());
    }
}
