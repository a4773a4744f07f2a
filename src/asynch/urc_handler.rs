//! Routing of unsolicited lines to the token table parsers and on to the
//! registered handlers.

use embedded_nal::IpAddr;

use super::state::State;
use crate::at;
use crate::error::AtError;
use crate::registration::RegType;
use crate::socket::{SocketEvent, SocketHandle};
use crate::token_table::TokenTable;
use crate::types::{ServiceStatus, SignalInfo};
use crate::urc::{ModemEvent, UrcEvent};

/// What a URC parser may act on.
///
/// Handlers are invoked after every internal lock has been released, so
/// they may query the engine state.
pub struct UrcContext<'s, 'a> {
    state: &'s State<'a>,
}

impl<'s, 'a> UrcContext<'s, 'a> {
    pub(crate) fn new(state: &'s State<'a>) -> Self {
        Self { state }
    }

    /// Apply a `+CREG`/`+CGREG`/`+CEREG` URC payload, raising a
    /// registration event if the status changed.
    pub fn update_registration(&self, reg_type: RegType, payload: &str) -> Result<(), AtError> {
        self.apply_registration(reg_type, payload, true)
    }

    pub(crate) fn apply_registration(
        &self,
        reg_type: RegType,
        payload: &str,
        is_urc: bool,
    ) -> Result<(), AtError> {
        let (event, status, handler) = self.state.with_shared(|s| {
            let event = s.registration.update(reg_type, payload, is_urc);
            (
                event,
                s.registration.service_status(),
                s.handlers.network_registration,
            )
        });

        if let (Some(event), Some(handler)) = (event?, handler) {
            handler.on_registration(event, &status);
        }
        Ok(())
    }

    /// Registration state as last reported.
    pub fn service_status(&self) -> ServiceStatus {
        self.state
            .with_shared(|s| s.registration.service_status())
    }

    pub fn modem_event(&self, event: ModemEvent) {
        info!("Modem event {:?}", event);
        if event == ModemEvent::BootupOrReboot {
            self.state.with_shared(|s| s.registration.reset());
        }
        if let Some(handler) = self.state.handlers().modem_event {
            handler.on_modem_event(event);
        }
    }

    pub fn signal_changed(&self, info: SignalInfo) {
        let handler = self.state.with_shared(|s| {
            s.signal = info;
            s.handlers.signal
        });
        if let Some(handler) = handler {
            handler.on_signal_changed(UrcEvent::SignalChanged, &info);
        }
    }

    pub fn pdn_activated(&self, context_id: u8, ip_address: Option<IpAddr>) -> Result<(), AtError> {
        let changed = self
            .state
            .pdn
            .set_active(context_id, ip_address)
            .map_err(|_| AtError::BadParameter)?;
        if changed {
            self.pdn_event(UrcEvent::PdnActivated, context_id);
        }
        Ok(())
    }

    pub fn pdn_deactivated(&self, context_id: u8) -> Result<(), AtError> {
        let changed = self
            .state
            .pdn
            .set_inactive(context_id)
            .map_err(|_| AtError::BadParameter)?;
        if changed {
            self.pdn_event(UrcEvent::PdnDeactivated, context_id);
        }
        Ok(())
    }

    fn pdn_event(&self, event: UrcEvent, context_id: u8) {
        info!("PDN {} {:?}", context_id, event);
        if let Some(handler) = self.state.handlers().pdn_event {
            handler.on_pdn_event(event, context_id);
        }
    }

    /// Drive the state of a socket from a URC. Events the socket is not in
    /// a state to accept are reported as errors.
    pub fn socket_event(&self, socket: SocketHandle, event: SocketEvent) -> Result<(), AtError> {
        self.state.sockets.transition(socket, event).map_err(|e| {
            warn!("Socket {} rejected {:?}: {:?}", socket.0, event, e);
            AtError::Error
        })
    }

    /// Hand `line` to the generic handler, or log it if none is set.
    pub fn generic(&self, line: &str) {
        match self.state.handlers().generic {
            Some(handler) => handler.on_urc(UrcEvent::Other, line),
            None => debug!("Unhandled URC: {}", line),
        }
    }
}

/// Split `line` into its URC token and the payload handed to the parser.
///
/// For prefixed lines the token sits between the optional `+` and the `:`,
/// and the payload follows the `:`. Other lines are their own token and
/// payload.
fn urc_token(line: &str) -> (&str, &str) {
    if at::is_prefix_present(line).unwrap_or(false) {
        if let Some((head, payload)) = line.split_once(':') {
            return (head.trim_start_matches('+'), payload);
        }
    }
    let line = line.trim();
    (line, line)
}

pub(crate) fn dispatch(state: &State<'_>, table: &TokenTable, line: &str) {
    let ctx = UrcContext::new(state);
    let (token, payload) = urc_token(line);

    let Some(entry) = table.find_urc_handler(token) else {
        ctx.generic(line);
        return;
    };

    let result = match entry.parser {
        Some(parser) => parser(&ctx, payload),
        None => Err(AtError::Unsupported),
    };

    if let Err(e) = result {
        warn!("Failed to process URC {}: {:?}", line, e);
        ctx.generic(line);
    }
}

/// The 3GPP URCs every modem emits. Adapters list these in their tables.
pub mod common {
    use super::UrcContext;
    use crate::error::AtError;
    use crate::registration::RegType;
    use crate::urc::ModemEvent;

    pub fn creg(ctx: &UrcContext<'_, '_>, payload: &str) -> Result<(), AtError> {
        ctx.update_registration(RegType::Creg, payload)
    }

    pub fn cgreg(ctx: &UrcContext<'_, '_>, payload: &str) -> Result<(), AtError> {
        ctx.update_registration(RegType::Cgreg, payload)
    }

    pub fn cereg(ctx: &UrcContext<'_, '_>, payload: &str) -> Result<(), AtError> {
        ctx.update_registration(RegType::Cereg, payload)
    }

    pub fn ready(ctx: &UrcContext<'_, '_>, _: &str) -> Result<(), AtError> {
        ctx.modem_event(ModemEvent::BootupOrReboot);
        Ok(())
    }

    pub fn normal_power_down(ctx: &UrcContext<'_, '_>, _: &str) -> Result<(), AtError> {
        ctx.modem_event(ModemEvent::PoweredDown);
        Ok(())
    }

    pub fn psm_power_down(ctx: &UrcContext<'_, '_>, _: &str) -> Result<(), AtError> {
        ctx.modem_event(ModemEvent::PsmEnter);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use core::cell::{Cell, RefCell};

    use super::*;
    use crate::token_table::UrcHandlerEntry;
    use crate::types::RegistrationStatus;

    const HANDLERS: &[UrcHandlerEntry] = &[
        UrcHandlerEntry::new("CEREG", common::cereg),
        UrcHandlerEntry::new("CREG", common::creg),
        UrcHandlerEntry {
            token: "NOPARSER",
            parser: None,
        },
        UrcHandlerEntry::new("RDY", common::ready),
    ];

    const TABLE: TokenTable = TokenTable {
        urc_handlers: HANDLERS,
        error_tokens: &["ERROR"],
        success_tokens: &["OK"],
        extra_success_tokens: &[],
        urc_tokens_without_prefix: &["RDY"],
    };

    #[test]
    fn token_extraction() {
        assert_eq!(urc_token("+CREG: 1"), ("CREG", " 1"));
        assert_eq!(urc_token("QIND: \"csq\",1"), ("QIND", " \"csq\",1"));
        assert_eq!(urc_token("RDY"), ("RDY", "RDY"));
        assert_eq!(urc_token("NORMAL POWER DOWN"), ("NORMAL POWER DOWN", "NORMAL POWER DOWN"));
    }

    #[test]
    fn registration_urc_raises_event_once() {
        let events = RefCell::new(std::vec::Vec::new());
        let on_reg = |event: UrcEvent, status: &ServiceStatus| {
            events
                .borrow_mut()
                .push((event, status.cs_registration_status));
        };

        let state = State::new();
        state.with_shared(|s| s.handlers.network_registration = Some(&on_reg));

        dispatch(&state, &TABLE, "+CREG: 1");
        dispatch(&state, &TABLE, "+CREG: 1");

        assert_eq!(
            *events.borrow(),
            [(UrcEvent::NetworkCsRegistration, RegistrationStatus::RegisteredHome)]
        );
    }

    #[test]
    fn malformed_registration_urc_does_not_swallow_event() {
        let events = RefCell::new(std::vec::Vec::new());
        let on_reg = |event: UrcEvent, status: &ServiceStatus| {
            events
                .borrow_mut()
                .push((event, status.cs_registration_status));
        };

        let state = State::new();
        state.with_shared(|s| s.handlers.network_registration = Some(&on_reg));

        dispatch(&state, &TABLE, "+CREG: 1,\"ZZZZ\"");
        assert_eq!(
            state.with_shared(|s| s.registration.service_status().cs_registration_status),
            RegistrationStatus::Searching
        );
        assert!(events.borrow().is_empty());

        dispatch(&state, &TABLE, "+CREG: 1");
        assert_eq!(
            *events.borrow(),
            [(UrcEvent::NetworkCsRegistration, RegistrationStatus::RegisteredHome)]
        );
    }

    #[test]
    fn unmatched_and_failed_urcs_reach_generic_handler() {
        let lines = RefCell::new(std::vec::Vec::<std::string::String>::new());
        let on_urc = |event: UrcEvent, line: &str| {
            assert_eq!(event, UrcEvent::Other);
            lines.borrow_mut().push(line.into());
        };

        let state = State::new();
        state.with_shared(|s| s.handlers.generic = Some(&on_urc));

        dispatch(&state, &TABLE, "+CSQ: 10,99");
        dispatch(&state, &TABLE, "+CREG: garbage");
        dispatch(&state, &TABLE, "NOPARSER");

        assert_eq!(*lines.borrow(), ["+CSQ: 10,99", "+CREG: garbage", "NOPARSER"]);
    }

    #[test]
    fn modem_events() {
        let booted = Cell::new(false);
        let on_event = |event: ModemEvent| booted.set(event == ModemEvent::BootupOrReboot);

        let state = State::new();
        state.with_shared(|s| s.handlers.modem_event = Some(&on_event));

        dispatch(&state, &TABLE, "RDY");
        assert!(booted.get());
    }
}
