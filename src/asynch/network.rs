//! Thin 3GPP queries shared by every modem adapter.

use core::fmt::Write as _;

use embedded_nal::IpAddr;
use heapless::{String, Vec};

use super::control::Control;
use super::urc_handler::UrcContext;
use crate::at;
use crate::comm::CommInterface;
use crate::config::{CellularConfig, AT_MAX_STRING_SIZE, IP_ADDRESS_MAX_SIZE, MAX_PDN_CONTEXTS};
use crate::error::{AtError, Error};
use crate::pdn::check_context_id;
use crate::registration::RegType;
use crate::response::{AtCommandType, AtRequest, AtResponse};
use crate::types::{
    ModemInfo, PdnStatus, ServiceStatus, SignalInfo, SimCardState, SimCardStatus, SimLockState,
};

impl<'a, C: CommInterface, Cfg: CellularConfig> Control<'a, C, Cfg> {
    /// Query `AT+CSQ`. The result is also kept as the last known signal.
    pub async fn signal_quality(&self) -> Result<SignalInfo, Error> {
        let req = AtRequest::with_prefix("AT+CSQ", AtCommandType::WithPrefix, "+CSQ");
        let (rssi, ber) = self
            .send_request_with(req, |resp| parse_csq(resp.payload("+CSQ")?))
            .await?;

        let mut info = SignalInfo::from_csq(rssi, ber);
        self.state.with_shared(|s| {
            info.compute_bars(s.registration.rat);
            s.signal = info;
        });
        Ok(info)
    }

    /// Query the CS, GPRS and EPS registration, updating the same state as
    /// the registration URCs do. Events are raised for status changes.
    ///
    /// A modem rejecting one of the read commands, as GSM only modems do
    /// for `AT+CEREG?`, leaves that domain untouched.
    pub async fn registration_status(&self) -> Result<ServiceStatus, Error> {
        for reg_type in [RegType::Creg, RegType::Cgreg, RegType::Cereg] {
            match self.query_registration(reg_type).await {
                Ok(()) => {}
                Err(Error::ModemError) => {
                    debug!("{} not supported by the modem", reg_type.prefix());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self.service_status())
    }

    async fn query_registration(&self, reg_type: RegType) -> Result<(), Error> {
        let cmd = match reg_type {
            RegType::Creg => "AT+CREG?",
            RegType::Cgreg => "AT+CGREG?",
            RegType::Cereg => "AT+CEREG?",
        };
        let prefix = reg_type.prefix();
        let req = AtRequest::with_prefix(cmd, AtCommandType::WithPrefix, prefix);

        let payload: String<AT_MAX_STRING_SIZE> = self
            .send_request_with(req, |resp| Ok(at::str_dup(resp.payload(prefix)?)?))
            .await?;

        UrcContext::new(self.state).apply_registration(reg_type, &payload, false)?;
        Ok(())
    }

    /// Query `AT+CPIN?`. A modem answering with an error is taken to have
    /// no usable SIM.
    pub async fn sim_card_status(&self) -> Result<SimCardStatus, Error> {
        let req = AtRequest::with_prefix("AT+CPIN?", AtCommandType::WithPrefix, "+CPIN");
        let result = self
            .send_request_with(req, |resp| {
                let code = at::remove_outermost_double_quote(resp.payload("+CPIN")?)?;
                Ok(SimLockState::from_cpin(code.trim()))
            })
            .await;

        match result {
            Ok(lock_state) => Ok(SimCardStatus {
                state: SimCardState::Inserted,
                lock_state,
            }),
            Err(Error::ModemError) => Ok(SimCardStatus {
                state: SimCardState::Removed,
                lock_state: SimLockState::Unknown,
            }),
            Err(e) => Err(e),
        }
    }

    pub async fn modem_info(&self) -> Result<ModemInfo, Error> {
        Ok(ModemInfo {
            manufacturer_id: self.query_line("AT+CGMI").await?,
            model_id: self.query_line("AT+CGMM").await?,
            firmware_version: self.query_line("AT+CGMR").await?,
            imei: self.query_line("AT+CGSN").await?,
        })
    }

    async fn query_line<const N: usize>(&self, cmd: &str) -> Result<String<N>, Error> {
        let req = AtRequest::new(cmd, AtCommandType::WoPrefix);
        self.send_request_with(req, |resp| {
            let line = resp.first_line().ok_or(Error::Unknown)?;
            Ok(at::str_dup(line.trim())?)
        })
        .await
    }

    /// Query `AT+CGACT?` and bring the PDN table in line with it. Returns
    /// the status of every context the modem reported.
    pub async fn pdn_status(&self) -> Result<Vec<PdnStatus, MAX_PDN_CONTEXTS>, Error> {
        let req = AtRequest::with_prefix("AT+CGACT?", AtCommandType::MultiWithPrefix, "+CGACT");
        let reported = self.send_request_with(req, parse_cgact).await?;

        let mut statuses = Vec::new();
        for (context_id, active) in reported {
            if active {
                self.state.pdn.set_active(context_id, None)?;
            } else {
                self.state.pdn.set_inactive(context_id)?;
            }
            statuses
                .push(self.state.pdn.status(context_id)?)
                .map_err(|_| Error::NoMemory)?;
        }
        Ok(statuses)
    }

    /// Query `AT+CGPADDR=<context_id>`. Returns `None` while the context has
    /// no address.
    pub async fn ip_address(&self, context_id: u8) -> Result<Option<IpAddr>, Error> {
        check_context_id(context_id)?;

        let mut cmd: String<16> = String::new();
        write!(cmd, "AT+CGPADDR={}", context_id).map_err(|_| Error::NoMemory)?;
        let req = AtRequest::with_prefix(&cmd, AtCommandType::WithPrefix, "+CGPADDR");

        let address = self.send_request_with(req, parse_cgpaddr).await?;
        if let Some(address) = address {
            self.state.pdn.set_ip_address(context_id, address)?;
        }
        Ok(address)
    }
}

fn parse_csq(payload: &str) -> Result<(u8, u8), Error> {
    let mut rest = payload;
    let rssi = at::strtoi_as(at::get_next_tok(&mut rest)?, 10)?;
    let ber = at::strtoi_as(at::get_next_tok(&mut rest)?, 10)?;
    Ok((rssi, ber))
}

/// `+CGACT: <cid>,<state>` lines.
fn parse_cgact(resp: &AtResponse) -> Result<Vec<(u8, bool), MAX_PDN_CONTEXTS>, Error> {
    let mut reported = Vec::new();
    for line in resp.lines().filter(|l| l.starts_with("+CGACT")) {
        let mut rest = at::remove_prefix(line)?;
        let context_id: u8 = at::strtoi_as(at::get_next_tok(&mut rest)?, 10)?;
        let state: u8 = at::strtoi_as(at::get_next_tok(&mut rest)?, 10)?;
        if check_context_id(context_id).is_err() {
            warn!("Ignoring PDN context {} out of range", context_id);
            continue;
        }
        reported
            .push((context_id, state == 1))
            .map_err(|_| Error::NoMemory)?;
    }
    Ok(reported)
}

/// `+CGPADDR: <cid>[,<address>[,<address>]]`, keeping the first address.
fn parse_cgpaddr(resp: &AtResponse) -> Result<Option<IpAddr>, Error> {
    let mut rest = resp.payload("+CGPADDR")?;
    at::get_next_tok(&mut rest)?;
    if rest.is_empty() {
        return Ok(None);
    }

    let token = at::get_next_tok(&mut rest)?;
    let unquoted: String<IP_ADDRESS_MAX_SIZE> = at::remove_all_double_quote(token.trim())?;
    if unquoted.is_empty() {
        return Ok(None);
    }
    let address: IpAddr = unquoted.parse().map_err(|_| AtError::Error)?;
    if address.is_unspecified() {
        return Ok(None);
    }
    Ok(Some(address))
}
