//! Network registration state, updated by `+CREG`, `+CGREG` and `+CEREG`
//! URCs and by the responses to their read commands.

use heapless::String;

use crate::at;
use crate::config::AT_MAX_STRING_SIZE;
use crate::error::AtError;
use crate::hex::parse_hex_u32;
use crate::types::{Rat, RegistrationStatus, ServiceStatus};
use crate::urc::UrcEvent;

const INVALID_LAC: u16 = 0xFFFF;
const INVALID_CELL_ID: u32 = 0xFFFF_FFFF;
const INVALID_RAC: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegType {
    /// Circuit switched, `+CREG`.
    Creg,
    /// GPRS, `+CGREG`.
    Cgreg,
    /// EPS, `+CEREG`.
    Cereg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Mode,
    Stat,
    LacTac,
    CellId,
    Rat,
    Rac,
    RejectType,
    RejectCause,
}

impl RegType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Creg => "+CREG",
            Self::Cgreg => "+CGREG",
            Self::Cereg => "+CEREG",
        }
    }

    pub fn event(&self) -> UrcEvent {
        match self {
            Self::Creg => UrcEvent::NetworkCsRegistration,
            Self::Cgreg | Self::Cereg => UrcEvent::NetworkPsRegistration,
        }
    }

    /// Field order of the read command response. URCs omit the leading
    /// `<n>`. Trailing fields beyond these (PSM timers) are ignored.
    fn fields(&self) -> &'static [Field] {
        use Field::*;
        match self {
            Self::Creg | Self::Cereg => &[Mode, Stat, LacTac, CellId, Rat, RejectType, RejectCause],
            Self::Cgreg => &[Mode, Stat, LacTac, CellId, Rat, Rac, RejectType, RejectCause],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationState {
    pub(crate) cs_status: RegistrationStatus,
    pub(crate) ps_status: RegistrationStatus,
    pub(crate) lac: u16,
    pub(crate) tac: u16,
    pub(crate) cell_id: u32,
    pub(crate) rat: Rat,
    pub(crate) rac: u8,
    pub(crate) cs_reject_type: u8,
    pub(crate) cs_reject_cause: u8,
    pub(crate) ps_reject_type: u8,
    pub(crate) ps_reject_cause: u8,
}

impl Default for RegistrationState {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationState {
    pub const fn new() -> Self {
        Self {
            cs_status: RegistrationStatus::Searching,
            ps_status: RegistrationStatus::Searching,
            lac: INVALID_LAC,
            tac: INVALID_LAC,
            cell_id: INVALID_CELL_ID,
            rat: Rat::Invalid,
            rac: INVALID_RAC,
            cs_reject_type: 0,
            cs_reject_cause: 0,
            ps_reject_type: 0,
            ps_reject_cause: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// If PS is registered, we are connected.
    pub fn is_registered(&self) -> bool {
        self.ps_status.is_registered()
    }

    fn clear_location(&mut self) {
        self.lac = INVALID_LAC;
        self.cell_id = INVALID_CELL_ID;
        self.rat = Rat::Invalid;
        self.rac = INVALID_RAC;
    }

    fn status(&self, reg_type: RegType) -> RegistrationStatus {
        match reg_type {
            RegType::Creg => self.cs_status,
            RegType::Cgreg | RegType::Cereg => self.ps_status,
        }
    }

    pub fn service_status(&self) -> ServiceStatus {
        ServiceStatus {
            rat: self.rat,
            cs_registration_status: self.cs_status,
            ps_registration_status: self.ps_status,
            lac: if self.lac != INVALID_LAC {
                self.lac
            } else {
                self.tac
            },
            cell_id: self.cell_id,
            cs_reject_type: self.cs_reject_type,
            cs_reject_cause: self.cs_reject_cause,
            ps_reject_type: self.ps_reject_type,
            ps_reject_cause: self.ps_reject_cause,
        }
    }

    /// Apply a registration payload, the part after `+CxREG:`.
    ///
    /// `is_urc` selects the URC layout, which lacks the leading `<n>`.
    /// Returns the event to raise if the registration status of the domain
    /// changed. On error the state is left as it was.
    pub fn update(
        &mut self,
        reg_type: RegType,
        payload: &str,
        is_urc: bool,
    ) -> Result<Option<UrcEvent>, AtError> {
        let unquoted: String<AT_MAX_STRING_SIZE> = at::remove_all_double_quote(payload)?;
        let compact: String<AT_MAX_STRING_SIZE> = at::remove_all_whitespace(&unquoted)?;

        let previous = self.status(reg_type);
        let fields = reg_type.fields();
        let skip = usize::from(is_urc);

        // Fields are applied to a copy so a malformed payload changes nothing.
        let mut next = self.clone();
        let mut rest = compact.as_str();
        let mut index = skip;
        while !rest.is_empty() {
            let token = at::get_next_tok(&mut rest)?;
            let Some(&field) = fields.get(index) else {
                debug!(
                    "Ignoring {} field {}: {}",
                    reg_type.prefix(),
                    index,
                    token
                );
                break;
            };
            index += 1;
            if token.is_empty() {
                continue;
            }
            next.apply_field(reg_type, field, token)?;
        }

        if index == skip {
            return Err(AtError::BadParameter);
        }

        *self = next;
        let current = self.status(reg_type);
        if current != previous {
            debug!("{} {:?} -> {:?}", reg_type.prefix(), previous, current);
            Ok(Some(reg_type.event()))
        } else {
            Ok(None)
        }
    }

    fn apply_field(&mut self, reg_type: RegType, field: Field, token: &str) -> Result<(), AtError> {
        match field {
            Field::Mode => {}
            Field::Stat => {
                let stat: u8 = at::strtoi_as(token, 10)?;
                if stat > 10 {
                    return Err(AtError::Error);
                }
                let stat = RegistrationStatus::from(stat);
                match reg_type {
                    RegType::Creg => self.cs_status = stat,
                    RegType::Cgreg | RegType::Cereg => self.ps_status = stat,
                }
                if !stat.is_registered() {
                    self.clear_location();
                }
            }
            Field::LacTac => {
                let code: u16 = at::strtoi_as(token, 16)?;
                match reg_type {
                    RegType::Creg | RegType::Cgreg => self.lac = code,
                    RegType::Cereg => self.tac = code,
                }
            }
            Field::CellId => self.cell_id = parse_hex_u32(token)?,
            Field::Rat => {
                let rat: u8 = at::strtoi_as(token, 10)?;
                self.rat = match Rat::from(rat) {
                    Rat::Invalid => return Err(AtError::Error),
                    r @ (Rat::Gsm | Rat::Edge | Rat::Lte | Rat::CatM1 | Rat::NbIot) => r,
                    _ => Rat::Invalid,
                };
            }
            Field::Rac => self.rac = at::strtoi_as(token, 16)?,
            Field::RejectType | Field::RejectCause => {
                let value: u8 = at::strtoi_as(token, 10)?;
                let denied = self.status(reg_type) == RegistrationStatus::Denied;
                if denied {
                    match (reg_type, field) {
                        (RegType::Creg, Field::RejectType) => self.cs_reject_type = value,
                        (RegType::Creg, _) => self.cs_reject_cause = value,
                        (_, Field::RejectType) => self.ps_reject_type = value,
                        (_, _) => self.ps_reject_cause = value,
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn creg_urc_status_only() {
        let mut state = RegistrationState::new();
        assert_eq!(
            state.update(RegType::Creg, " 1", true),
            Ok(Some(UrcEvent::NetworkCsRegistration))
        );
        assert_eq!(
            state.service_status().cs_registration_status,
            RegistrationStatus::RegisteredHome
        );
        assert_eq!(state.update(RegType::Creg, " 1", true), Ok(None));
    }

    #[test]
    fn cereg_urc_with_location() {
        let mut state = RegistrationState::new();
        let event = state
            .update(RegType::Cereg, " 5,\"4E2D\",\"01A2B3C4\",7", true)
            .unwrap();
        assert_eq!(event, Some(UrcEvent::NetworkPsRegistration));

        let status = state.service_status();
        assert_eq!(status.ps_registration_status, RegistrationStatus::RegisteredRoaming);
        assert_eq!(status.lac, 0x4E2D);
        assert_eq!(status.cell_id, 0x01A2_B3C4);
        assert_eq!(status.rat, Rat::Lte);
        assert!(state.is_registered());
    }

    #[test]
    fn read_response_skips_mode() {
        let mut state = RegistrationState::new();
        state.update(RegType::Cgreg, " 2,1,\"00C3\",\"A13F\",3,\"7\"", false).unwrap();
        assert_eq!(state.ps_status, RegistrationStatus::RegisteredHome);
        assert_eq!(state.lac, 0x00C3);
        assert_eq!(state.cell_id, 0xA13F);
        assert_eq!(state.rat, Rat::Edge);
        assert_eq!(state.rac, 7);
    }

    #[test]
    fn reject_cause_only_when_denied() {
        let mut state = RegistrationState::new();
        state.update(RegType::Cereg, "3,,,,0,15", true).unwrap();
        assert_eq!((state.ps_reject_type, state.ps_reject_cause), (0, 15));

        let mut state = RegistrationState::new();
        state.update(RegType::Cereg, "2,,,,0,15", true).unwrap();
        assert_eq!(state.ps_reject_cause, 0);
    }

    #[test]
    fn deregistration_clears_location() {
        let mut state = RegistrationState::new();
        state.update(RegType::Creg, "1,\"0001\",\"0002\",0", true).unwrap();
        assert_eq!(state.rat, Rat::Gsm);
        state.update(RegType::Creg, "0", true).unwrap();
        assert_eq!(state.rat, Rat::Invalid);
        assert_eq!(state.cell_id, INVALID_CELL_ID);
    }

    #[test]
    fn malformed_payloads() {
        let mut state = RegistrationState::new();
        assert_eq!(state.update(RegType::Creg, "x", true), Err(AtError::Error));
        assert_eq!(state.update(RegType::Creg, "", true), Err(AtError::BadParameter));
        assert_eq!(state.update(RegType::Creg, "1,\"ZZ\"", true), Err(AtError::Error));
    }

    #[test]
    fn malformed_payload_leaves_state_untouched() {
        let mut state = RegistrationState::new();
        assert_eq!(
            state.update(RegType::Creg, " 1,\"ZZZZ\"", true),
            Err(AtError::Error)
        );
        assert_eq!(state, RegistrationState::new());

        assert_eq!(
            state.update(RegType::Creg, " 1", true),
            Ok(Some(UrcEvent::NetworkCsRegistration))
        );
    }
}
