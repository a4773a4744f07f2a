//! Snapshot types handed out by queries and URC handlers.

use embedded_nal::IpAddr;
use heapless::String;
use serde::{Deserialize, Serialize};

/// Radio access technology, numbered as in the 3GPP `<AcT>` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rat {
    Gsm = 0,
    GsmCompact = 1,
    Wcdma = 2,
    Edge = 3,
    Hsdpa = 4,
    Hsupa = 5,
    HsdpaHsupa = 6,
    Lte = 7,
    CatM1 = 8,
    NbIot = 9,
    #[default]
    Invalid = 0xFF,
}

impl From<u8> for Rat {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Gsm,
            1 => Self::GsmCompact,
            2 => Self::Wcdma,
            3 => Self::Edge,
            4 => Self::Hsdpa,
            5 => Self::Hsupa,
            6 => Self::HsdpaHsupa,
            7 => Self::Lte,
            8 => Self::CatM1,
            9 => Self::NbIot,
            _ => Self::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SimCardState {
    #[default]
    Unknown,
    Removed,
    Inserted,
}

/// Lock state as reported by `+CPIN:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SimLockState {
    Ready,
    Pin,
    Puk,
    Pin2,
    Puk2,
    PhNetPin,
    PhNetPuk,
    PhNetSubPin,
    PhNetSubPuk,
    SpPin,
    SpPuk,
    CorpPin,
    CorpPuk,
    ImsiPin,
    ImsiPuk,
    #[default]
    Unknown,
}

impl SimLockState {
    pub fn from_cpin(token: &str) -> Self {
        match token {
            "READY" => Self::Ready,
            "SIM PIN" => Self::Pin,
            "SIM PUK" => Self::Puk,
            "SIM PIN2" => Self::Pin2,
            "SIM PUK2" => Self::Puk2,
            "PH-NET PIN" => Self::PhNetPin,
            "PH-NET PUK" => Self::PhNetPuk,
            "PH-NETSUB PIN" => Self::PhNetSubPin,
            "PH-NETSUB PUK" => Self::PhNetSubPuk,
            "PH-SP PIN" => Self::SpPin,
            "PH-SP PUK" => Self::SpPuk,
            "PH-CORP PIN" => Self::CorpPin,
            "PH-CORP PUK" => Self::CorpPuk,
            "PH-SIM PIN" => Self::ImsiPin,
            "PH-SIM PUK" => Self::ImsiPuk,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SimCardStatus {
    pub state: SimCardState,
    pub lock_state: SimLockState,
}

/// Value used for signal fields the modem did not report.
pub const INVALID_SIGNAL_VALUE: i16 = -32768;
pub const INVALID_SIGNAL_BAR_VALUE: u8 = 0xFF;
/// `+CSQ` value for "not known or not detectable".
pub const CSQ_UNKNOWN: u8 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalInfo {
    /// `<rssi>` as reported by `+CSQ`, 99 when unknown.
    pub raw_rssi: u8,
    /// `<ber>` as reported by `+CSQ`, 99 when unknown.
    pub raw_ber: u8,
    /// Received signal strength, dBm.
    pub rssi: i16,
    /// Reference signal received power, dBm.
    pub rsrp: i16,
    /// Reference signal received quality, dB.
    pub rsrq: i16,
    pub sinr: i16,
    /// Bit error rate, in hundredths of a percent.
    pub ber: i16,
    /// 0 to 5, or [`INVALID_SIGNAL_BAR_VALUE`].
    pub bars: u8,
}

impl Default for SignalInfo {
    fn default() -> Self {
        Self {
            raw_rssi: CSQ_UNKNOWN,
            raw_ber: CSQ_UNKNOWN,
            rssi: INVALID_SIGNAL_VALUE,
            rsrp: INVALID_SIGNAL_VALUE,
            rsrq: INVALID_SIGNAL_VALUE,
            sinr: INVALID_SIGNAL_VALUE,
            ber: INVALID_SIGNAL_VALUE,
            bars: INVALID_SIGNAL_BAR_VALUE,
        }
    }
}

/// Upper bounds in dBm for one to four bars. Anything stronger is five.
const GSM_BAR_THRESHOLDS: [i16; 4] = [-104, -98, -89, -80];
const LTE_BAR_THRESHOLDS: [i16; 4] = [-115, -105, -95, -85];

/// `+CSQ` `<ber>` classes 0 to 7, in hundredths of a percent.
const BER_CLASSES: [i16; 8] = [14, 28, 57, 113, 226, 453, 905, 1810];

impl SignalInfo {
    /// Convert the raw `<rssi>` and `<ber>` of a `+CSQ` response. 99 and
    /// anything out of range are reported as invalid.
    pub fn from_csq(rssi: u8, ber: u8) -> Self {
        Self {
            raw_rssi: rssi,
            raw_ber: ber,
            rssi: match rssi {
                0..=31 => -113 + 2 * i16::from(rssi),
                _ => INVALID_SIGNAL_VALUE,
            },
            ber: BER_CLASSES
                .get(usize::from(ber))
                .copied()
                .unwrap_or(INVALID_SIGNAL_VALUE),
            ..Self::default()
        }
    }

    /// Fill in `bars` from RSSI on GSM and from RSRP on LTE.
    pub fn compute_bars(&mut self, rat: Rat) {
        let (value, thresholds) = match rat {
            Rat::Gsm | Rat::GsmCompact | Rat::Edge => (self.rssi, &GSM_BAR_THRESHOLDS),
            Rat::Lte | Rat::CatM1 | Rat::NbIot => (self.rsrp, &LTE_BAR_THRESHOLDS),
            _ => (INVALID_SIGNAL_VALUE, &GSM_BAR_THRESHOLDS),
        };

        self.bars = if value == INVALID_SIGNAL_VALUE {
            INVALID_SIGNAL_BAR_VALUE
        } else {
            thresholds
                .iter()
                .position(|&upper| value <= upper)
                .map_or(5, |i| i as u8 + 1)
        };
    }
}

/// Registration status, numbered as the 3GPP `<stat>` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationStatus {
    NotRegistered,
    RegisteredHome,
    Searching,
    Denied,
    #[default]
    Unknown,
    RegisteredRoaming,
    /// Registered for emergency services only.
    Emergency,
}

impl From<u8> for RegistrationStatus {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::NotRegistered,
            1 => Self::RegisteredHome,
            2 => Self::Searching,
            3 => Self::Denied,
            5 => Self::RegisteredRoaming,
            8 => Self::Emergency,
            _ => Self::Unknown,
        }
    }
}

impl RegistrationStatus {
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::RegisteredHome | Self::RegisteredRoaming)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationMode {
    #[default]
    Unknown,
    /// The URC is disabled.
    Disabled,
    Enabled,
    /// The URC carries location information.
    EnabledWithLocation,
    EnabledWithLocationAndCause,
}

impl From<u8> for RegistrationMode {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Disabled,
            1 => Self::Enabled,
            2 => Self::EnabledWithLocation,
            3 => Self::EnabledWithLocationAndCause,
            _ => Self::Unknown,
        }
    }
}

/// Registration state of the circuit and packet switched domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceStatus {
    pub rat: Rat,
    pub cs_registration_status: RegistrationStatus,
    pub ps_registration_status: RegistrationStatus,
    /// Location or tracking area code.
    pub lac: u16,
    pub cell_id: u32,
    pub cs_reject_type: u8,
    pub cs_reject_cause: u8,
    pub ps_reject_type: u8,
    pub ps_reject_cause: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModemInfo {
    pub manufacturer_id: String<32>,
    pub model_id: String<32>,
    pub firmware_version: String<32>,
    pub imei: String<16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PdnContextType {
    #[default]
    Ipv4,
    Ipv6,
    Ipv4v6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdnStatus {
    pub context_id: u8,
    pub active: bool,
    pub context_type: PdnContextType,
    pub ip_address: Option<IpAddr>,
}

#[cfg(feature = "defmt")]
impl defmt::Format for PdnStatus {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(
            f,
            "PdnStatus {{ context_id: {=u8}, active: {=bool}, context_type: {:?} }}",
            self.context_id,
            self.active,
            self.context_type
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn csq_conversion() {
        let info = SignalInfo::from_csq(15, 99);
        assert_eq!((info.raw_rssi, info.raw_ber), (15, CSQ_UNKNOWN));
        assert_eq!(info.rssi, -83);
        assert_eq!(info.ber, INVALID_SIGNAL_VALUE);

        let info = SignalInfo::from_csq(99, 2);
        assert_eq!(info.rssi, INVALID_SIGNAL_VALUE);
        assert_eq!(info.ber, 57);

        assert_eq!(SignalInfo::from_csq(0, 0).rssi, -113);
        assert_eq!(SignalInfo::from_csq(31, 7).rssi, -51);
    }

    #[test]
    fn bars_follow_rat() {
        let mut info = SignalInfo::from_csq(15, 99);
        info.compute_bars(Rat::Gsm);
        assert_eq!(info.bars, 4);

        info.compute_bars(Rat::CatM1);
        assert_eq!(info.bars, INVALID_SIGNAL_BAR_VALUE);

        info.rsrp = -110;
        info.compute_bars(Rat::CatM1);
        assert_eq!(info.bars, 2);

        info.rssi = -40;
        info.compute_bars(Rat::Edge);
        assert_eq!(info.bars, 5);

        info.compute_bars(Rat::Invalid);
        assert_eq!(info.bars, INVALID_SIGNAL_BAR_VALUE);
    }

    #[test]
    fn cpin_tokens() {
        assert_eq!(SimLockState::from_cpin("READY"), SimLockState::Ready);
        assert_eq!(SimLockState::from_cpin("SIM PIN"), SimLockState::Pin);
        assert_eq!(SimLockState::from_cpin("PH-NETSUB PUK"), SimLockState::PhNetSubPuk);
        assert_eq!(SimLockState::from_cpin("whatever"), SimLockState::Unknown);
    }
}
