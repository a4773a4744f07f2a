//! Quectel BG96 (LTE Cat M1 / NB1 / EGPRS).
//!
//! Sockets map one to one onto BG96 connect ids: the socket handle index
//! is the `<connectID>` of `AT+QIOPEN`. Data is exchanged in buffer access
//! mode, announced by `+QIURC: "recv"` and fetched with `AT+QIRD`.

use core::fmt::Write as _;

use embassy_time::Duration;
use embedded_nal::SocketAddr;
use heapless::String;

use crate::asynch::control::Control;
use crate::asynch::urc_handler::{common, UrcContext};
use crate::at;
use crate::comm::CommInterface;
use crate::config::{
    CellularConfig, AT_CMD_MAX_SIZE, AT_MAX_STRING_SIZE, MAX_RECV_DATA_LEN, MAX_SEND_DATA_LEN,
};
use crate::error::{AtError, Error};
use crate::response::{
    data_prompt, AtCommandType, AtDataRequest, AtRequest, DataPrefix, DataPrefixError,
};
use crate::socket::{AccessMode, SocketEvent, SocketHandle, SocketInfo, SocketProtocol, SocketState};
use crate::token_table::{TokenTable, UrcHandlerEntry};
use crate::types::{PdnContextType, SignalInfo};

const ERROR_TOKENS: &[&str] = &[
    "ERROR",
    "BUSY",
    "NO CARRIER",
    "NO ANSWER",
    "NO DIALTONE",
    "ABORTED",
    "+CMS ERROR",
    "+CME ERROR",
    "SEND FAIL",
];

const SUCCESS_TOKENS: &[&str] = &["OK", "CONNECT", "SEND OK", ">"];

const URC_TOKENS_WITHOUT_PREFIX: &[&str] = &["NORMAL POWER DOWN", "PSM POWER DOWN", "RDY"];

const URC_HANDLERS: &[UrcHandlerEntry] = &[
    UrcHandlerEntry::new("CEREG", common::cereg),
    UrcHandlerEntry::new("CGREG", common::cgreg),
    UrcHandlerEntry::new("CREG", common::creg),
    UrcHandlerEntry::new("NORMAL POWER DOWN", common::normal_power_down),
    UrcHandlerEntry::new("PSM POWER DOWN", common::psm_power_down),
    UrcHandlerEntry::new("QIND", qind),
    UrcHandlerEntry::new("QIOPEN", qiopen),
    UrcHandlerEntry::new("QIURC", qiurc),
    UrcHandlerEntry::new("RDY", common::ready),
];

pub const TOKEN_TABLE: TokenTable = TokenTable {
    urc_handlers: URC_HANDLERS,
    error_tokens: ERROR_TOKENS,
    success_tokens: SUCCESS_TOKENS,
    extra_success_tokens: &[],
    urc_tokens_without_prefix: URC_TOKENS_WITHOUT_PREFIX,
};

/// Attempts per command while the modem may still be booting.
const ENABLE_RETRY_COUNT: usize = 3;
const ENABLE_RETRY_TIMEOUT: Duration = Duration::from_secs(5);

const PDN_ACTIVATE_TIMEOUT: Duration = Duration::from_secs(150);
const PDN_DEACTIVATE_TIMEOUT: Duration = Duration::from_secs(40);
const SOCKET_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration applied by [`Bg96::enable_ue`] after echo is off.
const ENABLE_UE_COMMANDS: &[&str] = &[
    // DTR ignored
    "AT&D0",
    // RTS/CTS flow control
    "AT+IFC=2,2",
    "AT+QURCCFG=\"urcport\",\"uart1\"",
    "AT+QCFG=\"band\",f,400a0e189f,a0e189f",
    "AT+QCFG=\"nwscanmode\",0,1",
    "AT+QCFG=\"iotopmode\",2,1",
    // Cat M1, then NB1, then GSM
    "AT+QCFG=\"nwscanseq\",020301,1",
    "AT+CFUN=1",
];

const ENABLE_URC_COMMANDS: &[&str] = &[
    "AT+COPS=3,2",
    "AT+CREG=2",
    "AT+CGREG=2",
    "AT+CEREG=2",
    "AT+CTZR=1",
];

/// BG96 commands on top of a running engine.
pub struct Bg96<'c, 'a, C: CommInterface, Cfg: CellularConfig> {
    control: &'c Control<'a, C, Cfg>,
}

impl<'c, 'a, C: CommInterface, Cfg: CellularConfig> Bg96<'c, 'a, C, Cfg> {
    pub fn new(control: &'c Control<'a, C, Cfg>) -> Self {
        Self { control }
    }

    /// Turn echo off, configure the serial link, bands and RAT search
    /// order, then switch the radio on.
    pub async fn enable_ue(&self) -> Result<(), Error> {
        // The echoed command may still come back as a line of its own.
        self.send_with_retry(AtRequest::new("ATE0", AtCommandType::MultiWoPrefix))
            .await?;
        for cmd in ENABLE_UE_COMMANDS {
            self.send_with_retry(AtRequest::new(cmd, AtCommandType::NoResult))
                .await?;
        }
        Ok(())
    }

    /// Enable the registration URCs with location information. Failures
    /// are logged and otherwise ignored.
    pub async fn enable_urc(&self) {
        for cmd in ENABLE_URC_COMMANDS {
            let req = AtRequest::new(cmd, AtCommandType::NoResult);
            if let Err(e) = self.control.send_request(req).await {
                warn!("{} failed: {:?}", cmd, e);
            }
        }
    }

    async fn send_with_retry(&self, req: AtRequest<'_>) -> Result<(), Error> {
        let mut result = Err(Error::Timeout);
        for attempt in 1..=ENABLE_RETRY_COUNT {
            result = self
                .control
                .send_request_with_timeout(req, ENABLE_RETRY_TIMEOUT, |_| Ok(()))
                .await;
            match result {
                Ok(()) => break,
                Err(e) => debug!("{} attempt {} failed: {:?}", req.cmd, attempt, e),
            }
        }
        result
    }

    pub async fn activate_pdn(&self, context_id: u8) -> Result<(), Error> {
        let pdn = self.control.pdn();
        pdn.begin_activate(context_id, PdnContextType::Ipv4)?;

        let cmd = command(format_args!("AT+QIACT={}", context_id))?;
        let req = AtRequest::new(&cmd, AtCommandType::NoResult);
        match self
            .control
            .send_request_with_timeout(req, PDN_ACTIVATE_TIMEOUT, |_| Ok(()))
            .await
        {
            Ok(()) => {
                UrcContext::new(self.control.state).pdn_activated(context_id, None)?;
                Ok(())
            }
            Err(e) => {
                pdn.abort(context_id)?;
                Err(e)
            }
        }
    }

    pub async fn deactivate_pdn(&self, context_id: u8) -> Result<(), Error> {
        let pdn = self.control.pdn();
        pdn.begin_deactivate(context_id)?;

        let cmd = command(format_args!("AT+QIDEACT={}", context_id))?;
        let req = AtRequest::new(&cmd, AtCommandType::NoResult);
        match self
            .control
            .send_request_with_timeout(req, PDN_DEACTIVATE_TIMEOUT, |_| Ok(()))
            .await
        {
            Ok(()) => {
                UrcContext::new(self.control.state).pdn_deactivated(context_id)?;
                Ok(())
            }
            Err(e) => {
                pdn.abort(context_id)?;
                Err(e)
            }
        }
    }

    /// Request a connection to `remote`. The outcome arrives later with
    /// `+QIOPEN` and is reported through the socket opened callback.
    pub async fn socket_connect(&self, socket: SocketHandle, remote: SocketAddr) -> Result<(), Error> {
        let sockets = self.control.sockets();
        let info = sockets.info(socket)?;
        if info.state != SocketState::Created {
            return Err(Error::NotAllowed);
        }

        let service = match info.protocol {
            SocketProtocol::Tcp => "TCP",
            SocketProtocol::Udp => "UDP",
        };
        let access_mode = match info.access_mode {
            AccessMode::Buffer => 0,
            AccessMode::DirectPush => 1,
            AccessMode::Transparent => 2,
        };
        let cmd = command(format_args!(
            "AT+QIOPEN={},{},\"{}\",\"{}\",{},{},{}",
            info.context_id,
            socket.0,
            service,
            remote.ip(),
            remote.port(),
            info.local_port,
            access_mode
        ))?;

        sockets.set_remote(socket, remote)?;
        sockets.transition(socket, SocketEvent::Open)?;

        let req = AtRequest::new(&cmd, AtCommandType::NoResult);
        if let Err(e) = self.control.send_request(req).await {
            if let Err(e) = sockets.transition(socket, SocketEvent::OpenFailed) {
                warn!("Socket {} open rollback: {:?}", socket.0, e);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Send up to [`MAX_SEND_DATA_LEN`] bytes of `data`, returning how many
    /// were sent.
    pub async fn socket_send(&self, socket: SocketHandle, data: &[u8]) -> Result<usize, Error> {
        connected(&self.control.sockets().info(socket)?)?;
        if data.is_empty() {
            return Err(Error::BadParameter);
        }

        let len = data.len().min(MAX_SEND_DATA_LEN);
        let cmd = command(format_args!("AT+QISEND={},{}", socket.0, len))?;
        let req = AtRequest::new(&cmd, AtCommandType::NoResult);
        let payload = AtDataRequest {
            data: &data[..len],
            end_pattern: None,
        };
        self.control
            .send_data_request(req, payload, data_prompt, &[])
            .await
    }

    /// Read what the modem buffered for `socket` into `buf`. Returns 0 if
    /// nothing is buffered.
    pub async fn socket_recv(&self, socket: SocketHandle, buf: &mut [u8]) -> Result<usize, Error> {
        connected(&self.control.sockets().info(socket)?)?;
        if buf.is_empty() {
            return Err(Error::BadParameter);
        }

        let len = buf.len().min(MAX_RECV_DATA_LEN);
        let cmd = command(format_args!("AT+QIRD={},{}", socket.0, len))?;
        let req = AtRequest::with_prefix(&cmd, AtCommandType::MultiDataWoPrefix, "+QIRD");
        self.control
            .send_request_with_data_prefix(req, qird_data_prefix, |resp| {
                let data = resp.data();
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            })
            .await
    }

    /// Close `socket` and free its slot.
    ///
    /// The connect id is released with `AT+QICLOSE` whenever an open was
    /// requested, including after the peer closed the connection.
    pub async fn socket_close(&self, socket: SocketHandle) -> Result<(), Error> {
        let sockets = self.control.sockets();
        let state = sockets.state(socket)?;
        if state != SocketState::Closed {
            sockets.transition(socket, SocketEvent::Close)?;
        }

        let mut result = Ok(());
        if state != SocketState::Created {
            let cmd = command(format_args!("AT+QICLOSE={}", socket.0))?;
            let req = AtRequest::new(&cmd, AtCommandType::NoResult);
            result = self
                .control
                .send_request_with_timeout(req, SOCKET_CLOSE_TIMEOUT, |_| Ok(()))
                .await;
        }

        if sockets.state(socket)? == SocketState::Closing {
            sockets.transition(socket, SocketEvent::Closed)?;
        }
        sockets.remove(socket)?;
        result
    }
}

fn connected(info: &SocketInfo) -> Result<(), Error> {
    match info.state {
        SocketState::Connected => Ok(()),
        SocketState::Closed => Err(Error::SocketClosed),
        _ => Err(Error::SocketNotConnected),
    }
}

fn command(args: core::fmt::Arguments<'_>) -> Result<String<AT_CMD_MAX_SIZE>, Error> {
    let mut cmd = String::new();
    cmd.write_fmt(args).map_err(|_| Error::NoMemory)?;
    Ok(cmd)
}

/// Detects the `+QIRD: <len>\r\n` header in front of socket data.
pub fn qird_data_prefix(buf: &[u8]) -> Result<Option<DataPrefix>, DataPrefixError> {
    const HEADER: &[u8] = b"+QIRD: ";

    if buf.len() < HEADER.len() {
        return if HEADER.starts_with(buf) {
            Err(DataPrefixError::Incomplete)
        } else {
            Ok(None)
        };
    }
    if !buf.starts_with(HEADER) {
        return Ok(None);
    }

    let Some(end) = buf.iter().position(|&b| b == b'\r' || b == b'\n') else {
        return Err(DataPrefixError::Incomplete);
    };
    let data_start = match (buf[end], buf.get(end + 1)) {
        (b'\r', None) => return Err(DataPrefixError::Incomplete),
        (b'\r', Some(b'\n')) => end + 2,
        _ => end + 1,
    };

    let Some(data_len) = core::str::from_utf8(&buf[HEADER.len()..end])
        .ok()
        .and_then(|len| len.trim().parse::<usize>().ok())
    else {
        return Ok(None);
    };
    if data_len > MAX_RECV_DATA_LEN {
        return Err(DataPrefixError::TooLarge);
    }

    Ok(Some(DataPrefix {
        data_start,
        data_len,
    }))
}

fn compact(payload: &str) -> Result<String<AT_MAX_STRING_SIZE>, AtError> {
    let unquoted: String<AT_MAX_STRING_SIZE> = at::remove_all_double_quote(payload)?;
    at::remove_all_whitespace(&unquoted)
}

/// `+QIND: "csq",<rssi>,<ber>`. Other indications are only logged.
fn qind(ctx: &UrcContext<'_, '_>, payload: &str) -> Result<(), AtError> {
    let payload = compact(payload)?;
    let mut rest = payload.as_str();
    match at::get_next_tok(&mut rest)? {
        "csq" => {
            let rssi = at::strtoi_as(at::get_next_tok(&mut rest)?, 10)?;
            let ber = at::strtoi_as(at::get_next_tok(&mut rest)?, 10)?;
            let mut info = SignalInfo::from_csq(rssi, ber);
            info.compute_bars(ctx.service_status().rat);
            ctx.signal_changed(info);
        }
        other => debug!("Ignoring QIND {}", other),
    }
    Ok(())
}

/// `+QIOPEN: <connectID>,<err>`
fn qiopen(ctx: &UrcContext<'_, '_>, payload: &str) -> Result<(), AtError> {
    let payload = compact(payload)?;
    let mut rest = payload.as_str();
    let socket = SocketHandle(at::strtoi_as(at::get_next_tok(&mut rest)?, 10)?);
    let err: u16 = at::strtoi_as(at::get_next_tok(&mut rest)?, 10)?;

    let event = if err == 0 {
        SocketEvent::Opened
    } else {
        warn!("Socket {} open failed with {}", socket.0, err);
        SocketEvent::OpenFailed
    };
    ctx.socket_event(socket, event)
}

/// `+QIURC: "recv"|"closed",<connectID>` and `+QIURC: "pdpdeact",<contextID>`.
fn qiurc(ctx: &UrcContext<'_, '_>, payload: &str) -> Result<(), AtError> {
    let payload = compact(payload)?;
    let mut rest = payload.as_str();
    let kind = at::get_next_tok(&mut rest)?;
    match kind {
        "recv" | "closed" | "pdpdeact" => {
            let id: u8 = at::strtoi_as(at::get_next_tok(&mut rest)?, 10)?;
            match kind {
                "recv" => ctx.socket_event(SocketHandle(id), SocketEvent::DataReady),
                "closed" => ctx.socket_event(SocketHandle(id), SocketEvent::RemoteClosed),
                _ => ctx.pdn_deactivated(id),
            }
        }
        other => {
            debug!("Ignoring QIURC {}", other);
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use core::cell::{Cell, RefCell};

    use embedded_nal::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::asynch::{self, resources::Resources};
    use crate::pdn::PdnState;
    use crate::socket::{SocketDomain, SocketType};
    use crate::test_helpers::{run_engine, MockComm, TestConfig};
    use crate::urc::UrcEvent;

    #[test]
    fn token_table_is_valid() {
        assert_eq!(TOKEN_TABLE.validate(), Ok(()));
    }

    #[test]
    fn qird_header_detection() {
        assert_eq!(qird_data_prefix(b"+QI"), Err(DataPrefixError::Incomplete));
        assert_eq!(qird_data_prefix(b"+QIRD: 12"), Err(DataPrefixError::Incomplete));
        assert_eq!(qird_data_prefix(b"+QIRD: 12\r"), Err(DataPrefixError::Incomplete));
        assert_eq!(qird_data_prefix(b"OK\r\n"), Ok(None));
        assert_eq!(qird_data_prefix(b"+QIURC: \"recv\",0\r\n"), Ok(None));
        assert_eq!(
            qird_data_prefix(b"+QIRD: 12\r\nhello"),
            Ok(Some(DataPrefix {
                data_start: 11,
                data_len: 12
            }))
        );
        assert_eq!(
            qird_data_prefix(b"+QIRD: 9999\r\n"),
            Err(DataPrefixError::TooLarge)
        );
    }

    #[test]
    fn signal_indication() {
        let reported = RefCell::new(std::vec::Vec::new());
        let on_signal = |event: UrcEvent, info: &SignalInfo| {
            reported.borrow_mut().push((event, info.raw_rssi, info.rssi))
        };

        let comm = MockComm::new();
        comm.expect("AT\r", "\r\nOK\r\n");

        let resources = Resources::new();
        let (control, mut runner) =
            asynch::new(&resources, &comm, TOKEN_TABLE, TestConfig).unwrap();
        control.set_signal_handler(Some(&on_signal));

        run_engine(&control, &mut runner, async {
            comm.inject("\r\n+QIND: \"csq\",20,1\r\n");
            control
                .send_request(AtRequest::new("AT", AtCommandType::NoResult))
                .await
                .unwrap();
            let info = control.last_signal();
            assert_eq!(info.rssi, -73);
            assert_eq!(info.ber, 28);
        });

        assert_eq!(*reported.borrow(), [(UrcEvent::SignalChanged, 20, -73)]);
    }

    #[test]
    fn tcp_socket_lifecycle() {
        let opened = RefCell::new(std::vec::Vec::new());
        let data_ready = Cell::new(0);
        let closed = Cell::new(0);
        let on_opened = |event: UrcEvent, socket: SocketHandle| opened.borrow_mut().push((event, socket));
        let on_data_ready = |_: SocketHandle| data_ready.set(data_ready.get() + 1);
        let on_closed = |_: SocketHandle| closed.set(closed.get() + 1);

        let comm = MockComm::new();
        comm.expect(
            "AT+QIOPEN=1,0,\"TCP\",\"93.184.216.34\",80,0,0\r",
            "\r\nOK\r\n\r\n+QIOPEN: 0,0\r\n\r\n+QIURC: \"recv\",0\r\n",
        )
        .expect("AT+QIRD=0,64\r", "\r\n+QIRD: 5\r\nhello\r\n\r\nOK\r\n")
        .expect("AT+QISEND=0,5\r", "\r\n> ")
        .expect("world", "\r\nSEND OK\r\n\r\n+QIURC: \"closed\",0\r\n")
        .expect("AT+QICLOSE=0\r", "\r\nOK\r\n");

        let resources = Resources::new();
        let (control, mut runner) =
            asynch::new(&resources, &comm, TOKEN_TABLE, TestConfig).unwrap();
        let bg96 = Bg96::new(&control);

        run_engine(&control, &mut runner, async {
            let socket = control
                .create_socket(1, SocketDomain::Inet, SocketType::Stream, SocketProtocol::Tcp)
                .unwrap();
            control.set_socket_opened_callback(socket, Some(&on_opened)).unwrap();
            control.set_socket_data_ready_callback(socket, Some(&on_data_ready)).unwrap();
            control.set_socket_closed_callback(socket, Some(&on_closed)).unwrap();

            let remote = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)), 80);
            bg96.socket_connect(socket, remote).await.unwrap();
            assert_eq!(control.socket_state(socket), Ok(SocketState::Connected));
            assert_eq!(control.socket_info(socket).unwrap().remote, Some(remote));

            let mut buf = [0u8; 64];
            let n = bg96.socket_recv(socket, &mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"hello");

            assert_eq!(bg96.socket_send(socket, b"world").await, Ok(5));
            assert_eq!(control.socket_state(socket), Ok(SocketState::Closed));
            assert_eq!(bg96.socket_send(socket, b"again").await, Err(Error::SocketClosed));

            bg96.socket_close(socket).await.unwrap();
            assert_eq!(control.socket_state(socket), Err(Error::InvalidHandle));
        });

        assert_eq!(*opened.borrow(), [(UrcEvent::SocketOpened, SocketHandle(0))]);
        assert_eq!(data_ready.get(), 1);
        assert_eq!(closed.get(), 1);
        assert!(comm.script_done());
    }

    #[test]
    fn refused_connection() {
        let opened = RefCell::new(std::vec::Vec::new());
        let on_opened = |event: UrcEvent, socket: SocketHandle| opened.borrow_mut().push((event, socket));

        let comm = MockComm::new();
        comm.expect(
            "AT+QIOPEN=1,0,\"UDP\",\"10.0.0.1\",5683,0,0\r",
            "\r\nOK\r\n\r\n+QIOPEN: 0,565\r\n",
        );

        let resources = Resources::new();
        let (control, mut runner) =
            asynch::new(&resources, &comm, TOKEN_TABLE, TestConfig).unwrap();
        let bg96 = Bg96::new(&control);

        run_engine(&control, &mut runner, async {
            let socket = control
                .create_socket(1, SocketDomain::Inet, SocketType::Dgram, SocketProtocol::Udp)
                .unwrap();
            control.set_socket_opened_callback(socket, Some(&on_opened)).unwrap();

            let remote = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 5683);
            bg96.socket_connect(socket, remote).await.unwrap();
            assert_eq!(control.socket_state(socket), Ok(SocketState::OpenFailed));
            assert_eq!(
                bg96.socket_recv(socket, &mut [0u8; 8]).await,
                Err(Error::SocketNotConnected)
            );
            assert_eq!(bg96.socket_connect(socket, remote).await, Err(Error::NotAllowed));
        });

        assert_eq!(*opened.borrow(), [(UrcEvent::SocketOpenFailed, SocketHandle(0))]);
    }

    #[test]
    fn pdn_activation_and_loss() {
        let events = RefCell::new(std::vec::Vec::new());
        let on_pdn = |event: UrcEvent, context_id: u8| events.borrow_mut().push((event, context_id));

        let comm = MockComm::new();
        comm.expect("AT+QIACT=1\r", "\r\nOK\r\n")
            .expect("AT+QIACT=2\r", "\r\nERROR\r\n")
            .expect("AT\r", "\r\nOK\r\n");

        let resources = Resources::new();
        let (control, mut runner) =
            asynch::new(&resources, &comm, TOKEN_TABLE, TestConfig).unwrap();
        control.set_pdn_event_handler(Some(&on_pdn));
        let bg96 = Bg96::new(&control);

        run_engine(&control, &mut runner, async {
            bg96.activate_pdn(1).await.unwrap();
            assert!(control.pdn().status(1).unwrap().active);
            assert_eq!(bg96.activate_pdn(1).await, Err(Error::NotAllowed));

            assert_eq!(bg96.activate_pdn(2).await, Err(Error::ModemError));
            assert!(!control.pdn().status(2).unwrap().active);

            comm.inject("\r\n+QIURC: \"pdpdeact\",1\r\n");
            control
                .send_request(AtRequest::new("AT", AtCommandType::NoResult))
                .await
                .unwrap();
            assert!(!control.pdn().status(1).unwrap().active);
        });

        assert_eq!(
            *events.borrow(),
            [(UrcEvent::PdnActivated, 1), (UrcEvent::PdnDeactivated, 1)]
        );
    }

    #[test]
    fn pdn_deactivation() {
        let events = RefCell::new(std::vec::Vec::new());
        let on_pdn = |event: UrcEvent, context_id: u8| events.borrow_mut().push((event, context_id));

        let comm = MockComm::new();
        comm.expect("AT+QIACT=1\r", "\r\nOK\r\n")
            .expect("AT+QIDEACT=1\r", "\r\nERROR\r\n")
            .expect("AT+QIDEACT=1\r", "\r\nOK\r\n");

        let resources = Resources::new();
        let (control, mut runner) =
            asynch::new(&resources, &comm, TOKEN_TABLE, TestConfig).unwrap();
        control.set_pdn_event_handler(Some(&on_pdn));
        let bg96 = Bg96::new(&control);

        run_engine(&control, &mut runner, async {
            assert_eq!(bg96.deactivate_pdn(1).await, Err(Error::NotAllowed));

            bg96.activate_pdn(1).await.unwrap();

            assert_eq!(bg96.deactivate_pdn(1).await, Err(Error::ModemError));
            assert_eq!(control.pdn().state(1), Ok(PdnState::Active));

            bg96.deactivate_pdn(1).await.unwrap();
            assert_eq!(control.pdn().state(1), Ok(PdnState::Inactive));
        });

        assert!(comm.script_done());
        assert_eq!(comm.sent(), "AT+QIACT=1\rAT+QIDEACT=1\rAT+QIDEACT=1\r");
        assert_eq!(
            *events.borrow(),
            [(UrcEvent::PdnActivated, 1), (UrcEvent::PdnDeactivated, 1)]
        );
    }

    #[test]
    fn enable_urc_continues_past_failures() {
        let comm = MockComm::new();
        for cmd in ENABLE_URC_COMMANDS {
            let output = if *cmd == "AT+CREG=2" {
                "\r\nERROR\r\n"
            } else {
                "\r\nOK\r\n"
            };
            comm.expect(&std::format!("{}\r", cmd), output);
        }

        let resources = Resources::new();
        let (control, mut runner) =
            asynch::new(&resources, &comm, TOKEN_TABLE, TestConfig).unwrap();
        let bg96 = Bg96::new(&control);

        run_engine(&control, &mut runner, async {
            bg96.enable_urc().await;
        });

        let expected: std::string::String = ENABLE_URC_COMMANDS
            .iter()
            .map(|cmd| std::format!("{}\r", cmd))
            .collect();
        assert!(comm.script_done());
        assert_eq!(comm.sent(), expected);
    }

    #[test]
    fn enable_ue_sends_configuration() {
        let comm = MockComm::new();
        comm.expect("ATE0\r", "ATE0\r\r\nOK\r\n");
        for cmd in ENABLE_UE_COMMANDS {
            comm.expect(&std::format!("{}\r", cmd), "\r\nOK\r\n");
        }

        let resources = Resources::new();
        let (control, mut runner) =
            asynch::new(&resources, &comm, TOKEN_TABLE, TestConfig).unwrap();
        let bg96 = Bg96::new(&control);

        run_engine(&control, &mut runner, async {
            bg96.enable_ue().await.unwrap();
        });

        assert!(comm.script_done());
        assert!(comm.sent().ends_with("AT+CFUN=1\r"));
    }
}
