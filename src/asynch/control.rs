use core::marker::PhantomData;

use embassy_time::{with_timeout, Duration};
use heapless::{String, Vec};

use super::state::{LibraryStatus, PendingRequest, State};
use crate::comm::CommInterface;
use crate::config::{CellularConfig, AT_CMD_MAX_SIZE, MAX_PREFIX_STRING_LENGTH, MAX_SEND_DATA_LEN};
use crate::error::{Error, PktStatus};
use crate::pdn::PdnTable;
use crate::pktio::FrameHooks;
use crate::response::{
    AtCommandType, AtDataRequest, AtRequest, AtResponse, DataPrefixFn, DataSendPrefixFn,
    ResponseStatus,
};
use crate::socket::{
    SocketDomain, SocketHandle, SocketInfo, SocketOption, SocketProtocol, SocketSet, SocketState,
    SocketType,
};
use crate::token_table::TokenTable;
use crate::types::{ServiceStatus, SignalInfo};
use crate::urc::{
    GenericUrcHandler, ModemEventHandler, NetworkRegistrationHandler, PdnEventHandler,
    SignalHandler, SocketClosed, SocketDataReady, SocketOpened,
};

/// Tokens ending the command phase of a data send.
const PROMPT_TOKENS: &[&str] = &[">"];

/// Handle for issuing requests and managing the engine state.
pub struct Control<'a, C: CommInterface, Cfg: CellularConfig> {
    pub(crate) state: &'a State<'a>,
    comm: &'a C,
    table: TokenTable,
    _config: PhantomData<Cfg>,
}

impl<'a, C: CommInterface, Cfg: CellularConfig> Control<'a, C, Cfg> {
    pub(crate) fn new(state: &'a State<'a>, comm: &'a C, table: TokenTable) -> Self {
        Self {
            state,
            comm,
            table,
            _config: PhantomData,
        }
    }

    pub fn token_table(&self) -> &TokenTable {
        &self.table
    }

    pub fn library_status(&self) -> LibraryStatus {
        self.state.library_status(None)
    }

    /// Wait for the runner to open the comm interface.
    pub async fn wait_open(&self) {
        self.state
            .wait_for_library_status(LibraryStatus::Open)
            .await
    }

    /// Stop the runner and wait for it to close the comm interface.
    pub async fn close(&self) -> Result<(), Error> {
        self.state.check_open()?;
        self.state.shutdown.signal(());
        self.state
            .wait_for_library_status(LibraryStatus::Closed)
            .await;
        Ok(())
    }

    /// Send `req` and wait for its final result code.
    pub async fn send_request(&self, req: AtRequest<'_>) -> Result<(), Error> {
        self.send_request_with(req, |_| Ok(())).await
    }

    /// Send `req` and hand the successful response to `f`.
    ///
    /// `f` only runs if the response terminated with a success token. Its
    /// result becomes the result of the request.
    pub async fn send_request_with<T>(
        &self,
        req: AtRequest<'_>,
        f: impl FnOnce(&AtResponse) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.send_request_with_timeout(req, Cfg::COMMAND_TIMEOUT, f)
            .await
    }

    pub async fn send_request_with_timeout<T>(
        &self,
        req: AtRequest<'_>,
        timeout: Duration,
        f: impl FnOnce(&AtResponse) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.request(req, timeout, FrameHooks::default(), &[], f)
            .await
    }

    /// Send a request whose response carries raw payload, announced by a
    /// header recognised by `data_prefix`.
    pub async fn send_request_with_data_prefix<T>(
        &self,
        req: AtRequest<'_>,
        data_prefix: DataPrefixFn,
        f: impl FnOnce(&AtResponse) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let hooks = FrameHooks {
            data_prefix: Some(data_prefix),
            data_send_prefix: None,
        };
        self.request(req, Cfg::COMMAND_TIMEOUT, hooks, &[], f)
            .await
    }

    /// Send `req`, wait for the data prompt recognised by `prompt`, then
    /// send the payload and wait for the final result code.
    ///
    /// `success_tokens` are accepted as success for the payload phase in
    /// addition to the table tokens. Returns the number of payload bytes
    /// sent.
    pub async fn send_data_request(
        &self,
        req: AtRequest<'_>,
        data: AtDataRequest<'_>,
        prompt: DataSendPrefixFn,
        success_tokens: &'static [&'static str],
    ) -> Result<usize, Error> {
        self.state.check_open()?;
        validate(&req)?;
        self.table.check_success_tokens(PROMPT_TOKENS)?;
        self.table.check_success_tokens(success_tokens)?;
        if data.data.is_empty() || data.data.len() > MAX_SEND_DATA_LEN {
            return Err(Error::BadParameter);
        }

        let _guard = self.state.request_lock.lock().await;

        let hooks = FrameHooks {
            data_prefix: None,
            data_send_prefix: Some(prompt),
        };
        self.exchange(&req, Cfg::COMMAND_TIMEOUT, hooks, PROMPT_TOKENS)
            .await?
            .check()?;

        self.state.begin_request(PendingRequest {
            cmd_type: AtCommandType::NoResult,
            success_tokens,
            ..PendingRequest::none()
        });

        let sent = match self.comm.send(data.data, Cfg::COMM_SEND_TIMEOUT).await {
            Ok(sent) => sent,
            Err(e) => {
                self.state.end_request();
                return Err(e.into());
            }
        };
        if sent != data.data.len() {
            error!("Sent {} of {} payload bytes", sent, data.data.len());
            self.state.end_request();
            return Err(PktStatus::SendError.into());
        }
        debug!("TX {} payload bytes", sent);

        if let Some(end_pattern) = data.end_pattern {
            if let Err(e) = self.send_all(end_pattern).await {
                self.state.end_request();
                return Err(e);
            }
        }

        self.wait(Cfg::COMMAND_TIMEOUT).await?.check()?;
        Ok(sent)
    }

    async fn request<T>(
        &self,
        req: AtRequest<'_>,
        timeout: Duration,
        hooks: FrameHooks,
        success_tokens: &'static [&'static str],
        f: impl FnOnce(&AtResponse) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.state.check_open()?;
        validate(&req)?;
        self.table.check_success_tokens(success_tokens)?;

        let _guard = self.state.request_lock.lock().await;

        self.exchange(&req, timeout, hooks, success_tokens)
            .await?
            .check()?;
        self.state.with_response(|resp| f(resp))
    }

    /// Send a command and wait for its classified response. The request
    /// lock must be held.
    async fn exchange(
        &self,
        req: &AtRequest<'_>,
        timeout: Duration,
        hooks: FrameHooks,
        success_tokens: &'static [&'static str],
    ) -> Result<ResponseStatus, Error> {
        let mut cmd: Vec<u8, { AT_CMD_MAX_SIZE + 8 }> = Vec::new();
        cmd.extend_from_slice(req.cmd.as_bytes())
            .and_then(|()| cmd.extend_from_slice(Cfg::COMMAND_TERMINATOR.as_bytes()))
            .map_err(|_| Error::BadParameter)?;

        let prefix = req
            .prefix
            .map(String::<MAX_PREFIX_STRING_LENGTH>::try_from)
            .transpose()
            .map_err(|_| Error::BadParameter)?;

        self.state.begin_request(PendingRequest {
            cmd_type: req.cmd_type,
            prefix,
            hooks,
            success_tokens,
        });

        debug!("TX: {}", req.cmd);
        if let Err(e) = self.send_all(&cmd).await {
            self.state.end_request();
            return Err(e);
        }

        self.wait(timeout).await
    }

    async fn wait(&self, timeout: Duration) -> Result<ResponseStatus, Error> {
        match with_timeout(timeout, self.state.wait_response()).await {
            Ok(result) => result,
            Err(_) => {
                warn!("No final result code within {} ms", timeout.as_millis());
                self.state.end_request();
                Err(PktStatus::Timeout.into())
            }
        }
    }

    async fn send_all(&self, data: &[u8]) -> Result<(), Error> {
        let sent = self.comm.send(data, Cfg::COMM_SEND_TIMEOUT).await?;
        if sent != data.len() {
            error!("Sent {} of {} bytes", sent, data.len());
            return Err(PktStatus::SendError.into());
        }
        Ok(())
    }

    pub fn set_network_registration_handler(
        &self,
        handler: Option<&'a dyn NetworkRegistrationHandler>,
    ) {
        self.state
            .with_shared(|s| s.handlers.network_registration = handler);
    }

    pub fn set_pdn_event_handler(&self, handler: Option<&'a dyn PdnEventHandler>) {
        self.state.with_shared(|s| s.handlers.pdn_event = handler);
    }

    pub fn set_signal_handler(&self, handler: Option<&'a dyn SignalHandler>) {
        self.state.with_shared(|s| s.handlers.signal = handler);
    }

    pub fn set_modem_event_handler(&self, handler: Option<&'a dyn ModemEventHandler>) {
        self.state.with_shared(|s| s.handlers.modem_event = handler);
    }

    /// Receives every URC the token table has no parser for.
    pub fn set_generic_urc_handler(&self, handler: Option<&'a dyn GenericUrcHandler>) {
        self.state.with_shared(|s| s.handlers.generic = handler);
    }

    /// Registration state as last reported by URCs or queries.
    pub fn service_status(&self) -> ServiceStatus {
        self.state
            .with_shared(|s| s.registration.service_status())
    }

    /// Signal as last reported by a URC or query.
    pub fn last_signal(&self) -> SignalInfo {
        self.state.with_shared(|s| s.signal)
    }

    pub fn create_socket(
        &self,
        context_id: u8,
        domain: SocketDomain,
        socket_type: SocketType,
        protocol: SocketProtocol,
    ) -> Result<SocketHandle, Error> {
        self.state.check_open()?;
        self.state
            .sockets
            .allocate(context_id, domain, socket_type, protocol)
    }

    pub fn remove_socket(&self, socket: SocketHandle) -> Result<(), Error> {
        self.state.sockets.remove(socket)
    }

    pub fn socket_state(&self, socket: SocketHandle) -> Result<SocketState, Error> {
        self.state.sockets.state(socket)
    }

    pub fn socket_info(&self, socket: SocketHandle) -> Result<SocketInfo, Error> {
        self.state.sockets.info(socket)
    }

    pub fn set_socket_option(&self, socket: SocketHandle, option: SocketOption) -> Result<(), Error> {
        self.state
            .sockets
            .with(socket, |s| s.set_option(option))?
    }

    pub fn set_socket_data_ready_callback(
        &self,
        socket: SocketHandle,
        callback: Option<&'a dyn SocketDataReady>,
    ) -> Result<(), Error> {
        self.state
            .sockets
            .set_data_ready_callback(socket, callback)
    }

    pub fn set_socket_opened_callback(
        &self,
        socket: SocketHandle,
        callback: Option<&'a dyn SocketOpened>,
    ) -> Result<(), Error> {
        self.state.sockets.set_opened_callback(socket, callback)
    }

    pub fn set_socket_closed_callback(
        &self,
        socket: SocketHandle,
        callback: Option<&'a dyn SocketClosed>,
    ) -> Result<(), Error> {
        self.state.sockets.set_closed_callback(socket, callback)
    }

    /// The socket table, for modem adapters driving socket state.
    pub fn sockets(&self) -> &SocketSet<'a> {
        &self.state.sockets
    }

    /// The PDN table, for modem adapters driving context state.
    pub fn pdn(&self) -> &PdnTable {
        &self.state.pdn
    }
}

fn validate(req: &AtRequest<'_>) -> Result<(), Error> {
    if req.cmd.is_empty() || req.cmd.len() > AT_CMD_MAX_SIZE {
        return Err(Error::BadParameter);
    }
    if req.cmd_type == AtCommandType::NoCommand {
        return Err(Error::BadParameter);
    }
    match req.prefix {
        Some(p) if p.is_empty() || p.len() > MAX_PREFIX_STRING_LENGTH => Err(Error::BadParameter),
        None if req.cmd_type.requires_prefix() => Err(Error::BadParameter),
        _ => Ok(()),
    }
}
