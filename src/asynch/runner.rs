use core::marker::PhantomData;

use embassy_futures::select::{select, Either};

use super::state::{LibraryStatus, PendingRequest, State};
use super::urc_handler;
use crate::comm::CommInterface;
use crate::config::CellularConfig;
use crate::error::{CommError, Error, PktStatus};
use crate::fmt::LossyStr;
use crate::pktio::{Frame, PacketIo};
use crate::response::{self, AtCommandType, MsgType, Progress};
use crate::token_table::TokenTable;
use crate::urc::UrcEvent;

/// Background runner of the engine.
///
/// You must call `.run()` in a background task for requests to complete and
/// URCs to be dispatched.
pub struct Runner<'a, C: CommInterface, Cfg: CellularConfig> {
    state: &'a State<'a>,
    comm: &'a C,
    table: TokenTable,
    pktio: PacketIo,
    _config: PhantomData<Cfg>,
}

impl<'a, C: CommInterface, Cfg: CellularConfig> Runner<'a, C, Cfg> {
    pub(crate) fn new(state: &'a State<'a>, comm: &'a C, table: TokenTable) -> Self {
        Self {
            state,
            comm,
            table,
            pktio: PacketIo::new(),
            _config: PhantomData,
        }
    }

    /// Open the comm interface and process received bytes until
    /// [`Control::close`](super::control::Control::close) is called or the
    /// comm interface fails.
    ///
    /// A failure of the comm interface fails the request in flight, moves
    /// every socket towards a failed or closed state, deactivates every PDN
    /// context and is returned.
    pub async fn run(&mut self) -> Result<(), Error> {
        self.state.set_library_status(LibraryStatus::Opening)?;

        if let Err(e) = self.comm.open().await {
            error!("Failed to open comm interface: {:?}", e);
            self.state.set_library_status(LibraryStatus::Closed)?;
            return Err(e.into());
        }
        self.state.shutdown.reset();
        self.pktio.reset();
        self.state.set_library_status(LibraryStatus::Open)?;
        info!("Cellular library open");

        let result = self.process().await;

        match result {
            Ok(()) => self.state.complete_request(Err(Error::LibraryNotOpen)),
            Err(e) => self.fail_all(e),
        }

        if let Err(e) = self.comm.close().await {
            warn!("Failed to close comm interface: {:?}", e);
        }
        self.state.set_library_status(LibraryStatus::Closed)?;
        info!("Cellular library closed");

        result
    }

    async fn process(&mut self) -> Result<(), Error> {
        loop {
            let recv = self
                .comm
                .recv(self.pktio.spare_mut(), Cfg::COMM_RECV_TIMEOUT);

            match select(self.state.shutdown.wait(), recv).await {
                Either::First(()) => return Ok(()),
                Either::Second(Ok(n)) => {
                    self.pktio.commit(n);
                    self.process_frames();
                }
                // Nothing received, the interface is idle.
                Either::Second(Err(CommError::Timeout)) => {}
                Either::Second(Err(e)) => {
                    error!("Comm interface failed: {:?}", e);
                    return Err(Error::Comm(e));
                }
            }
        }
    }

    fn process_frames(&mut self) {
        loop {
            let pending = self.state.pending();
            let Some((frame, consumed)) =
                self.pktio.next_frame(&pending.hooks, Cfg::LINE_TERMINATION)
            else {
                break;
            };

            match frame {
                Frame::Line(range) => {
                    let bytes = self.pktio.slice(range);
                    match core::str::from_utf8(bytes) {
                        Ok(line) => handle_line(self.state, &self.table, &pending, line),
                        Err(_) => warn!("Dropping non UTF-8 line {:?}", LossyStr(bytes)),
                    }
                }
                Frame::Data(range) => {
                    handle_data(self.state, &pending, self.pktio.slice(range));
                }
            }
            self.pktio.consume(consumed);
        }

        if self.pktio.is_full() {
            error!("Read buffer exhausted by an incomplete frame, dropping it");
            self.pktio.reset();
        }
    }

    fn fail_all(&self, error: Error) {
        self.state.complete_request(Err(error));
        self.state.sockets.fail_all();

        let handler = self.state.handlers().pdn_event;
        for context_id in self.state.pdn.deactivate_all() {
            warn!("PDN {} lost with the comm interface", context_id);
            if let Some(handler) = handler {
                handler.on_pdn_event(UrcEvent::PdnDeactivated, context_id);
            }
        }
    }
}

fn handle_line(state: &State<'_>, table: &TokenTable, pending: &PendingRequest, line: &str) {
    trace!("RX: {}", line);

    let prefix = pending.prefix.as_deref();
    match response::msg_type(table, pending.cmd_type, prefix, line) {
        MsgType::Solicited => {
            let progress = state.with_response(|resp| {
                response::process_line(
                    table,
                    pending.success_tokens,
                    pending.cmd_type,
                    prefix,
                    resp,
                    line,
                )
            });
            if let Progress::Complete(status) = progress {
                state.complete_request(Ok(status));
            }
        }
        MsgType::Unsolicited => urc_handler::dispatch(state, table, line),
        MsgType::Undefined => {
            warn!("Undefined line, handling as URC: {}", line);
            urc_handler::dispatch(state, table, line);
        }
    }
}

fn handle_data(state: &State<'_>, pending: &PendingRequest, data: &[u8]) {
    if pending.cmd_type == AtCommandType::NoCommand {
        warn!("Dropping {} payload bytes without a pending request", data.len());
        return;
    }

    trace!("RX {} payload bytes", data.len());
    if state.with_response(|resp| resp.push_data(data)).is_err() {
        error!("Payload of {} bytes does not fit the response", data.len());
        state.complete_request(Err(PktStatus::SizeMismatch.into()));
    }
}
