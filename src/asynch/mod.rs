pub mod control;
pub mod network;
pub mod resources;
pub mod runner;
pub mod state;
pub mod urc_handler;

use crate::comm::CommInterface;
use crate::config::CellularConfig;
use crate::error::Error;
use crate::token_table::TokenTable;

use self::control::Control;
use self::resources::Resources;
use self::runner::Runner;

/// Set up the engine on top of `comm`.
///
/// Fails with [`Error::BadParameter`] if `token_table` is inconsistent.
/// Nothing is sent until [`Runner::run`] has opened the comm interface.
pub fn new<'a, C: CommInterface, Cfg: CellularConfig>(
    resources: &'a Resources<'a>,
    comm: &'a C,
    token_table: TokenTable,
    _config: Cfg,
) -> Result<(Control<'a, C, Cfg>, Runner<'a, C, Cfg>), Error> {
    token_table.validate()?;

    let control = Control::new(&resources.state, comm, token_table);
    let runner = Runner::new(&resources.state, comm, token_table);

    Ok((control, runner))
}
