use super::state::State;

/// Storage for everything the engine shares between [`Control`] and
/// [`Runner`]. Must outlive both.
///
/// [`Control`]: super::control::Control
/// [`Runner`]: super::runner::Runner
pub struct Resources<'a> {
    pub(crate) state: State<'a>,
}

impl<'a> Default for Resources<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Resources<'a> {
    pub fn new() -> Self {
        Self {
            state: State::new(),
        }
    }
}
