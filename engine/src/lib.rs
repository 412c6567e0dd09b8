pub mod local_bus;
pub mod local_channel;
pub mod relay;
pub mod schedule;

/// Rules of a game expressed as a transition over an owned state.
///
/// `step` consumes the previous state and hands back its replacement, so the
/// caller never keeps a second handle to state that is being mutated.
pub trait GameLogic {
    type State;
    type Input;

    fn initial_state(&self) -> Self::State;
    fn step(&self, state: Self::State, input: Self::Input) -> Self::State;
}

/// Exclusive owner of one authoritative game state.
///
/// Everything outside the simulation only ever sees `&G::State`.
#[derive(Debug)]
pub struct Simulation<G: GameLogic> {
    game: G,
    state: G::State,
    applied: usize,
}

impl<G> Simulation<G>
where
    G: GameLogic,
    G::State: Default,
{
    pub fn new(game: G) -> Self {
        let state = game.initial_state();
        Self {
            game,
            state,
            applied: 0,
        }
    }

    /// Resume from a state built elsewhere instead of `initial_state`.
    pub fn with_state(game: G, state: G::State) -> Self {
        Self {
            game,
            state,
            applied: 0,
        }
    }

    pub fn game(&self) -> &G {
        &self.game
    }

    pub fn state(&self) -> &G::State {
        &self.state
    }

    /// Number of inputs fed through `step` since construction.
    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn step(&mut self, input: G::Input) -> &G::State {
        let previous = std::mem::take(&mut self.state);
        self.state = self.game.step(previous, input);
        self.applied += 1;
        &self.state
    }

    pub fn run<I>(&mut self, inputs: I) -> usize
    where
        I: IntoIterator<Item = G::Input>,
    {
        for input in inputs {
            self.step(input);
        }
        self.applied
    }

    /// Throws the current state away and starts over from `initial_state`.
    pub fn reset(&mut self) {
        self.state = self.game.initial_state();
        self.applied = 0;
    }
}
