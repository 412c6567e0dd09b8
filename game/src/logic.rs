use engine::GameLogic;

use crate::action::Action;
use crate::tetris_core::{GameRun, gravity_tick, transition};

/// What can drive a run forward: a player action or the gravity timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Action(Action),
    Gravity,
}

impl From<Action> for Input {
    fn from(action: Action) -> Self {
        Input::Action(action)
    }
}

#[derive(Debug, Clone)]
pub struct BlockLogic {
    seed: u64,
}

impl BlockLogic {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl GameLogic for BlockLogic {
    type State = GameRun;
    type Input = Input;

    fn initial_state(&self) -> Self::State {
        GameRun::idle(self.seed)
    }

    fn step(&self, state: Self::State, input: Self::Input) -> Self::State {
        match input {
            Input::Action(action) => transition(state, action),
            Input::Gravity => gravity_tick(state),
        }
    }
}
