use std::time::Duration;

use engine::{Simulation, local_channel::LocalChannel, schedule::PeriodicTimer};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::MissedTickBehavior,
};

use crate::action::Action;
use crate::logic::{BlockLogic, Input};
use crate::protocol::{ControlMessage, RunState, decode_action};
use crate::settings::{PreferenceStore, Preferences};
use crate::tetris_core::{GameRun, RunSnapshot};

pub const RUN_STATE_PERIOD: Duration = Duration::from_millis(500);

/// Owns the one authoritative run on the display side.
///
/// Actions arriving from either transport are applied as they come, with no
/// de-duplication. Renderers get snapshots through [`DisplayHost::subscribe`].
#[derive(Debug)]
pub struct DisplayHost {
    sim: Simulation<BlockLogic>,
    gravity: PeriodicTimer,
    high_score: u32,
    preferences: Option<(PreferenceStore, Preferences)>,
    snapshots: watch::Sender<RunSnapshot>,
}

impl DisplayHost {
    pub fn new(seed: u64) -> Self {
        let sim = Simulation::new(BlockLogic::new(seed));
        let (snapshots, _) = watch::channel(sim.state().snapshot());
        Self {
            sim,
            gravity: PeriodicTimer::idle(),
            high_score: 0,
            preferences: None,
            snapshots,
        }
    }

    /// Host a run prepared elsewhere, with gravity synced to its state.
    ///
    /// Meant for tests that need a board no sequence of actions reaches
    /// quickly. Must be called inside a tokio runtime when `run` is live.
    pub fn with_run_for_test(seed: u64, run: GameRun) -> Self {
        let sim = Simulation::with_state(BlockLogic::new(seed), run);
        let (snapshots, _) = watch::channel(sim.state().snapshot());
        let mut host = Self {
            sim,
            gravity: PeriodicTimer::idle(),
            high_score: 0,
            preferences: None,
            snapshots,
        };
        host.sync_gravity(true);
        host
    }

    /// Load the stored high score and persist new bests to `store`.
    pub fn with_preferences(mut self, store: PreferenceStore) -> Self {
        let prefs = store.load();
        self.high_score = prefs.high_score;
        self.preferences = Some((store, prefs));
        self
    }

    pub fn state(&self) -> &GameRun {
        self.sim.state()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.sim.state().snapshot()
    }

    pub fn run_state(&self) -> RunState {
        self.sim.state().run_state()
    }

    pub fn high_score(&self) -> u32 {
        self.high_score
    }

    /// Inputs applied so far, gravity ticks included.
    pub fn applied(&self) -> usize {
        self.sim.applied()
    }

    pub fn gravity_period(&self) -> Option<Duration> {
        self.gravity.period()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn apply_action(&mut self, action: Action) {
        let before = self.run_state();
        let fresh_run = action == Action::Restart
            || (action == Action::Start && (!before.is_running || before.is_game_over));
        let cleared = self.advance(Input::Action(action));
        self.sync_gravity(fresh_run || cleared);
    }

    pub fn on_gravity_tick(&mut self) {
        let cleared = self.advance(Input::Gravity);
        self.sync_gravity(cleared);
    }

    /// Decode a relay frame and apply it. Frames that do not decode are dropped.
    pub fn handle_wire(&mut self, text: &str) {
        match decode_action(text) {
            Ok(action) => self.apply_action(action),
            Err(err) => log::debug!("dropping relay frame {text:?}: {err}"),
        }
    }

    pub fn handle_local(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Action { action } => self.apply_action(action),
            // Our own status or another display's; nothing to do.
            ControlMessage::RunState(_) => {}
        }
    }

    /// Post the coarse run state if anyone else is on the channel.
    pub fn emit_run_state(&self, local: &LocalChannel<ControlMessage>) -> bool {
        if local.listeners() == 0 {
            return false;
        }
        local.post(ControlMessage::RunState(self.run_state()));
        true
    }

    /// Returns whether the input cleared at least one line.
    fn advance(&mut self, input: Input) -> bool {
        let was_over = self.sim.state().is_game_over();
        let lines_before = self.sim.state().lines_cleared();
        let state = self.sim.step(input);
        let cleared = state.lines_cleared() > lines_before;
        let ended_with = (!was_over && state.is_game_over()).then(|| state.score());
        self.snapshots.send_replace(state.snapshot());

        if let Some(score) = ended_with {
            self.record_score(score);
        }
        cleared
    }

    /// Run gravity exactly when the run is live, at the current level's speed.
    ///
    /// `new_phase` restarts the period from now; otherwise an unchanged
    /// interval keeps ticking on its current phase.
    fn sync_gravity(&mut self, new_phase: bool) {
        let state = self.sim.state();
        if state.gravity_active() {
            let interval = state.drop_interval();
            if new_phase {
                self.gravity.schedule(interval);
                log::debug!("gravity every {}ms from now", interval.as_millis());
            } else if self.gravity.ensure(interval) {
                log::debug!("gravity every {}ms", interval.as_millis());
            }
        } else if self.gravity.is_scheduled() {
            self.gravity.cancel();
            log::debug!("gravity stopped");
        }
    }

    fn record_score(&mut self, score: u32) {
        if score <= self.high_score {
            return;
        }
        self.high_score = score;
        log::info!("new high score {score}");

        if let Some((store, prefs)) = self.preferences.as_mut() {
            prefs.record_score(score);
            if let Err(err) = store.save(prefs) {
                log::warn!("could not save high score to {:?}: {err}", store.path());
            }
        }
    }

    /// Drive the run until `shutdown` fires or the local channel goes away.
    ///
    /// Everything that touches the run happens on this one task: relay frames,
    /// local messages, gravity ticks and the periodic run-state post.
    pub async fn run(
        mut self,
        mut local: LocalChannel<ControlMessage>,
        mut network: Option<mpsc::UnboundedReceiver<String>>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Self {
        let mut status = tokio::time::interval(RUN_STATE_PERIOD);
        status.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                frame = next_frame(&mut network) => match frame {
                    Some(text) => self.handle_wire(&text),
                    None => {
                        log::warn!("relay link closed; continuing on the local channel");
                        network = None;
                    }
                },
                message = local.recv() => match message {
                    Some(message) => self.handle_local(message),
                    None => break,
                },
                _ = self.gravity.tick() => self.on_gravity_tick(),
                _ = status.tick() => {
                    self.emit_run_state(&local);
                }
            }
        }

        self.gravity.cancel();
        self
    }
}

async fn next_frame(network: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match network {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
