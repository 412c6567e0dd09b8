use std::{ops::Add, time::Duration};

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::protocol::RunState;

pub const BOARD_WIDTH: usize = 10;
pub const BOARD_HEIGHT: usize = 20;
pub const LINES_PER_LEVEL: u32 = 10;

const HARD_DROP_POINTS_PER_ROW: u32 = 2;
const LINE_CLEAR_POINTS: [u32; 5] = [0, 100, 300, 500, 800];
/// Horizontal offsets tried, in order, after an in-place rotation collides.
const KICK_OFFSETS: [i32; 4] = [-1, 1, -2, 2];

const BASE_DROP_INTERVAL_MS: u64 = 700;
const DROP_INTERVAL_STEP_MS: u64 = 50;
const MIN_DROP_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Color {
    Cyan,
    Yellow,
    Purple,
    Green,
    Red,
    Blue,
    Orange,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Piece {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl Piece {
    pub const ALL: [Piece; 7] = [
        Piece::I,
        Piece::O,
        Piece::T,
        Piece::S,
        Piece::Z,
        Piece::J,
        Piece::L,
    ];

    pub fn color(self) -> Color {
        match self {
            Piece::I => Color::Cyan,
            Piece::O => Color::Yellow,
            Piece::T => Color::Purple,
            Piece::S => Color::Green,
            Piece::Z => Color::Red,
            Piece::J => Color::Blue,
            Piece::L => Color::Orange,
        }
    }

    /// The rotation-0 cell matrix.
    pub fn base_shape(self) -> Shape {
        match self {
            Piece::I => Shape::from_rows(&[&[1, 1, 1, 1]]),
            Piece::O => Shape::from_rows(&[&[1, 1], &[1, 1]]),
            Piece::T => Shape::from_rows(&[&[0, 1, 0], &[1, 1, 1]]),
            Piece::S => Shape::from_rows(&[&[0, 1, 1], &[1, 1, 0]]),
            Piece::Z => Shape::from_rows(&[&[1, 1, 0], &[0, 1, 1]]),
            Piece::J => Shape::from_rows(&[&[1, 0, 0], &[1, 1, 1]]),
            Piece::L => Shape::from_rows(&[&[0, 0, 1], &[1, 1, 1]]),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vec2i {
    pub x: i32,
    pub y: i32,
}

impl Vec2i {
    pub const ZERO: Vec2i = Vec2i { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Add for Vec2i {
    type Output = Vec2i;

    fn add(self, rhs: Vec2i) -> Self::Output {
        Vec2i::new(self.x + rhs.x, self.y + rhs.y)
    }
}

/// A rectangular cell matrix, `rows[row][col]`, row 0 on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    rows: Vec<Vec<bool>>,
}

impl Shape {
    pub fn from_rows(rows: &[&[u8]]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|row| row.iter().map(|&cell| cell != 0).collect())
                .collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<bool>] {
        &self.rows
    }

    /// Occupied cells as `(col, row)` offsets within the matrix.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows.iter().enumerate().flat_map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .filter(|(_, filled)| **filled)
                .map(move |(col, _)| (col, row))
        })
    }

    /// A new matrix turned 90 degrees clockwise: transpose, then reverse each row.
    pub fn rotated_cw(&self) -> Shape {
        let height = self.height();
        let rows = (0..self.width())
            .map(|col| (0..height).rev().map(|row| self.rows[row][col]).collect())
            .collect();
        Shape { rows }
    }
}

/// The falling piece: a shape plus the board position of its matrix origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePiece {
    kind: Piece,
    shape: Shape,
    pos: Vec2i,
}

impl ActivePiece {
    pub fn new(kind: Piece, pos: Vec2i) -> Self {
        Self {
            kind,
            shape: kind.base_shape(),
            pos,
        }
    }

    /// Centered horizontally on the top row.
    pub fn spawn(kind: Piece) -> Self {
        let shape = kind.base_shape();
        let x = (BOARD_WIDTH / 2) as i32 - (shape.width() / 2) as i32;
        Self {
            kind,
            shape,
            pos: Vec2i::new(x, 0),
        }
    }

    pub fn kind(&self) -> Piece {
        self.kind
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn pos(&self) -> Vec2i {
        self.pos
    }

    /// Occupied cells in board coordinates.
    pub fn cells(&self) -> impl Iterator<Item = Vec2i> + '_ {
        self.shape
            .cells()
            .map(|(col, row)| self.pos + Vec2i::new(col as i32, row as i32))
    }

    pub fn top_row(&self) -> i32 {
        self.cells().map(|cell| cell.y).min().unwrap_or(self.pos.y)
    }

    pub fn shifted(&self, dx: i32, dy: i32) -> Self {
        Self {
            pos: self.pos + Vec2i::new(dx, dy),
            ..self.clone()
        }
    }

    pub fn rotated(&self) -> Self {
        Self {
            shape: self.shape.rotated_cw(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: Vec<Vec<Option<Color>>>,
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

impl Board {
    pub fn empty() -> Self {
        Self {
            cells: vec![empty_row(); BOARD_HEIGHT],
        }
    }

    pub fn rows(&self) -> &[Vec<Option<Color>>] {
        &self.cells
    }

    pub fn get(&self, x: i32, y: i32) -> Option<Color> {
        if x < 0 || y < 0 {
            return None;
        }
        self.cells
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
            .flatten()
    }

    pub fn is_occupied(&self, x: i32, y: i32) -> bool {
        self.get(x, y).is_some()
    }

    pub fn set(&mut self, x: usize, y: usize, cell: Option<Color>) {
        if y < BOARD_HEIGHT && x < BOARD_WIDTH {
            self.cells[y][x] = cell;
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().flatten().filter(|cell| cell.is_some()).count()
    }

    /// Write the piece's cells into the board. Cells above the top row are dropped.
    pub fn merge(&mut self, piece: &ActivePiece) {
        let color = piece.kind().color();
        for cell in piece.cells() {
            if cell.x >= 0 && cell.y >= 0 {
                self.set(cell.x as usize, cell.y as usize, Some(color));
            }
        }
    }

    /// Remove every full row and push the rest down, inserting empty rows on top.
    pub fn clear_lines(&mut self) -> usize {
        let before = self.cells.len();
        self.cells.retain(|row| row.iter().any(Option::is_none));
        let cleared = before - self.cells.len();
        for _ in 0..cleared {
            self.cells.insert(0, empty_row());
        }
        cleared
    }
}

fn empty_row() -> Vec<Option<Color>> {
    vec![None; BOARD_WIDTH]
}

/// Whether `piece` leaves the well or overlaps a settled cell.
///
/// Cells above row 0 only collide with the side walls, which lets pieces
/// sit partly above the visible board.
pub fn collides(piece: &ActivePiece, board: &Board) -> bool {
    piece.cells().any(|cell| {
        cell.x < 0
            || cell.x >= BOARD_WIDTH as i32
            || cell.y >= BOARD_HEIGHT as i32
            || (cell.y >= 0 && board.is_occupied(cell.x, cell.y))
    })
}

pub fn line_clear_points(lines: usize, level: u32) -> u32 {
    LINE_CLEAR_POINTS
        .get(lines)
        .copied()
        .unwrap_or(LINE_CLEAR_POINTS[4])
        .saturating_mul(level)
}

pub fn level_for_lines(lines_cleared: u32) -> u32 {
    lines_cleared / LINES_PER_LEVEL + 1
}

pub fn drop_interval_for_level(level: u32) -> Duration {
    let speedup = u64::from(level.saturating_sub(1)).saturating_mul(DROP_INTERVAL_STEP_MS);
    let ms = BASE_DROP_INTERVAL_MS
        .saturating_sub(speedup)
        .max(MIN_DROP_INTERVAL_MS);
    Duration::from_millis(ms)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescentResult {
    Moved,
    Locked { lines: usize },
    GameOver,
    NoActivePiece,
}

/// Read-only view of a run for renderers and UIs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    /// Settled cells with the active piece drawn on top, row 0 first.
    pub board: Vec<Vec<Option<Color>>>,
    pub active_piece: Option<Piece>,
    pub active_pos: Option<Vec2i>,
    pub next_piece: Option<Piece>,
    pub score: u32,
    pub lines_cleared: u32,
    pub level: u32,
    pub running: bool,
    pub paused: bool,
    pub game_over: bool,
    pub drop_interval_ms: u64,
}

/// The authoritative state of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRun {
    board: Board,
    active: Option<ActivePiece>,
    next: Option<Piece>,
    score: u32,
    lines_cleared: u32,
    level: u32,
    running: bool,
    paused: bool,
    game_over: bool,
    rng: Pcg32,
}

impl Default for GameRun {
    fn default() -> Self {
        Self::idle(0)
    }
}

impl GameRun {
    /// Nothing started yet: empty board, no pieces, all flags down.
    pub fn idle(seed: u64) -> Self {
        Self {
            board: Board::empty(),
            active: None,
            next: None,
            score: 0,
            lines_cleared: 0,
            level: 1,
            running: false,
            paused: false,
            game_over: false,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn active_piece(&self) -> Option<&ActivePiece> {
        self.active.as_ref()
    }

    pub fn next_piece(&self) -> Option<Piece> {
        self.next
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn lines_cleared(&self) -> u32 {
        self.lines_cleared
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn run_state(&self) -> RunState {
        RunState {
            is_running: self.running,
            is_paused: self.paused,
            is_game_over: self.game_over,
        }
    }

    /// Whether the gravity timer should be running.
    pub fn gravity_active(&self) -> bool {
        self.run_state().is_live()
    }

    pub fn drop_interval(&self) -> Duration {
        drop_interval_for_level(self.level)
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let mut board = self.board.clone();
        if let Some(piece) = &self.active {
            board.merge(piece);
        }
        RunSnapshot {
            board: board.cells,
            active_piece: self.active.as_ref().map(ActivePiece::kind),
            active_pos: self.active.as_ref().map(ActivePiece::pos),
            next_piece: self.next,
            score: self.score,
            lines_cleared: self.lines_cleared,
            level: self.level,
            running: self.running,
            paused: self.paused,
            game_over: self.game_over,
            drop_interval_ms: self.drop_interval().as_millis() as u64,
        }
    }

    pub fn set_active_piece_for_test(&mut self, piece: ActivePiece) {
        self.active = Some(piece);
    }

    pub fn set_next_piece_for_test(&mut self, piece: Piece) {
        self.next = Some(piece);
    }

    pub fn set_lines_cleared_for_test(&mut self, lines_cleared: u32) {
        self.lines_cleared = lines_cleared;
        self.level = level_for_lines(lines_cleared);
    }

    pub fn set_cell_for_test(&mut self, x: usize, y: usize, cell: Option<Color>) {
        self.board.set(x, y, cell);
    }

    /// Apply one player action. Actions whose precondition fails are no-ops.
    pub fn apply(&mut self, action: Action) {
        if !action.is_accepted(self.run_state()) {
            log::debug!("ignoring {action} in {:?}", self.run_state());
            return;
        }

        match action {
            Action::Start => self.start(),
            Action::Restart => self.begin_fresh(),
            Action::Pause => self.paused = !self.paused,
            Action::MoveLeft => {
                self.try_shift(-1);
            }
            Action::MoveRight => {
                self.try_shift(1);
            }
            Action::Rotate => {
                self.try_rotate();
            }
            Action::SoftDrop => {
                self.step_down();
            }
            Action::HardDrop => {
                self.hard_drop();
            }
        }
    }

    /// One gravity tick. Does nothing unless the run is live.
    pub fn tick(&mut self) -> Option<DescentResult> {
        if !self.gravity_active() {
            return None;
        }
        Some(self.step_down())
    }

    fn start(&mut self) {
        if !self.running || self.game_over {
            self.begin_fresh();
            return;
        }
        self.paused = false;
    }

    fn begin_fresh(&mut self) {
        self.board = Board::empty();
        self.score = 0;
        self.lines_cleared = 0;
        self.level = 1;
        self.running = true;
        self.paused = false;
        self.game_over = false;
        let first = self.draw_piece();
        self.active = Some(ActivePiece::spawn(first));
        self.next = Some(self.draw_piece());
        log::info!("run started with {first:?}");
    }

    fn draw_piece(&mut self) -> Piece {
        Piece::ALL[self.rng.random_range(0..Piece::ALL.len())]
    }

    pub fn try_shift(&mut self, dx: i32) -> bool {
        let Some(piece) = &self.active else {
            return false;
        };
        let moved = piece.shifted(dx, 0);
        if collides(&moved, &self.board) {
            return false;
        }
        self.active = Some(moved);
        true
    }

    pub fn try_rotate(&mut self) -> bool {
        let Some(piece) = &self.active else {
            return false;
        };
        let rotated = piece.rotated();
        let placement = std::iter::once(0)
            .chain(KICK_OFFSETS)
            .map(|dx| rotated.shifted(dx, 0))
            .find(|candidate| !collides(candidate, &self.board));

        match placement {
            Some(placed) => {
                self.active = Some(placed);
                true
            }
            None => false,
        }
    }

    /// The single-row descent shared by gravity and soft drop.
    pub fn step_down(&mut self) -> DescentResult {
        let Some(piece) = &self.active else {
            return DescentResult::NoActivePiece;
        };
        let lowered = piece.shifted(0, 1);
        if !collides(&lowered, &self.board) {
            self.active = Some(lowered);
            return DescentResult::Moved;
        }
        self.lock_active_piece()
    }

    /// Returns the number of rows descended before the lock.
    pub fn hard_drop(&mut self) -> u32 {
        let Some(mut piece) = self.active.clone() else {
            return 0;
        };
        let mut rows = 0u32;
        loop {
            let lowered = piece.shifted(0, 1);
            if collides(&lowered, &self.board) {
                break;
            }
            piece = lowered;
            rows += 1;
        }
        self.active = Some(piece);
        self.score = self
            .score
            .saturating_add(rows.saturating_mul(HARD_DROP_POINTS_PER_ROW));
        self.step_down();
        rows
    }

    fn lock_active_piece(&mut self) -> DescentResult {
        let Some(piece) = self.active.take() else {
            return DescentResult::NoActivePiece;
        };
        self.board.merge(&piece);

        if piece.top_row() <= 0 {
            self.game_over = true;
            self.paused = false;
            log::info!(
                "game over: score {} lines {} level {}",
                self.score,
                self.lines_cleared,
                self.level
            );
            return DescentResult::GameOver;
        }

        let lines = self.board.clear_lines();
        self.score = self
            .score
            .saturating_add(line_clear_points(lines, self.level));
        self.lines_cleared = self.lines_cleared.saturating_add(lines as u32);
        self.level = level_for_lines(self.lines_cleared);

        let promoted = match self.next.take() {
            Some(piece) => piece,
            None => self.draw_piece(),
        };
        self.active = Some(ActivePiece::spawn(promoted));
        self.next = Some(self.draw_piece());

        DescentResult::Locked { lines }
    }
}

/// `transition(state, action) -> state'`: consume a run, return its successor.
pub fn transition(mut state: GameRun, action: Action) -> GameRun {
    state.apply(action);
    state
}

/// Gravity's counterpart to [`transition`].
pub fn gravity_tick(mut state: GameRun) -> GameRun {
    state.tick();
    state
}
