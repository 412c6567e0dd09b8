use crate::tetris_core::{Color, Piece, RunSnapshot};

fn glyph(cell: Option<Color>) -> char {
    match cell {
        None => '.',
        Some(Color::Cyan) => 'I',
        Some(Color::Yellow) => 'O',
        Some(Color::Purple) => 'T',
        Some(Color::Green) => 'S',
        Some(Color::Red) => 'Z',
        Some(Color::Blue) => 'J',
        Some(Color::Orange) => 'L',
    }
}

fn status_label(snapshot: &RunSnapshot) -> &'static str {
    if snapshot.game_over {
        "GAME OVER"
    } else if snapshot.paused {
        "PAUSED"
    } else if snapshot.running {
        "RUNNING"
    } else {
        "PRESS START"
    }
}

/// Plain-text board for terminals: one line per row, then a stats line.
pub fn render_text(snapshot: &RunSnapshot) -> String {
    let mut out = String::new();
    for row in &snapshot.board {
        out.push('|');
        out.extend(row.iter().map(|cell| glyph(*cell)));
        out.push_str("|\n");
    }
    let next = snapshot
        .next_piece
        .map_or_else(|| "-".to_string(), |piece: Piece| format!("{piece:?}"));
    out.push_str(&format!(
        "{}  score {}  lines {}  level {}  next {}\n",
        status_label(snapshot),
        snapshot.score,
        snapshot.lines_cleared,
        snapshot.level,
        next
    ));
    out
}
