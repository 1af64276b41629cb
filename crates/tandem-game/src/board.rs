//! Connect Four board and rules.
//!
//! Row 0 is the top of the board; pieces fall towards row `ROWS - 1`.

use std::fmt;

use serde::{Deserialize, Serialize};
use tandem_session::Role;

pub const ROWS: usize = 6;
pub const COLS: usize = 7;

/// The two seats. The host always plays [`Player::One`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    One,
    Two,
}

impl Player {
    pub fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }

    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Host => Self::One,
            Role::Collaborator => Self::Two,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => f.write_str("player one"),
            Self::Two => f.write_str("player two"),
        }
    }
}

// right, down, down-right, up-right
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (-1, 1)];

/// A 6×7 grid of optional pieces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board([[Option<Player>; COLS]; ROWS]);

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// The piece at `(row, col)`. Out-of-range cells are empty.
    pub fn get(&self, row: usize, col: usize) -> Option<Player> {
        self.0.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    /// The row a piece dropped into `col` would land in, or `None` when the
    /// column is full or out of range.
    pub fn lowest_empty_row(&self, col: usize) -> Option<usize> {
        if col >= COLS {
            return None;
        }
        (0..ROWS).rev().find(|&row| self.0[row][col].is_none())
    }

    /// Drops a piece and returns the row it landed in.
    pub fn drop_piece(&mut self, col: usize, player: Player) -> Option<usize> {
        let row = self.lowest_empty_row(col)?;
        self.0[row][col] = Some(player);
        Some(row)
    }

    /// Whether `player` has four in a row in any direction.
    pub fn has_four(&self, player: Player) -> bool {
        (0..ROWS).any(|row| {
            (0..COLS).any(|col| {
                DIRECTIONS
                    .iter()
                    .any(|&(dr, dc)| self.run_of_four(row, col, dr, dc, player))
            })
        })
    }

    fn run_of_four(&self, row: usize, col: usize, dr: isize, dc: isize, player: Player) -> bool {
        (0..4).all(|step| {
            let r = row as isize + dr * step;
            let c = col as isize + dc * step;
            r >= 0 && c >= 0 && self.get(r as usize, c as usize) == Some(player)
        })
    }

    pub fn is_full(&self) -> bool {
        self.0.iter().all(|row| row.iter().all(Option::is_some))
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|row| row.iter().all(Option::is_none))
    }

    /// Number of pieces in `col`.
    pub fn column_height(&self, col: usize) -> usize {
        (0..ROWS).filter(|&row| self.get(row, col).is_some()).count()
    }

    pub fn piece_count(&self) -> usize {
        self.0.iter().flatten().filter(|cell| cell.is_some()).count()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.0 {
            for cell in row {
                let mark = match cell {
                    Some(Player::One) => 'X',
                    Some(Player::Two) => 'O',
                    None => '.',
                };
                write!(f, "{mark}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_from(moves: &[(usize, Player)]) -> Board {
        let mut board = Board::new();
        for &(col, player) in moves {
            board.drop_piece(col, player).unwrap();
        }
        board
    }

    #[test]
    fn test_pieces_stack_from_the_bottom() {
        let mut board = Board::new();
        assert_eq!(board.drop_piece(3, Player::One), Some(ROWS - 1));
        assert_eq!(board.drop_piece(3, Player::Two), Some(ROWS - 2));
        assert_eq!(board.column_height(3), 2);
        assert_eq!(board.get(ROWS - 1, 3), Some(Player::One));
    }

    #[test]
    fn test_full_column_rejects_drop() {
        let mut board = Board::new();
        for i in 0..ROWS {
            let player = if i % 2 == 0 { Player::One } else { Player::Two };
            board.drop_piece(0, player).unwrap();
        }
        assert_eq!(board.lowest_empty_row(0), None);
        assert_eq!(board.drop_piece(0, Player::One), None);
    }

    #[test]
    fn test_out_of_range_column() {
        let mut board = Board::new();
        assert_eq!(board.lowest_empty_row(COLS), None);
        assert_eq!(board.drop_piece(COLS, Player::One), None);
        assert_eq!(board.get(ROWS, 0), None);
    }

    #[test]
    fn test_horizontal_win() {
        let board = board_from(&[(0, Player::One), (1, Player::One), (2, Player::One), (3, Player::One)]);
        assert!(board.has_four(Player::One));
        assert!(!board.has_four(Player::Two));
    }

    #[test]
    fn test_vertical_win() {
        let board = board_from(&[(6, Player::Two), (6, Player::Two), (6, Player::Two), (6, Player::Two)]);
        assert!(board.has_four(Player::Two));
    }

    #[test]
    fn test_diagonal_wins() {
        // Rising to the right from the bottom-left corner.
        let rising = board_from(&[
            (0, Player::One),
            (1, Player::Two),
            (1, Player::One),
            (2, Player::Two),
            (2, Player::Two),
            (2, Player::One),
            (3, Player::Two),
            (3, Player::Two),
            (3, Player::Two),
            (3, Player::One),
        ]);
        assert!(rising.has_four(Player::One));

        // Falling to the right.
        let falling = board_from(&[
            (3, Player::One),
            (2, Player::Two),
            (2, Player::One),
            (1, Player::Two),
            (1, Player::Two),
            (1, Player::One),
            (0, Player::Two),
            (0, Player::Two),
            (0, Player::Two),
            (0, Player::One),
        ]);
        assert!(falling.has_four(Player::One));
    }

    #[test]
    fn test_three_is_not_a_win() {
        let board = board_from(&[(0, Player::One), (1, Player::One), (2, Player::One)]);
        assert!(!board.has_four(Player::One));
    }

    #[test]
    fn test_full_board() {
        let mut board = Board::new();
        assert!(board.is_empty());
        // Column pairs alternate so no four-in-a-row forms.
        for col in 0..COLS {
            for row in 0..ROWS {
                let flip = (row / 2 + col) % 2 == 0;
                let player = if flip { Player::One } else { Player::Two };
                board.drop_piece(col, player).unwrap();
            }
        }
        assert!(board.is_full());
        assert_eq!(board.piece_count(), ROWS * COLS);
    }

    #[test]
    fn test_player_for_role() {
        assert_eq!(Player::for_role(Role::Host), Player::One);
        assert_eq!(Player::for_role(Role::Collaborator), Player::Two);
        assert_eq!(Player::One.other(), Player::Two);
    }

    #[test]
    fn test_board_display() {
        let board = board_from(&[(0, Player::One), (1, Player::Two)]);
        let text = board.to_string();
        assert_eq!(text.lines().count(), ROWS);
        assert_eq!(text.lines().last(), Some("XO....."));
    }
}
