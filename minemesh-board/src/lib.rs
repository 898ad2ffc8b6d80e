//! # minemesh-board: Minefield model for minemesh
//!
//! The game-logic collaborator of the sync layer. The sync layer treats a
//! [`Board`] as an opaque replicated value and only ever calls a
//! [`BoardGenerator`] once, when a session starts.

pub mod board;

pub use board::{generate_board, generate_board_with, Board, BoardError, Cell, RevealOutcome};

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Produces the initial board for a new session.
pub trait BoardGenerator {
    fn generate(&self, width: u32, height: u32, bombs: u32) -> Result<Board, BoardError>;
}

/// Uniform random bomb placement.
///
/// With a seed every call yields the same board, which keeps tests and
/// benchmarks reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomBoard {
    pub seed: Option<u64>,
}

impl RandomBoard {
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }
}

impl BoardGenerator for RandomBoard {
    fn generate(&self, width: u32, height: u32, bombs: u32) -> Result<Board, BoardError> {
        log::debug!("Generating {width}x{height} board with {bombs} bombs");
        match self.seed {
            Some(seed) => generate_board_with(&mut StdRng::seed_from_u64(seed), width, height, bombs),
            None => generate_board(width, height, bombs),
        }
    }
}

/// Any `Fn(width, height, bombs)` works as a generator.
impl<F> BoardGenerator for F
where
    F: Fn(u32, u32, u32) -> Result<Board, BoardError>,
{
    fn generate(&self, width: u32, height: u32, bombs: u32) -> Result<Board, BoardError> {
        self(width, height, bombs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_generator_is_stable() {
        let gen = RandomBoard::seeded(42);
        assert_eq!(gen.generate(9, 9, 10).unwrap(), gen.generate(9, 9, 10).unwrap());
    }

    #[test]
    fn test_closure_generator() {
        let empty = |w: u32, h: u32, _bombs: u32| Board::with_bombs(w, h, &[]);
        let board = empty.generate(5, 5, 3).unwrap();
        assert_eq!(board.bomb_count(), 0);
    }

    #[test]
    fn test_board_json_shape() {
        let board = Board::with_bombs(2, 1, &[1]).unwrap();
        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json["width"], 2);
        assert_eq!(json["cells"][0]["adjacent"], 1);
        assert_eq!(json["cells"][1]["bomb"], true);
    }
}
