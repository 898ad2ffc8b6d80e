//! Minefield grid and the reveal/flag moves that produce new snapshots.
//!
//! A [`Board`] is a plain value: every move returns a fresh snapshot via
//! `&mut self` on a clone the caller owns, so the sync layer can replicate
//! it as an opaque full-state blob.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Board generation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("board must be at least 1x1, got {width}x{height}")]
    EmptyBoard { width: u32, height: u32 },
    #[error("{bombs} bombs do not fit on a board with {cells} cells")]
    TooManyBombs { bombs: u32, cells: u32 },
    #[error("cell ({x}, {y}) is outside the board")]
    OutOfBounds { x: u32, y: u32 },
}

/// A single cell of the minefield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub bomb: bool,
    /// Number of bombs in the 8 neighbouring cells
    pub adjacent: u8,
    pub revealed: bool,
    pub flagged: bool,
}

/// Result of revealing a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Cell was already revealed or is flagged; nothing changed.
    Unchanged,
    /// Safe reveal; carries the number of cells uncovered (flood fill included).
    Revealed(usize),
    /// A bomb was uncovered. The whole field is revealed.
    Detonated,
}

/// Row-major minefield snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub width: u32,
    pub height: u32,
    pub cells: Vec<Cell>,
}

impl Board {
    /// Build a board with bombs at the given row-major indices.
    ///
    /// Adjacency counts are computed here; out-of-range indices are rejected.
    pub fn with_bombs(width: u32, height: u32, bombs: &[usize]) -> Result<Self, BoardError> {
        if width == 0 || height == 0 {
            return Err(BoardError::EmptyBoard { width, height });
        }
        let len = (width * height) as usize;
        let mut cells = vec![Cell::default(); len];
        for &index in bombs {
            let cell = cells.get_mut(index).ok_or(BoardError::OutOfBounds {
                x: (index % width as usize) as u32,
                y: (index / width as usize) as u32,
            })?;
            cell.bomb = true;
        }

        let mut board = Self { width, height, cells };
        for y in 0..height {
            for x in 0..width {
                let count = board
                    .neighbours(x, y)
                    .filter(|&(nx, ny)| board.cells[board.index(nx, ny)].bomb)
                    .count();
                let i = board.index(x, y);
                board.cells[i].adjacent = count as u8;
            }
        }
        Ok(board)
    }

    /// Get a cell by coordinate.
    pub fn cell(&self, x: u32, y: u32) -> Option<&Cell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(self.index(x, y))
    }

    /// Number of bombs on the board.
    pub fn bomb_count(&self) -> usize {
        self.cells.iter().filter(|c| c.bomb).count()
    }

    /// Reveal a cell, flood-filling through cells with no adjacent bombs.
    pub fn reveal(&mut self, x: u32, y: u32) -> Result<RevealOutcome, BoardError> {
        let cell = *self.cell(x, y).ok_or(BoardError::OutOfBounds { x, y })?;
        if cell.revealed || cell.flagged {
            return Ok(RevealOutcome::Unchanged);
        }

        if cell.bomb {
            for c in &mut self.cells {
                c.revealed = true;
            }
            return Ok(RevealOutcome::Detonated);
        }

        let mut uncovered = 0;
        let mut stack = vec![(x, y)];
        while let Some((cx, cy)) = stack.pop() {
            let i = self.index(cx, cy);
            let c = &mut self.cells[i];
            if c.revealed || c.flagged || c.bomb {
                continue;
            }
            c.revealed = true;
            uncovered += 1;
            if c.adjacent == 0 {
                stack.extend(self.neighbours(cx, cy));
            }
        }
        Ok(RevealOutcome::Revealed(uncovered))
    }

    /// Toggle a flag on an unrevealed cell. Returns the new flag state.
    pub fn toggle_flag(&mut self, x: u32, y: u32) -> Result<bool, BoardError> {
        if x >= self.width || y >= self.height {
            return Err(BoardError::OutOfBounds { x, y });
        }
        let i = self.index(x, y);
        let cell = &mut self.cells[i];
        if !cell.revealed {
            cell.flagged = !cell.flagged;
        }
        Ok(cell.flagged)
    }

    /// All safe cells revealed.
    pub fn is_cleared(&self) -> bool {
        self.cells.iter().all(|c| c.bomb || c.revealed)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    fn neighbours(&self, x: u32, y: u32) -> impl Iterator<Item = (u32, u32)> {
        let (w, h) = (self.width as i64, self.height as i64);
        let (x, y) = (x as i64, y as i64);
        (-1..=1)
            .flat_map(move |dy| (-1..=1).map(move |dx| (x + dx, y + dy)))
            .filter(move |&(nx, ny)| {
                (nx, ny) != (x, y) && nx >= 0 && ny >= 0 && nx < w && ny < h
            })
            .map(|(nx, ny)| (nx as u32, ny as u32))
    }
}

/// Generate a board with `bombs` bombs placed uniformly at random.
pub fn generate_board(width: u32, height: u32, bombs: u32) -> Result<Board, BoardError> {
    generate_board_with(&mut rand::thread_rng(), width, height, bombs)
}

/// Generate a board using the given RNG (seeded RNGs give reproducible boards).
pub fn generate_board_with<R: Rng + ?Sized>(
    rng: &mut R,
    width: u32,
    height: u32,
    bombs: u32,
) -> Result<Board, BoardError> {
    if width == 0 || height == 0 {
        return Err(BoardError::EmptyBoard { width, height });
    }
    let cells = width * height;
    if bombs > cells {
        return Err(BoardError::TooManyBombs { bombs, cells });
    }
    let positions = rand::seq::index::sample(rng, cells as usize, bombs as usize).into_vec();
    Board::with_bombs(width, height, &positions)
}
