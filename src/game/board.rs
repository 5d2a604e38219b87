use std::collections::HashSet;
use std::fmt;

use derive_more::Display;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::IntegrityError;

/// Default edge length of the square grid.
pub const DEFAULT_BOARD_SIZE: usize = 8;
const MIN_RUN: usize = 3;
const GENERATION_ATTEMPTS: usize = 128;

/// Gem colors. `Empty` marks a destroyed cell waiting for gravity or refill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Blue,
    Green,
    Yellow,
    Black,
    Empty,
}

impl Default for Color {
    fn default() -> Self {
        Color::Empty
    }
}

impl Color {
    pub const PLAYABLE: [Color; 5] = [
        Color::Red,
        Color::Blue,
        Color::Green,
        Color::Yellow,
        Color::Black,
    ];

    pub fn is_empty(self) -> bool {
        self == Color::Empty
    }

    /// Single-letter notation used by text fixtures: `R B G Y K` and `.` for empty.
    pub fn from_symbol(symbol: char) -> Option<Color> {
        match symbol.to_ascii_uppercase() {
            'R' => Some(Color::Red),
            'B' => Some(Color::Blue),
            'G' => Some(Color::Green),
            'Y' => Some(Color::Yellow),
            'K' => Some(Color::Black),
            '.' => Some(Color::Empty),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Color::Red => 'R',
            Color::Blue => 'B',
            Color::Green => 'G',
            Color::Yellow => 'Y',
            Color::Black => 'K',
            Color::Empty => '.',
        }
    }
}

#[derive(Debug, Clone, Copy, Display, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("({}, {})", row, col)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Orthogonal neighbours only.
    pub fn is_adjacent(&self, other: &Position) -> bool {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col) == 1
    }

    /// Cells within Chebyshev distance `radius`, clipped to a board of `size`.
    pub fn area(&self, radius: usize, size: usize) -> Vec<Position> {
        if size == 0 {
            return Vec::new();
        }
        let row_start = self.row.saturating_sub(radius);
        let col_start = self.col.saturating_sub(radius);
        let row_end = self.row.saturating_add(radius).min(size - 1);
        let col_end = self.col.saturating_add(radius).min(size - 1);
        let mut cells = Vec::new();
        for row in row_start..=row_end {
            for col in col_start..=col_end {
                cells.push(Position::new(row, col));
            }
        }
        cells
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Tile {
    pub color: Color,
    #[serde(default)]
    pub matched: bool,
    #[serde(default, rename = "new")]
    pub is_new: bool,
    #[serde(default)]
    pub animating: bool,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default)]
    pub ignited: bool,
}

impl Tile {
    pub fn new(color: Color) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.color.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SpecialShape {
    T,
    L,
}

/// One detected run. Produced per matcher call and never stored in state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Match {
    pub color: Color,
    pub tiles: Vec<Position>,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_shape: Option<SpecialShape>,
}

impl Match {
    pub fn new(color: Color, tiles: Vec<Position>, special_shape: Option<SpecialShape>) -> Self {
        let length = tiles.len();
        Self {
            color,
            tiles,
            length,
            special_shape,
        }
    }

    pub fn is_special(&self) -> bool {
        self.special_shape.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone)]
struct Run {
    color: Color,
    orientation: Orientation,
    tiles: Vec<Position>,
}

impl Run {
    fn len(&self) -> usize {
        self.tiles.len()
    }

    fn index_of(&self, pos: &Position) -> Option<usize> {
        self.tiles.iter().position(|tile| tile == pos)
    }
}

/// Square grid of tiles, row-major.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Board {
    size: usize,
    tiles: Vec<Vec<Tile>>,
}

impl Board {
    pub fn empty(size: usize) -> Self {
        Self {
            size,
            tiles: vec![vec![Tile::default(); size]; size],
        }
    }

    /// Fresh board with no match on it and at least one legal swap.
    pub fn generate<R: Rng + ?Sized>(size: usize, colors: &[Color], rng: &mut R) -> Self {
        let mut board = Self::empty(size);
        board.reinitialize(colors, rng);
        board
    }

    /// Refills every cell so that the matcher finds nothing. Frozen and ignited
    /// flags are dropped along with the old tiles.
    pub fn reinitialize<R: Rng + ?Sized>(&mut self, colors: &[Color], rng: &mut R) {
        for _ in 0..GENERATION_ATTEMPTS {
            self.fill_without_runs(colors, rng);
            if self.has_legal_move() {
                return;
            }
        }
        tracing::warn!(size = self.size, "no playable layout found, keeping last match-free fill");
    }

    fn fill_without_runs<R: Rng + ?Sized>(&mut self, colors: &[Color], rng: &mut R) {
        for row in 0..self.size {
            for col in 0..self.size {
                let mut allowed: Vec<Color> = colors
                    .iter()
                    .copied()
                    .filter(|color| !color.is_empty())
                    .collect();
                if col >= 2 {
                    let left = self.tiles[row][col - 1].color;
                    if left == self.tiles[row][col - 2].color {
                        allowed.retain(|color| *color != left);
                    }
                }
                if row >= 2 {
                    let up = self.tiles[row - 1][col].color;
                    if up == self.tiles[row - 2][col].color {
                        allowed.retain(|color| *color != up);
                    }
                }
                let color = allowed.choose(rng).copied().unwrap_or(Color::Red);
                self.tiles[row][col] = Tile::new(color);
            }
        }
    }

    /// Parses a text grid such as `["RGB", "GBR", "BRG"]`. Whitespace is ignored.
    pub fn from_rows(rows: &[&str]) -> Result<Self, IntegrityError> {
        let size = rows.len();
        let mut tiles = Vec::with_capacity(size);
        for (row_index, row) in rows.iter().enumerate() {
            let mut parsed = Vec::with_capacity(size);
            for symbol in row.chars().filter(|c| !c.is_whitespace()) {
                let color = Color::from_symbol(symbol).ok_or(IntegrityError::UnknownTileSymbol {
                    row: row_index,
                    symbol,
                })?;
                parsed.push(Tile::new(color));
            }
            if parsed.len() != size {
                return Err(IntegrityError::NonSquareBoard {
                    row: row_index,
                    expected: size,
                    actual: parsed.len(),
                });
            }
            tiles.push(parsed);
        }
        Ok(Self { size, tiles })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn center(&self) -> Position {
        Position::new(self.size / 2, self.size / 2)
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.row < self.size && pos.col < self.size
    }

    pub fn get(&self, pos: Position) -> Option<&Tile> {
        self.tiles.get(pos.row).and_then(|row| row.get(pos.col))
    }

    pub fn get_mut(&mut self, pos: Position) -> Option<&mut Tile> {
        self.tiles.get_mut(pos.row).and_then(|row| row.get_mut(pos.col))
    }

    /// Color at `pos`, or `Empty` when out of bounds.
    pub fn color_at(&self, pos: Position) -> Color {
        self.get(pos).map(|tile| tile.color).unwrap_or(Color::Empty)
    }

    pub fn set_color(&mut self, pos: Position, color: Color) {
        if let Some(tile) = self.get_mut(pos) {
            tile.color = color;
        }
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.size).flat_map(move |row| (0..self.size).map(move |col| Position::new(row, col)))
    }

    pub fn positions_of(&self, color: Color) -> Vec<Position> {
        self.positions()
            .filter(|pos| self.color_at(*pos) == color)
            .collect()
    }

    pub fn tiles_mut(&mut self) -> impl Iterator<Item = &mut Tile> + '_ {
        self.tiles.iter_mut().flatten()
    }

    pub fn count_where<F: Fn(&Tile) -> bool>(&self, predicate: F) -> usize {
        self.tiles.iter().flatten().filter(|tile| predicate(tile)).count()
    }

    pub fn swap(&mut self, a: Position, b: Position) {
        if !self.in_bounds(a) || !self.in_bounds(b) || a == b {
            return;
        }
        let first = self.tiles[a.row][a.col].clone();
        let second = std::mem::replace(&mut self.tiles[b.row][b.col], first);
        self.tiles[a.row][a.col] = second;
    }

    /// A tile may take part in a swap when it exists, holds a gem and is not frozen.
    pub fn is_swappable(&self, pos: Position) -> bool {
        self.get(pos)
            .map(|tile| !tile.frozen && !tile.is_empty())
            .unwrap_or(false)
    }

    /// Every horizontal and vertical neighbour pair where both tiles are swappable.
    pub fn candidate_swaps(&self) -> Vec<(Position, Position)> {
        let mut swaps = Vec::new();
        for pos in self.positions() {
            if !self.is_swappable(pos) {
                continue;
            }
            let right = Position::new(pos.row, pos.col + 1);
            if self.is_swappable(right) {
                swaps.push((pos, right));
            }
            let down = Position::new(pos.row + 1, pos.col);
            if self.is_swappable(down) {
                swaps.push((pos, down));
            }
        }
        swaps
    }

    /// Matches the board would hold after swapping `a` and `b`, computed on a scratch copy.
    pub fn matches_after_swap(&self, a: Position, b: Position) -> Vec<Match> {
        let mut scratch = self.clone();
        scratch.swap(a, b);
        scratch.find_matches()
    }

    pub fn legal_swaps(&self) -> Vec<(Position, Position)> {
        self.candidate_swaps()
            .into_iter()
            .filter(|(a, b)| !self.matches_after_swap(*a, *b).is_empty())
            .collect()
    }

    pub fn has_legal_move(&self) -> bool {
        self.candidate_swaps()
            .into_iter()
            .any(|(a, b)| !self.matches_after_swap(a, b).is_empty())
    }

    pub fn mark_matched(&mut self, matches: &[Match]) {
        for pos in matches.iter().flat_map(|m| m.tiles.iter()) {
            if let Some(tile) = self.get_mut(*pos) {
                tile.matched = true;
            }
        }
    }

    /// Clears transient flags left over from a resolution (`matched`, `new`, `animating`).
    pub fn settle(&mut self) {
        for tile in self.tiles.iter_mut().flatten() {
            tile.matched = false;
            tile.is_new = false;
            tile.animating = false;
        }
    }

    pub fn is_stable(&self) -> bool {
        self.tiles
            .iter()
            .flatten()
            .all(|tile| !tile.matched && !tile.is_empty())
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if self.tiles.len() != self.size {
            return Err(IntegrityError::NonSquareBoard {
                row: self.tiles.len(),
                expected: self.size,
                actual: self.tiles.len(),
            });
        }
        for (row, tiles) in self.tiles.iter().enumerate() {
            if tiles.len() != self.size {
                return Err(IntegrityError::NonSquareBoard {
                    row,
                    expected: self.size,
                    actual: tiles.len(),
                });
            }
        }
        Ok(())
    }

    /// Board Matcher. Priority: straight lines of five or more, then T/L shapes
    /// built from two crossing runs of three, then runs of four, then runs of
    /// three. A tile claimed by a higher-priority match is never reused.
    pub fn find_matches(&self) -> Vec<Match> {
        let runs = self.scan_runs();
        let mut claimed: HashSet<Position> = HashSet::new();
        let mut matches = Vec::new();

        for run in runs.iter().filter(|run| run.len() >= 5) {
            claimed.extend(run.tiles.iter().copied());
            matches.push(Match::new(run.color, run.tiles.clone(), None));
        }

        let triples = |orientation: Orientation| {
            runs.iter()
                .filter(move |run| run.len() == MIN_RUN && run.orientation == orientation)
                .collect::<Vec<_>>()
        };
        let horizontal = triples(Orientation::Horizontal);
        let vertical = triples(Orientation::Vertical);
        for h in &horizontal {
            for v in &vertical {
                if h.color != v.color {
                    continue;
                }
                let free = |run: &Run| run.tiles.iter().all(|pos| !claimed.contains(pos));
                if !free(*h) || !free(*v) {
                    continue;
                }
                let Some(shared) = h.tiles.iter().find(|pos| v.index_of(pos).is_some()) else {
                    continue;
                };
                let Some(shape) = classify_shape(h, v, shared) else {
                    continue;
                };
                let mut tiles = h.tiles.clone();
                tiles.extend(v.tiles.iter().filter(|pos| *pos != shared).copied());
                claimed.extend(tiles.iter().copied());
                matches.push(Match::new(h.color, tiles, Some(shape)));
            }
        }

        for length in [4, MIN_RUN] {
            for run in runs.iter().filter(|run| run.len() == length) {
                if run.tiles.iter().any(|pos| claimed.contains(pos)) {
                    continue;
                }
                claimed.extend(run.tiles.iter().copied());
                matches.push(Match::new(run.color, run.tiles.clone(), None));
            }
        }

        matches
    }

    fn scan_runs(&self) -> Vec<Run> {
        let mut runs = Vec::new();
        for line in 0..self.size {
            self.scan_line(line, Orientation::Horizontal, &mut runs);
        }
        for line in 0..self.size {
            self.scan_line(line, Orientation::Vertical, &mut runs);
        }
        runs
    }

    fn scan_line(&self, line: usize, orientation: Orientation, runs: &mut Vec<Run>) {
        let at = |offset: usize| match orientation {
            Orientation::Horizontal => Position::new(line, offset),
            Orientation::Vertical => Position::new(offset, line),
        };
        let mut start = 0;
        while start < self.size {
            let color = self.color_at(at(start));
            let mut end = start + 1;
            while end < self.size && self.color_at(at(end)) == color {
                end += 1;
            }
            if !color.is_empty() && end - start >= MIN_RUN {
                runs.push(Run {
                    color,
                    orientation,
                    tiles: (start..end).map(at).collect(),
                });
            }
            start = end;
        }
    }
}

/// `T` when the crossing tile is the middle of either run (a plus counts as `T`),
/// `L` when it is an end of both.
fn classify_shape(h: &Run, v: &Run, shared: &Position) -> Option<SpecialShape> {
    let h_index = h.index_of(shared)?;
    let v_index = v.index_of(shared)?;
    let is_end = |index: usize| index == 0 || index == MIN_RUN - 1;
    if is_end(h_index) && is_end(v_index) {
        Some(SpecialShape::L)
    } else {
        Some(SpecialShape::T)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.tiles {
            let line: String = row.iter().map(|tile| tile.color.symbol()).collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn board(rows: &[&str]) -> Board {
        Board::from_rows(rows).expect("fixture should parse")
    }

    #[test]
    fn finds_horizontal_run_touching_the_edge() {
        let board = board(&[
            "RRR.....",
            "........",
            "........",
            "........",
            "........",
            "........",
            "........",
            "........",
        ]);
        let matches = board.find_matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].color, Color::Red);
        assert_eq!(matches[0].length, 3);
        assert_eq!(
            matches[0].tiles,
            vec![Position::new(0, 0), Position::new(0, 1), Position::new(0, 2)]
        );
        assert!(matches[0].special_shape.is_none());
    }

    #[test]
    fn empty_cells_never_match() {
        let board = board(&["...", "...", "..."]);
        assert!(board.find_matches().is_empty());
    }

    #[test]
    fn detects_t_shape() {
        let board = board(&[
            "GGG..",
            ".G...",
            ".G...",
            ".....",
            ".....",
        ]);
        let matches = board.find_matches();
        assert_eq!(matches.len(), 1, "crossing runs collapse into one match");
        assert_eq!(matches[0].special_shape, Some(SpecialShape::T));
        assert_eq!(matches[0].length, 5);
    }

    #[test]
    fn detects_l_shape() {
        let board = board(&[
            "B....",
            "B....",
            "BBB..",
            ".....",
            ".....",
        ]);
        let matches = board.find_matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].special_shape, Some(SpecialShape::L));
        assert_eq!(matches[0].length, 5);
    }

    #[test]
    fn five_line_takes_priority_and_is_not_a_shape() {
        let board = board(&[
            "YYYYY",
            "..Y..",
            "..Y..",
            ".....",
            ".....",
        ]);
        let matches = board.find_matches();
        assert_eq!(matches.len(), 1, "the crossing triple reuses a claimed tile");
        assert_eq!(matches[0].length, 5);
        assert!(matches[0].special_shape.is_none());
    }

    #[test]
    fn four_and_three_are_recorded_separately() {
        let board = board(&[
            "RRRR.",
            ".....",
            "KKK..",
            ".....",
            ".....",
        ]);
        let mut lengths: Vec<usize> = board.find_matches().iter().map(|m| m.length).collect();
        lengths.sort_unstable();
        assert_eq!(lengths, vec![3, 4]);
    }

    #[test]
    fn generated_board_has_no_matches_and_a_move() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..20 {
            let board = Board::generate(DEFAULT_BOARD_SIZE, &Color::PLAYABLE, &mut rng);
            assert!(board.find_matches().is_empty());
            assert!(board.has_legal_move());
            assert!(board.is_stable());
        }
    }

    #[test]
    fn frozen_tiles_are_not_swap_candidates() {
        let mut board = board(&["RGB", "GBR", "BRG"]);
        if let Some(tile) = board.get_mut(Position::new(1, 1)) {
            tile.frozen = true;
        }
        assert!(board
            .candidate_swaps()
            .iter()
            .all(|(a, b)| *a != Position::new(1, 1) && *b != Position::new(1, 1)));
    }

    #[test]
    fn shorter_run_touching_a_claimed_tile_is_dropped() {
        let board = board(&["RGBYK", "RBYKG", "RYKGB", "RRRBY", "GKBYR"]);
        let matches = board.find_matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].length, 4);
        assert_eq!(matches[0].special_shape, None);
        assert!(!matches[0].tiles.contains(&Position::new(3, 1)));
        assert!(!matches[0].tiles.contains(&Position::new(3, 2)));
    }

    #[test]
    fn rejects_ragged_fixture() {
        let result = Board::from_rows(&["RGB", "GBR", "BR"]);
        assert!(matches!(
            result,
            Err(IntegrityError::NonSquareBoard {
                row: 2,
                expected: 3,
                actual: 2
            })
        ));
        assert!(matches!(
            Board::from_rows(&["RGB", "GBR"]),
            Err(IntegrityError::NonSquareBoard { row: 0, .. })
        ));
    }
}
