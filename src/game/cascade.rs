use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::board::{Board, Color, Match, Position, Tile};
use super::config::GameConfig;

/// Boundary to whatever plays animations. The core treats every wait as a
/// synchronous step that returns once the collaborator is done.
pub trait AnimationHost {
    fn wait_for_animation(&mut self) {}

    fn wait_for_all_animations(&mut self) {
        self.wait_for_animation();
    }
}

/// Host without animation: every wait resolves immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl AnimationHost for Immediate {}

/// Returned by the per-pass callback to stop the loop early (e.g. on a knockout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassControl {
    Continue,
    Halt,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CascadeOutcome {
    /// Combo counter after the last pass.
    pub combo: u32,
    pub passes: u32,
    /// The safety cap stopped the loop while matches were still on the board.
    pub overrun: bool,
    /// No legal swap remained and the board was regenerated.
    pub reinitialized: bool,
    pub halted: bool,
}

/// Drives destroy, drop, refill and re-match to a fixed point.
#[derive(Debug, Clone)]
pub struct CascadeResolver {
    limit: u32,
    colors: Vec<Color>,
}

impl CascadeResolver {
    pub fn new(limit: u32, colors: Vec<Color>) -> Self {
        Self { limit, colors }
    }

    pub fn from_config(config: &GameConfig) -> Self {
        Self::new(config.cascade_limit, config.colors.clone())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Runs cascade passes until the board holds no match. `on_pass` sees each
    /// pass's matches (tiles already flagged `matched`, not yet destroyed) and
    /// the combo count for that pass; `combo` is the count carried in from
    /// earlier passes of the same action.
    pub fn resolve<R, F>(
        &self,
        board: &mut Board,
        rng: &mut R,
        host: &mut dyn AnimationHost,
        combo: u32,
        mut on_pass: F,
    ) -> CascadeOutcome
    where
        R: Rng + ?Sized,
        F: FnMut(&Board, &[Match], u32) -> PassControl,
    {
        let mut outcome = CascadeOutcome {
            combo,
            ..CascadeOutcome::default()
        };
        let mut matches = board.find_matches();
        if matches.is_empty() {
            if board.is_stable() {
                return outcome;
            }
            // leftover gaps or stale flags with nothing to match
            self.collapse(board, rng);
            matches = board.find_matches();
        }

        while !matches.is_empty() {
            if outcome.passes >= self.limit {
                outcome.overrun = true;
                warn!(passes = outcome.passes, "cascade limit reached, finalizing board as-is");
                break;
            }
            outcome.passes += 1;
            outcome.combo += 1;
            board.mark_matched(&matches);
            debug!(
                pass = outcome.passes,
                combo = outcome.combo,
                matches = matches.len(),
                "cascade pass"
            );

            let control = on_pass(&*board, &matches, outcome.combo);
            host.wait_for_animation();
            self.collapse(board, rng);
            host.wait_for_animation();

            if control == PassControl::Halt {
                outcome.halted = true;
                break;
            }
            matches = board.find_matches();
        }

        board.settle();
        outcome.reinitialized = self.ensure_playable(board, rng);
        host.wait_for_all_animations();
        outcome
    }

    /// Resolves without awarding anything, for board mutations outside a player action.
    pub fn stabilize<R: Rng + ?Sized>(
        &self,
        board: &mut Board,
        rng: &mut R,
        host: &mut dyn AnimationHost,
    ) -> CascadeOutcome {
        self.resolve(board, rng, host, 0, |_, _, _| PassControl::Continue)
    }

    /// Destroys every `matched` tile, lets the columns fall and refills the gaps.
    pub fn collapse<R: Rng + ?Sized>(&self, board: &mut Board, rng: &mut R) {
        destroy_matched(board);
        apply_gravity(board);
        refill(board, &self.colors, rng);
    }

    /// Flags `positions` and collapses them, the same way a match is removed.
    pub fn destroy_tiles<R: Rng + ?Sized>(
        &self,
        board: &mut Board,
        positions: &[Position],
        rng: &mut R,
    ) -> usize {
        let mut flagged = 0;
        for pos in positions {
            if let Some(tile) = board.get_mut(*pos) {
                if !tile.is_empty() {
                    tile.matched = true;
                    flagged += 1;
                }
            }
        }
        if flagged > 0 {
            self.collapse(board, rng);
        }
        flagged
    }

    /// Regenerates the board when no swap can produce a match. Returns whether it did.
    pub fn ensure_playable<R: Rng + ?Sized>(&self, board: &mut Board, rng: &mut R) -> bool {
        if board.has_legal_move() {
            return false;
        }
        warn!("no legal moves left, reinitializing board");
        board.reinitialize(&self.colors, rng);
        true
    }
}

/// Empties every matched tile. Frozen and ignited flags go with it.
pub fn destroy_matched(board: &mut Board) -> usize {
    let targets: Vec<Position> = board
        .positions()
        .filter(|pos| board.get(*pos).map(|tile| tile.matched).unwrap_or(false))
        .collect();
    for pos in &targets {
        if let Some(tile) = board.get_mut(*pos) {
            *tile = Tile::default();
        }
    }
    targets.len()
}

/// Every non-frozen empty cell pulls down the nearest non-empty, non-frozen
/// tile above it. Frozen tiles neither fall nor receive.
pub fn apply_gravity(board: &mut Board) {
    let size = board.size();
    for col in 0..size {
        for row in (0..size).rev() {
            let target = Position::new(row, col);
            let receives = board
                .get(target)
                .map(|tile| tile.is_empty() && !tile.frozen)
                .unwrap_or(false);
            if !receives {
                continue;
            }
            let source = (0..row).rev().map(|r| Position::new(r, col)).find(|pos| {
                board
                    .get(*pos)
                    .map(|tile| !tile.frozen && !tile.is_empty())
                    .unwrap_or(false)
            });
            if let Some(source) = source {
                board.swap(source, target);
                if let Some(tile) = board.get_mut(target) {
                    tile.animating = true;
                }
            }
        }
    }
}

/// Fills remaining gaps with random colors, flagged `new`.
pub fn refill<R: Rng + ?Sized>(board: &mut Board, colors: &[Color], rng: &mut R) -> usize {
    let gaps: Vec<Position> = board
        .positions()
        .filter(|pos| board.get(*pos).map(Tile::is_empty).unwrap_or(false))
        .collect();
    let palette: Vec<Color> = colors
        .iter()
        .copied()
        .filter(|color| !color.is_empty())
        .collect();
    for pos in &gaps {
        let color = palette.choose(rng).copied().unwrap_or(Color::Red);
        if let Some(tile) = board.get_mut(*pos) {
            *tile = Tile {
                is_new: true,
                ..Tile::new(color)
            };
        }
    }
    gaps.len()
}
