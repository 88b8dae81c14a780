//! Collapse strategies driving a [`Wave`] to a full assignment.
//!
//! Both strategies repeatedly pick the most constrained open cell. A cell with
//! one candidate left is committed; otherwise candidates are removed one at a
//! time and propagation decides what follows.
//!
//! - [`Greedy`] never undoes anything. A cell whose every removal fails ends
//!   the attempt.
//! - [`Backtracking`] opens a checkpoint before every step and searches
//!   depth-first with an explicit frame stack, restoring the checkpoint
//!   whenever a step contradicts.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::trace;

use crate::error::{AttemptFailure, Contradiction};
use crate::wave::{Checkpoint, Wave};

/// Default number of search steps one attempt may take.
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

/// Caps the number of steps a single attempt may take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepBudget {
    limit: u64,
    used: u64,
}

impl StepBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    /// Accounts for one step, failing once the limit is exceeded.
    #[inline]
    pub fn tick(&mut self) -> Result<(), AttemptFailure> {
        self.used += 1;
        if self.used > self.limit {
            return Err(AttemptFailure::StepBudgetExhausted { steps: self.limit });
        }
        Ok(())
    }
}

impl Default for StepBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS)
    }
}

/// A way of collapsing every open cell of a wave.
pub trait SearchStrategy {
    fn name(&self) -> &'static str;

    /// Runs until every cell is decided or the attempt fails.
    fn run(
        &self,
        wave: &mut Wave<'_>,
        rng: &mut StdRng,
        budget: &mut StepBudget,
    ) -> Result<(), AttemptFailure>;
}

/// Collapse without backtracking.
#[derive(Clone, Copy, Debug, Default)]
pub struct Greedy;

/// Fails greedy collapse when it picks the same cell at the same domain size
/// twice in a row, which means the last step changed nothing.
#[derive(Debug, Default)]
struct RepeatGuard {
    previous: Option<(usize, usize)>,
}

impl RepeatGuard {
    /// Records `cell` and returns its current domain size.
    fn observe(&mut self, wave: &Wave<'_>, cell: usize) -> Result<usize, AttemptFailure> {
        let domain_len = wave.domain_len(cell);
        if self.previous == Some((cell, domain_len)) {
            return Err(AttemptFailure::InfiniteLoopDetected {
                coord: wave.grid().coord_of(cell),
                domain_len,
            });
        }
        self.previous = Some((cell, domain_len));
        Ok(domain_len)
    }
}

impl SearchStrategy for Greedy {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn run(
        &self,
        wave: &mut Wave<'_>,
        rng: &mut StdRng,
        budget: &mut StepBudget,
    ) -> Result<(), AttemptFailure> {
        let mut guard = RepeatGuard::default();

        while let Some(cell) = wave.most_constrained() {
            budget.tick()?;
            let domain_len = guard.observe(wave, cell)?;

            if domain_len == 1 {
                wave.commit_last(cell)?;
                continue;
            }

            let candidates: Vec<usize> = wave.cell(cell).domain().iter().collect();
            let start = rng.random_range(0..candidates.len());
            let mut last_failure = None;
            let removed = (0..candidates.len()).any(|offset| {
                let module = candidates[(start + offset) % candidates.len()];
                match wave.remove_module(cell, module) {
                    Ok(()) => true,
                    Err(contradiction) => {
                        last_failure = Some(contradiction);
                        false
                    }
                }
            });

            if !removed {
                let contradiction = last_failure.unwrap_or(Contradiction::EmptyDomain {
                    coord: wave.grid().coord_of(cell),
                });
                return Err(contradiction.into());
            }
        }

        Ok(())
    }
}

/// Depth-first collapse with checkpoint restores.
#[derive(Clone, Copy, Debug, Default)]
pub struct Backtracking;

/// What a search frame still has to try for its cell.
#[derive(Debug)]
enum Step {
    /// Single candidate left: commit it, once.
    Commit { attempted: bool },
    /// Remove one candidate at a time, in shuffled order.
    Branch { candidates: Vec<usize>, next: usize },
}

#[derive(Debug)]
struct Frame {
    checkpoint: Checkpoint,
    cell: usize,
    step: Step,
}

impl Frame {
    fn open(wave: &mut Wave<'_>, cell: usize, rng: &mut StdRng) -> Self {
        let checkpoint = wave.checkpoint();
        let step = if wave.domain_len(cell) == 1 {
            Step::Commit { attempted: false }
        } else {
            let mut candidates: Vec<usize> = wave.cell(cell).domain().iter().collect();
            candidates.shuffle(rng);
            Step::Branch {
                candidates,
                next: 0,
            }
        };
        Self {
            checkpoint,
            cell,
            step,
        }
    }

    /// Applies the frame's next alternative, or returns `None` once they
    /// are all used up.
    fn advance(&mut self, wave: &mut Wave<'_>) -> Option<Result<(), Contradiction>> {
        match &mut self.step {
            Step::Commit { attempted } => {
                if *attempted {
                    return None;
                }
                *attempted = true;
                Some(wave.commit_last(self.cell))
            }
            Step::Branch { candidates, next } => {
                let module = *candidates.get(*next)?;
                *next += 1;
                Some(wave.remove_module(self.cell, module))
            }
        }
    }
}

impl SearchStrategy for Backtracking {
    fn name(&self) -> &'static str {
        "backtracking"
    }

    fn run(
        &self,
        wave: &mut Wave<'_>,
        rng: &mut StdRng,
        budget: &mut StepBudget,
    ) -> Result<(), AttemptFailure> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut last_failure: Option<Contradiction> = None;
        let mut descend = true;

        loop {
            if descend {
                let Some(cell) = wave.most_constrained() else {
                    return Ok(());
                };
                stack.push(Frame::open(wave, cell, rng));
            }

            let depth = stack.len();
            let Some(frame) = stack.last_mut() else {
                let contradiction = last_failure.unwrap_or(Contradiction::EmptyDomain {
                    coord: wave.grid().coord_of(0),
                });
                return Err(contradiction.into());
            };
            budget.tick()?;

            match frame.advance(wave) {
                Some(Ok(())) => descend = true,
                Some(Err(contradiction)) => {
                    trace!(depth, "{contradiction}, trying next candidate");
                    wave.restore(&frame.checkpoint);
                    last_failure = Some(contradiction);
                    descend = false;
                }
                None => {
                    stack.pop();
                    if let Some(parent) = stack.last() {
                        wave.restore(&parent.checkpoint);
                    }
                    descend = false;
                }
            }
        }
    }
}

/// The strategies selectable at run time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    Greedy,
    #[default]
    Backtracking,
}

impl SearchStrategy for Strategy {
    fn name(&self) -> &'static str {
        match self {
            Strategy::Greedy => Greedy.name(),
            Strategy::Backtracking => Backtracking.name(),
        }
    }

    fn run(
        &self,
        wave: &mut Wave<'_>,
        rng: &mut StdRng,
        budget: &mut StepBudget,
    ) -> Result<(), AttemptFailure> {
        match self {
            Strategy::Greedy => Greedy.run(wave, rng, budget),
            Strategy::Backtracking => Backtracking.run(wave, rng, budget),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ModuleSet;
    use crate::grid::{Dimensions, Grid};
    use crate::modules::{Catalog, Module, ModuleId};
    use rand::SeedableRng;

    /// Left cell may hold `a` (right face 1) or `b` (right face 2); the right
    /// cell holds either of two modules that both show 1 to the left. Only
    /// `a` can ever sit in the left cell.
    fn trap() -> (Grid, Catalog, Vec<ModuleSet>) {
        let grid = Grid::with_unit_cells(Dimensions::new(2, 1, 1)).unwrap();
        let catalog = Catalog::new(vec![
            Module::new(0, "a", [0, 0, 1, 0, 0, 0]),
            Module::new(1, "b", [0, 0, 2, 0, 0, 0]),
            Module::new(2, "x", [0, 0, 0, 0, 0, 1]),
            Module::new(3, "y", [0, 0, 0, 0, 0, 1]),
        ])
        .unwrap();
        let domains = vec![
            ModuleSet::from_indices(4, [0, 1]),
            ModuleSet::from_indices(4, [2, 3]),
        ];
        (grid, catalog, domains)
    }

    fn attempt(strategy: Strategy, seed: u64) -> Result<Vec<ModuleId>, AttemptFailure> {
        let (grid, catalog, domains) = trap();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut wave = Wave::new(&grid, &catalog, &domains, &mut rng);
        strategy.run(&mut wave, &mut rng, &mut StepBudget::default())?;
        Ok(wave.decided_modules().expect("solved wave has every cell decided"))
    }

    #[test]
    fn test_backtracking_escapes_dead_branches() {
        for seed in 0..64 {
            let modules = attempt(Strategy::Backtracking, seed)
                .unwrap_or_else(|e| panic!("seed {seed} failed: {e}"));
            assert_eq!(modules[0], ModuleId(0), "seed {seed}");
        }
    }

    #[test]
    fn test_greedy_gives_up_on_dead_branches() {
        let outcomes: Vec<bool> = (0..64)
            .map(|seed| attempt(Strategy::Greedy, seed).is_ok())
            .collect();
        assert!(outcomes.iter().any(|&ok| ok));
        assert!(outcomes.iter().any(|&ok| !ok));
    }

    #[test]
    fn test_repeat_guard_stops_unchanged_cell() {
        let (grid, catalog, domains) = trap();
        let mut rng = StdRng::seed_from_u64(0);
        let mut wave = Wave::new(&grid, &catalog, &domains, &mut rng);
        let mut guard = RepeatGuard::default();

        assert_eq!(guard.observe(&wave, 0), Ok(2));
        assert_eq!(guard.observe(&wave, 1), Ok(2));
        assert_eq!(
            guard.observe(&wave, 1),
            Err(AttemptFailure::InfiniteLoopDetected {
                coord: (1, 0, 0),
                domain_len: 2
            })
        );

        wave.remove_module(0, 1).unwrap();
        let mut guard = RepeatGuard::default();
        assert_eq!(guard.observe(&wave, 0), Ok(1));
        wave.commit_last(0).unwrap();
        assert_eq!(
            guard.observe(&wave, 0),
            Err(AttemptFailure::InfiniteLoopDetected {
                coord: (0, 0, 0),
                domain_len: 1
            })
        );
    }

    #[test]
    fn test_backtracking_reports_unsolvable_attempts() {
        let grid = Grid::with_unit_cells(Dimensions::new(2, 1, 1)).unwrap();
        let catalog = Catalog::new(vec![
            Module::new(0, "a", [0, 0, 1, 0, 0, 1]),
            Module::new(1, "b", [0, 0, 2, 0, 0, 2]),
        ])
        .unwrap();
        let domains = vec![ModuleSet::singleton(2, 0), ModuleSet::singleton(2, 1)];
        let mut rng = StdRng::seed_from_u64(5);
        let mut wave = Wave::new(&grid, &catalog, &domains, &mut rng);

        let result = Backtracking.run(&mut wave, &mut rng, &mut StepBudget::default());
        assert!(matches!(
            result,
            Err(AttemptFailure::Contradiction(Contradiction::NeighborMismatch { .. }))
        ));
    }

    #[test]
    fn test_step_budget_aborts_search() {
        let grid = Grid::with_unit_cells(Dimensions::new(3, 1, 1)).unwrap();
        let catalog = Catalog::new(vec![
            Module::new(0, "a", [0; 6]),
            Module::new(1, "b", [0; 6]),
        ])
        .unwrap();
        let domains = vec![catalog.all(); grid.len()];
        let mut rng = StdRng::seed_from_u64(0);

        for strategy in [Strategy::Greedy, Strategy::Backtracking] {
            let mut wave = Wave::new(&grid, &catalog, &domains, &mut rng);
            let mut budget = StepBudget::new(2);
            assert_eq!(
                strategy.run(&mut wave, &mut rng, &mut budget),
                Err(AttemptFailure::StepBudgetExhausted { steps: 2 })
            );
        }
    }

    #[test]
    fn test_both_strategies_fill_open_grid() {
        let grid = Grid::with_unit_cells(Dimensions::new(3, 2, 3)).unwrap();
        let catalog = Catalog::new(vec![
            Module::new(0, "a", [0; 6]),
            Module::new(1, "b", [0; 6]),
            Module::new(2, "c", [0; 6]),
        ])
        .unwrap();
        let domains = vec![catalog.all(); grid.len()];

        for strategy in [Strategy::Greedy, Strategy::Backtracking] {
            let mut rng = StdRng::seed_from_u64(11);
            let mut wave = Wave::new(&grid, &catalog, &domains, &mut rng);
            let mut budget = StepBudget::default();
            strategy.run(&mut wave, &mut rng, &mut budget).unwrap();
            assert!(wave.is_solved(), "{} left open cells", strategy.name());
            assert_eq!(wave.decided_modules().map(|m| m.len()), Some(grid.len()));
            assert!(budget.used() > 0);
        }
    }
}
