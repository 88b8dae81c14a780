//! Generation entry point: the retry loop around single attempts.
//!
//! One attempt builds a fresh [`Wave`] from the initial domains, applies the
//! initial constraints, runs the configured strategy and applies the final
//! constraints. Any failure inside an attempt only costs a retry; the caller
//! sees [`GenerationError::RetryBudgetExhausted`] once every attempt failed.
//!
//! Attempt seeds are drawn from a generator seeded with the run's seed, so a
//! run is fully reproducible from [`Generation::seed`].

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::assignment::{check_adjacency, Assignment};
use crate::cell::ModuleSet;
use crate::constraints::{apply_all, GenerationConstraint};
use crate::error::{AttemptFailure, CatalogError, Contradiction, GenerationError};
use crate::grid::{Coord, Dimensions, Grid};
use crate::modules::{Catalog, ModuleId};
use crate::solver::{SearchStrategy, StepBudget, Strategy, DEFAULT_MAX_STEPS};
use crate::wave::{DecisionRecord, Wave};

/// Retry count used by the command line when none is given.
pub const DEFAULT_RETRY_COUNT: usize = 10;

/// Restricts one cell to a subset of the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManualCell {
    pub coord: Coord,
    pub modules: Vec<ModuleId>,
}

/// A successful generation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generation {
    pub assignment: Assignment,
    /// Commits and rollbacks of the successful attempt.
    pub decisions: DecisionRecord,
    /// Seed that reproduces this run.
    pub seed: u64,
    /// Attempts used, counting the successful one.
    pub attempts: usize,
}

/// Configured generator for one grid and catalog.
pub struct Generator {
    grid: Grid,
    catalog: Catalog,
    domains: Vec<ModuleSet>,
    initial_constraints: Vec<Box<dyn GenerationConstraint>>,
    final_constraints: Vec<Box<dyn GenerationConstraint>>,
    strategy: Strategy,
    max_steps: u64,
    validate: bool,
}

impl Generator {
    /// Every cell starts out allowing the whole catalog.
    pub fn new(grid: Grid, catalog: Catalog) -> Self {
        let domains = vec![catalog.all(); grid.len()];
        Self {
            grid,
            catalog,
            domains,
            initial_constraints: Vec::new(),
            final_constraints: Vec::new(),
            strategy: Strategy::default(),
            max_steps: DEFAULT_MAX_STEPS,
            validate: false,
        }
    }

    /// A unit-cell grid of the given size.
    pub fn from_dimensions(
        dimensions: Dimensions,
        catalog: Catalog,
    ) -> Result<Self, GenerationError> {
        Ok(Self::new(Grid::with_unit_cells(dimensions)?, catalog))
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Narrows the listed cells to their module subsets.
    pub fn with_manual_cells(mut self, cells: &[ManualCell]) -> Result<Self, GenerationError> {
        for manual in cells {
            let cell = self.grid.index_of(manual.coord)?;
            if manual.modules.is_empty() {
                return Err(CatalogError::EmptySubset {
                    coord: manual.coord,
                }
                .into());
            }
            self.domains[cell] = self.catalog.subset(&manual.modules)?;
        }
        Ok(self)
    }

    /// Adds a constraint applied before the search. Fails if the constraint
    /// names a cell or module this generator does not have.
    pub fn with_initial_constraint(
        mut self,
        constraint: impl GenerationConstraint + 'static,
    ) -> Result<Self, GenerationError> {
        self.declare(&constraint, "initial")?;
        self.initial_constraints.push(Box::new(constraint));
        Ok(self)
    }

    /// Adds a constraint applied after every cell is decided.
    pub fn with_final_constraint(
        mut self,
        constraint: impl GenerationConstraint + 'static,
    ) -> Result<Self, GenerationError> {
        self.declare(&constraint, "final")?;
        self.final_constraints.push(Box::new(constraint));
        Ok(self)
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Step budget of a single attempt.
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Re-checks every adjacency of a solved assignment and warns about
    /// mismatches.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    fn declare(
        &self,
        constraint: &dyn GenerationConstraint,
        stage: &str,
    ) -> Result<(), GenerationError> {
        constraint.validate(&self.grid, &self.catalog)?;
        for issue in constraint.check(&self.catalog) {
            warn!(stage, constraint = constraint.name(), "{issue}");
        }
        Ok(())
    }

    /// Runs up to `retry_count` attempts. Without a seed one is drawn from
    /// system entropy.
    pub fn generate(
        &self,
        seed: Option<u64>,
        retry_count: usize,
    ) -> Result<Generation, GenerationError> {
        let started = Instant::now();
        let seed = seed.unwrap_or_else(rand::random);
        info!(
            seed,
            retry_count,
            strategy = self.strategy.name(),
            cells = self.grid.len(),
            modules = self.catalog.len(),
            "starting generation"
        );

        let mut seeds = StdRng::seed_from_u64(seed);
        for attempt in 1..=retry_count {
            let mut rng = StdRng::seed_from_u64(seeds.random());
            match self.attempt(attempt, &mut rng) {
                Ok((assignment, decisions)) => {
                    if self.validate {
                        self.validate_assignment(&assignment);
                    }
                    info!(
                        seed,
                        attempts = attempt,
                        decisions = decisions.len(),
                        elapsed = ?started.elapsed(),
                        "generation finished"
                    );
                    return Ok(Generation {
                        assignment,
                        decisions,
                        seed,
                        attempts: attempt,
                    });
                }
                Err(failure) => debug!(attempt, "attempt failed: {failure}"),
            }
        }

        warn!(
            seed,
            attempts = retry_count,
            elapsed = ?started.elapsed(),
            "retry budget exhausted"
        );
        Err(GenerationError::RetryBudgetExhausted {
            attempts: retry_count,
        })
    }

    fn attempt(
        &self,
        attempt: usize,
        rng: &mut StdRng,
    ) -> Result<(Assignment, DecisionRecord), AttemptFailure> {
        let started = Instant::now();
        let mut wave = Wave::new(&self.grid, &self.catalog, &self.domains, rng);
        let mut budget = StepBudget::new(self.max_steps);

        let outcome = self.collapse(&mut wave, rng, &mut budget);
        debug!(
            attempt,
            steps = budget.used(),
            decisions = wave.decisions().len(),
            elapsed = ?started.elapsed(),
            ok = outcome.is_ok(),
            "attempt done"
        );
        outcome?;

        let Some(modules) = wave.decided_modules() else {
            let open = (0..self.grid.len())
                .find(|&cell| !wave.cell(cell).is_decided())
                .unwrap_or_default();
            return Err(Contradiction::EmptyDomain {
                coord: self.grid.coord_of(open),
            }
            .into());
        };
        let assignment = Assignment::from_grid_order(self.grid.dimensions(), modules);
        Ok((assignment, wave.into_decisions()))
    }

    fn collapse(
        &self,
        wave: &mut Wave<'_>,
        rng: &mut StdRng,
        budget: &mut StepBudget,
    ) -> Result<(), AttemptFailure> {
        apply_all(&self.initial_constraints, wave, "initial")?;
        self.strategy.run(wave, rng, budget)?;
        apply_all(&self.final_constraints, wave, "final")?;
        Ok(())
    }

    fn validate_assignment(&self, assignment: &Assignment) {
        let violations = check_adjacency(&self.catalog, assignment);
        for (a, b) in &violations {
            warn!(?a, ?b, "adjacent modules do not fit");
        }
        if violations.is_empty() {
            debug!("assignment passed adjacency check");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{BorderConstraint, SetModuleConstraint};
    use crate::error::TopologyError;
    use crate::geometry::Direction;
    use crate::modules::{pipes, Module, AIR};

    fn self_compatible() -> Catalog {
        Catalog::new(vec![
            Module::new(0, "a", [1, 0, 0, 1, 0, 0]),
            Module::new(1, "b", [1, 0, 0, 1, 0, 0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_self_compatible_pair_solves_first_try() {
        for strategy in [Strategy::Backtracking, Strategy::Greedy] {
            let generator = Generator::from_dimensions(Dimensions::new(2, 1, 1), self_compatible())
                .unwrap()
                .with_strategy(strategy);
            let generation = generator.generate(Some(1), 5).unwrap();
            assert_eq!(generation.attempts, 1);
            assert_eq!(generation.seed, 1);
            assert_eq!(generation.assignment.len(), 2);
            assert_eq!(generation.decisions.len(), 2);
        }
    }

    #[test]
    fn test_incompatible_catalog_exhausts_retries() {
        let catalog = Catalog::new(vec![Module::new(0, "lonely", [0, 0, 1, 0, 0, 2])]).unwrap();
        for strategy in [Strategy::Backtracking, Strategy::Greedy] {
            let generator = Generator::from_dimensions(Dimensions::new(2, 1, 1), catalog.clone())
                .unwrap()
                .with_strategy(strategy);
            assert_eq!(
                generator.generate(Some(9), 3),
                Err(GenerationError::RetryBudgetExhausted { attempts: 3 })
            );
        }
    }

    #[test]
    fn test_zero_retries_fails_without_searching() {
        let generator =
            Generator::from_dimensions(Dimensions::new(1, 1, 1), self_compatible()).unwrap();
        assert_eq!(
            generator.generate(None, 0),
            Err(GenerationError::RetryBudgetExhausted { attempts: 0 })
        );
    }

    #[test]
    fn test_same_seed_same_result() {
        let generator = Generator::from_dimensions(Dimensions::new(4, 3, 4), pipes()).unwrap();
        let first = generator.generate(Some(42), 20);
        let second = generator.generate(Some(42), 20);
        assert_eq!(first, second);
    }

    #[test]
    fn test_pipes_assignments_are_consistent() {
        let generator = Generator::from_dimensions(Dimensions::new(4, 3, 4), pipes())
            .unwrap()
            .with_validation(true);
        for seed in 0..5 {
            let generation = generator.generate(Some(seed), 50).unwrap();
            assert!(
                check_adjacency(generator.catalog(), &generation.assignment).is_empty(),
                "seed {seed} produced mismatched neighbours"
            );
        }
    }

    #[test]
    fn test_border_constraint_is_enforced() {
        let generator = Generator::from_dimensions(Dimensions::new(3, 2, 3), pipes())
            .unwrap()
            .with_initial_constraint(BorderConstraint::uniform(AIR))
            .unwrap();
        let generation = generator.generate(Some(7), 50).unwrap();

        let grid = generator.grid();
        let catalog = generator.catalog();
        for direction in Direction::ALL {
            for cell in grid.boundary(direction) {
                let id = generation.assignment.get(grid.coord_of(cell)).unwrap();
                let module = catalog.by_id(id).unwrap();
                assert_eq!(module.face(direction), AIR, "{} leaks at {direction}", module.name);
            }
        }
    }

    #[test]
    fn test_manual_cells_and_set_module() {
        let catalog = pipes();
        let generator = Generator::from_dimensions(Dimensions::new(3, 1, 3), catalog)
            .unwrap()
            .with_manual_cells(&[ManualCell {
                coord: (0, 0, 0),
                modules: vec![ModuleId(0)],
            }])
            .unwrap()
            .with_initial_constraint(SetModuleConstraint::new((2, 0, 2), ModuleId(0)))
            .unwrap();
        let generation = generator.generate(Some(3), 50).unwrap();
        assert_eq!(generation.assignment.get((0, 0, 0)), Some(ModuleId(0)));
        assert_eq!(generation.assignment.get((2, 0, 2)), Some(ModuleId(0)));
    }

    #[test]
    fn test_configuration_errors_fail_fast() {
        assert!(matches!(
            Generator::from_dimensions(Dimensions::new(0, 2, 2), pipes()),
            Err(GenerationError::InvalidTopology(TopologyError::InvalidDimensions { .. }))
        ));

        let generator = Generator::from_dimensions(Dimensions::new(2, 2, 2), pipes()).unwrap();
        let out_of_range = generator.with_manual_cells(&[ManualCell {
            coord: (2, 0, 0),
            modules: vec![ModuleId(0)],
        }]);
        assert!(matches!(
            out_of_range,
            Err(GenerationError::InvalidTopology(TopologyError::OutOfRange { .. }))
        ));

        let generator = Generator::from_dimensions(Dimensions::new(2, 2, 2), pipes()).unwrap();
        assert!(matches!(
            generator.with_manual_cells(&[ManualCell {
                coord: (0, 0, 0),
                modules: vec![ModuleId(99)],
            }]),
            Err(GenerationError::InvalidCatalog(CatalogError::UnknownModule(ModuleId(99))))
        ));
    }

    #[test]
    fn test_bad_set_module_fails_before_search() {
        let generator = || Generator::from_dimensions(Dimensions::new(2, 1, 1), pipes()).unwrap();

        assert!(matches!(
            generator().with_initial_constraint(SetModuleConstraint::new((9, 0, 0), ModuleId(0))),
            Err(GenerationError::InvalidTopology(TopologyError::OutOfRange { coord: (9, 0, 0) }))
        ));
        assert!(matches!(
            generator().with_final_constraint(SetModuleConstraint::new((0, 0, 0), ModuleId(500))),
            Err(GenerationError::InvalidCatalog(CatalogError::UnknownModule(ModuleId(500))))
        ));
    }

    #[test]
    fn test_border_rejects_pinned_cell_with_wrong_face() {
        let catalog = Catalog::new(vec![
            Module::new(0, "plain", [0; 6]),
            Module::new(1, "capped", [0, 5, 0, 0, 0, 0]),
        ])
        .unwrap();

        let pinned = |id: u32| {
            Generator::from_dimensions(Dimensions::new(1, 1, 1), catalog.clone())
                .unwrap()
                .with_manual_cells(&[ManualCell {
                    coord: (0, 0, 0),
                    modules: vec![ModuleId(id)],
                }])
                .unwrap()
                .with_initial_constraint(BorderConstraint::new().with_face(Direction::Up, 5))
                .unwrap()
        };

        assert_eq!(
            pinned(0).generate(Some(2), 3),
            Err(GenerationError::RetryBudgetExhausted { attempts: 3 })
        );
        let generation = pinned(1).generate(Some(2), 3).unwrap();
        assert_eq!(generation.assignment.modules(), &[ModuleId(1)]);
    }
}
