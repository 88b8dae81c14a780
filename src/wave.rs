//! Cell domains and the arc-consistency propagation engine.
//!
//! A [`Wave`] owns the mutable state of one generation attempt: every cell's
//! domain, the selection heap, the decision record and the undo trail. It
//! borrows the immutable grid topology and module catalog.
//!
//! Propagation runs from an explicit FIFO queue of face filters. Removing a
//! module from a cell checks, for each neighbour direction, whether the
//! removed module's label on that face just went extinct in the cell; if so
//! the neighbour gets a filter dropping every module that expects that label
//! back. The queue is drained before any public operation returns.

use std::collections::VecDeque;

use rand::Rng;
use rustc_hash::FxHashMap;

use crate::cell::{Cell, CellSnapshot, ModuleSet};
use crate::error::Contradiction;
use crate::geometry::Direction;
use crate::grid::{Coord, Grid};
use crate::heap::CellHeap;
use crate::modules::{Catalog, Label, ModuleId};

/// What happened to a cell in the decision record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecisionKind {
    /// The module was committed to the cell.
    Commit,
    /// A backtrack undid an earlier commit of the module.
    Rollback,
}

/// One entry of the append-only decision record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Decision {
    pub coord: Coord,
    pub module: ModuleId,
    pub kind: DecisionKind,
}

/// Ordered stream of commits and rollbacks, in the order they happened.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecisionRecord {
    entries: Vec<Decision>,
}

impl DecisionRecord {
    pub fn new(entries: Vec<Decision>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Decision] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push(&mut self, decision: Decision) {
        self.entries.push(decision);
    }

    /// Feeds every entry to `on_decision` in recorded order.
    pub fn replay(&self, mut on_decision: impl FnMut(&Decision)) {
        for decision in &self.entries {
            on_decision(decision);
        }
    }

    /// Calls `on_cell_decided` for every commit that survived to the end,
    /// in the order the commits were made.
    pub fn replay_final(&self, mut on_cell_decided: impl FnMut(Coord, ModuleId)) {
        // a commit survives if no later rollback of the same cell follows it
        let mut survives = vec![true; self.entries.len()];
        let mut rolled_back: FxHashMap<Coord, usize> = FxHashMap::default();
        for (position, decision) in self.entries.iter().enumerate().rev() {
            match decision.kind {
                DecisionKind::Rollback => {
                    *rolled_back.entry(decision.coord).or_default() += 1;
                }
                DecisionKind::Commit => {
                    if let Some(pending) = rolled_back.get_mut(&decision.coord) {
                        if *pending > 0 {
                            *pending -= 1;
                            survives[position] = false;
                        }
                    }
                }
            }
        }
        for (decision, keep) in self.entries.iter().zip(survives) {
            if keep && decision.kind == DecisionKind::Commit {
                on_cell_decided(decision.coord, decision.module);
            }
        }
    }
}

/// A pending face filter: drop from `cell` every module whose label towards
/// `face` does (`must_match = false`) or does not (`must_match = true`)
/// equal `label`.
#[derive(Clone, Copy, Debug)]
struct FaceFilter {
    cell: usize,
    face: Direction,
    label: Label,
    must_match: bool,
}

/// Position in the undo trail to return to.
#[derive(Clone, Copy, Debug)]
pub struct Checkpoint {
    trail_len: usize,
}

/// Mutable solver state for one attempt.
pub struct Wave<'a> {
    grid: &'a Grid,
    catalog: &'a Catalog,
    cells: Vec<Cell>,
    heap: CellHeap,
    pending: VecDeque<FaceFilter>,
    decisions: DecisionRecord,
    /// Snapshots taken since the oldest open checkpoint, oldest first.
    trail: Vec<CellSnapshot>,
    /// Epoch in which each cell was last saved to the trail.
    saved_in: Vec<u64>,
    /// Current checkpoint epoch; zero while no checkpoint is open.
    epoch: u64,
    epochs_issued: u64,
}

impl<'a> Wave<'a> {
    /// Starts an attempt from the given initial domains (one per cell).
    pub fn new<R: Rng + ?Sized>(
        grid: &'a Grid,
        catalog: &'a Catalog,
        domains: &[ModuleSet],
        rng: &mut R,
    ) -> Self {
        debug_assert_eq!(domains.len(), grid.len());

        let cells: Vec<Cell> = domains.iter().cloned().map(Cell::new).collect();
        let mut heap = CellHeap::new(cells.len(), rng);
        for (index, cell) in cells.iter().enumerate() {
            heap.insert(index, cell.domain.len());
        }

        Self {
            grid,
            catalog,
            cells,
            heap,
            pending: VecDeque::new(),
            decisions: DecisionRecord::default(),
            trail: Vec::new(),
            saved_in: vec![0; grid.len()],
            epoch: 0,
            epochs_issued: 0,
        }
    }

    pub fn grid(&self) -> &'a Grid {
        self.grid
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn cell(&self, cell: usize) -> &Cell {
        &self.cells[cell]
    }

    #[inline]
    pub fn domain_len(&self, cell: usize) -> usize {
        self.cells[cell].domain.len()
    }

    pub fn decisions(&self) -> &DecisionRecord {
        &self.decisions
    }

    /// The undecided cell with the fewest candidates.
    #[inline]
    pub fn most_constrained(&self) -> Option<usize> {
        self.heap.peek_min()
    }

    /// Whether every cell has been committed.
    pub fn is_solved(&self) -> bool {
        self.heap.is_empty()
    }

    /// Committed module id per cell, in grid index order.
    pub fn decided_modules(&self) -> Option<Vec<ModuleId>> {
        self.cells
            .iter()
            .map(|cell| cell.decided_module().map(|m| self.catalog.module(m).id))
            .collect()
    }

    /// Consumes the wave, returning its decision record.
    pub fn into_decisions(self) -> DecisionRecord {
        self.decisions
    }

    /// Restricts `cell` by the label its `face` must (or must not) show.
    ///
    /// No-op once the domain holds a single module. Fails if the filter would
    /// empty the domain or if the cascade empties any other domain.
    pub fn filter(
        &mut self,
        cell: usize,
        face: Direction,
        label: Label,
        must_match: bool,
    ) -> Result<(), Contradiction> {
        self.pending.clear();
        self.pending.push_back(FaceFilter {
            cell,
            face,
            label,
            must_match,
        });
        self.propagate()
    }

    /// Removes catalog module `module` from `cell` and propagates to a fixed
    /// point.
    ///
    /// Rejected without any change when the module is the cell's last
    /// candidate.
    pub fn remove_module(&mut self, cell: usize, module: usize) -> Result<(), Contradiction> {
        self.pending.clear();
        self.detach(cell, module)?;
        self.propagate()
    }

    /// Commits the single remaining module of `cell`.
    pub fn commit_last(&mut self, cell: usize) -> Result<(), Contradiction> {
        match self.cells[cell].domain.first() {
            Some(module) => self.commit(cell, module),
            None => Err(self.empty(cell)),
        }
    }

    /// Forces `cell` to hold exactly `module`, records the commit, checks it
    /// against decided neighbours and filters undecided ones.
    pub fn commit(&mut self, cell: usize, module: usize) -> Result<(), Contradiction> {
        self.pending.clear();

        let state = &self.cells[cell];
        if !state.domain.contains(module) {
            return Err(self.empty(cell));
        }
        if state.decided {
            // committing the same module twice changes nothing
            return Ok(());
        }

        self.save(cell);
        let capacity = self.catalog.len();
        let state = &mut self.cells[cell];
        state.domain = ModuleSet::singleton(capacity, module);
        state.decided = true;
        self.heap.remove(cell);

        let catalog = self.catalog;
        let chosen = catalog.module(module);
        let coord = self.grid.coord_of(cell);
        self.decisions.push(Decision {
            coord,
            module: chosen.id,
            kind: DecisionKind::Commit,
        });
        tracing::trace!(?coord, module = %chosen.id, "commit");

        for dir in Direction::ALL {
            let Some(neighbor) = self.grid.neighbor(cell, dir) else {
                continue;
            };
            if let Some(other) = self.cells[neighbor].decided_module() {
                if !chosen.fits(dir, catalog.module(other)) {
                    return Err(Contradiction::NeighborMismatch {
                        coord,
                        direction: dir,
                    });
                }
            }
        }

        for dir in Direction::ALL {
            if let Some(neighbor) = self.grid.neighbor(cell, dir) {
                self.pending.push_back(FaceFilter {
                    cell: neighbor,
                    face: dir.opposite(),
                    label: chosen.face(dir),
                    must_match: true,
                });
            }
        }
        self.propagate()
    }

    /// Opens a checkpoint. Every cell mutated from now on is saved once
    /// before its first change.
    pub fn checkpoint(&mut self) -> Checkpoint {
        self.start_epoch();
        Checkpoint {
            trail_len: self.trail.len(),
        }
    }

    /// Rolls every cell back to its state at `checkpoint` and reopens it.
    ///
    /// Cells that lose their commit get a rollback entry in the decision
    /// record.
    pub fn restore(&mut self, checkpoint: &Checkpoint) {
        self.pending.clear();
        while self.trail.len() > checkpoint.trail_len {
            let Some(snapshot) = self.trail.pop() else {
                break;
            };
            let cell = snapshot.cell;

            if let Some(module) = self.cells[cell].decided_module() {
                if !snapshot.state.decided {
                    self.decisions.push(Decision {
                        coord: self.grid.coord_of(cell),
                        module: self.catalog.module(module).id,
                        kind: DecisionKind::Rollback,
                    });
                }
            }

            self.cells[cell] = snapshot.state;
            let restored = &self.cells[cell];
            if restored.decided {
                self.heap.remove(cell);
            } else {
                self.heap.insert(cell, restored.domain.len());
            }
        }
        self.start_epoch();
    }

    fn start_epoch(&mut self) {
        self.epochs_issued += 1;
        self.epoch = self.epochs_issued;
    }

    /// Saves `cell` to the trail unless it was already saved in this epoch.
    #[inline]
    fn save(&mut self, cell: usize) {
        if self.epoch == 0 || self.saved_in[cell] == self.epoch {
            return;
        }
        self.saved_in[cell] = self.epoch;
        self.trail.push(CellSnapshot::capture(cell, &self.cells[cell]));
    }

    fn empty(&self, cell: usize) -> Contradiction {
        Contradiction::EmptyDomain {
            coord: self.grid.coord_of(cell),
        }
    }

    /// Removes one module without draining the queue; queues filters for
    /// every label that went extinct.
    fn detach(&mut self, cell: usize, module: usize) -> Result<(), Contradiction> {
        let state = &self.cells[cell];
        if !state.domain.contains(module) {
            return Ok(());
        }
        if state.decided || state.domain.len() == 1 {
            return Err(self.empty(cell));
        }

        self.save(cell);
        let state = &mut self.cells[cell];
        state.domain.remove(module);
        let remaining = state.domain.len();
        self.heap.update_key(cell, remaining);

        let catalog = self.catalog;
        let removed = catalog.module(module);
        for dir in Direction::ALL {
            let Some(neighbor) = self.grid.neighbor(cell, dir) else {
                continue;
            };
            let label = removed.face(dir);
            let still_supported = catalog
                .with_face(dir, label)
                .is_some_and(|carriers| self.cells[cell].domain.intersects(carriers));
            if !still_supported {
                self.pending.push_back(FaceFilter {
                    cell: neighbor,
                    face: dir.opposite(),
                    label,
                    must_match: false,
                });
            }
        }
        Ok(())
    }

    /// Drains the filter queue.
    fn propagate(&mut self) -> Result<(), Contradiction> {
        while let Some(filter) = self.pending.pop_front() {
            self.apply(filter)?;
        }
        Ok(())
    }

    fn apply(&mut self, filter: FaceFilter) -> Result<(), Contradiction> {
        let state = &self.cells[filter.cell];
        if state.decided || state.domain.len() <= 1 {
            return Ok(());
        }

        let carriers = self.catalog.with_face(filter.face, filter.label);
        let doomed: Vec<usize> = state
            .domain
            .iter()
            .filter(|&module| {
                let matches = carriers.is_some_and(|set| set.contains(module));
                matches != filter.must_match
            })
            .collect();

        for module in doomed {
            self.detach(filter.cell, module)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Dimensions;
    use crate::modules::Module;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Three modules distinguished only by their +X / -X connectors.
    fn chain_catalog() -> Catalog {
        Catalog::new(vec![
            Module::new(0, "a", [0, 0, 1, 0, 0, 1]),
            Module::new(1, "b", [0, 0, 2, 0, 0, 2]),
            Module::new(2, "c", [0, 0, 1, 0, 0, 2]),
        ])
        .unwrap()
    }

    fn line(length: i32) -> Grid {
        Grid::with_unit_cells(Dimensions::new(length, 1, 1)).unwrap()
    }

    fn wave<'a>(grid: &'a Grid, catalog: &'a Catalog) -> Wave<'a> {
        let domains = vec![catalog.all(); grid.len()];
        Wave::new(grid, catalog, &domains, &mut StdRng::seed_from_u64(1))
    }

    fn domain(wave: &Wave, cell: usize) -> Vec<usize> {
        wave.cell(cell).domain().iter().collect()
    }

    #[test]
    fn test_filter_keeps_matching_modules() {
        let grid = line(1);
        let catalog = chain_catalog();
        let mut wave = wave(&grid, &catalog);

        wave.filter(0, Direction::Right, 1, true).unwrap();
        assert_eq!(domain(&wave, 0), vec![0, 2]);

        wave.filter(0, Direction::Left, 1, false).unwrap();
        assert_eq!(domain(&wave, 0), vec![2]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let grid = line(3);
        let catalog = chain_catalog();
        let mut wave = wave(&grid, &catalog);

        wave.filter(1, Direction::Right, 2, true).unwrap();
        let before: Vec<Vec<usize>> = (0..3).map(|cell| domain(&wave, cell)).collect();
        wave.filter(1, Direction::Right, 2, true).unwrap();
        let after: Vec<Vec<usize>> = (0..3).map(|cell| domain(&wave, cell)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_filter_that_empties_domain_fails() {
        let grid = line(1);
        let catalog = chain_catalog();
        let mut wave = wave(&grid, &catalog);

        let result = wave.filter(0, Direction::Up, 9, true);
        assert_eq!(result, Err(Contradiction::EmptyDomain { coord: (0, 0, 0) }));
        // the last candidate is never removed
        assert_eq!(wave.domain_len(0), 1);
    }

    #[test]
    fn test_filter_skips_single_candidate_cells() {
        let grid = line(1);
        let catalog = chain_catalog();
        let mut wave = wave(&grid, &catalog);
        wave.remove_module(0, 0).unwrap();
        wave.remove_module(0, 1).unwrap();

        assert_eq!(wave.filter(0, Direction::Up, 9, true), Ok(()));
        assert_eq!(domain(&wave, 0), vec![2]);
    }

    #[test]
    fn test_remove_last_module_is_rejected() {
        let grid = line(2);
        let catalog = chain_catalog();
        let mut wave = wave(&grid, &catalog);
        wave.remove_module(0, 1).unwrap();
        wave.remove_module(0, 2).unwrap();

        assert!(wave.remove_module(0, 0).is_err());
        assert_eq!(domain(&wave, 0), vec![0]);
    }

    #[test]
    fn test_extinct_label_cascades_to_neighbor() {
        let grid = line(3);
        let catalog = chain_catalog();
        let mut wave = wave(&grid, &catalog);

        // cell 0 keeps only "a" (right face 1): the right neighbour must now
        // show 1 on its left face, which only "a" does
        wave.remove_module(0, 1).unwrap();
        wave.remove_module(0, 2).unwrap();
        assert_eq!(domain(&wave, 1), vec![0]);
        // and the cascade continues one further cell
        assert_eq!(domain(&wave, 2), vec![0]);
    }

    #[test]
    fn test_domains_never_grow_without_restore() {
        let grid = line(4);
        let catalog = chain_catalog();
        let mut wave = wave(&grid, &catalog);

        let mut sizes: Vec<usize> = (0..4).map(|cell| wave.domain_len(cell)).collect();
        for (cell, module) in [(3, 1), (0, 2), (2, 0)] {
            let _ = wave.remove_module(cell, module);
            let now: Vec<usize> = (0..4).map(|cell| wave.domain_len(cell)).collect();
            assert!(now.iter().zip(&sizes).all(|(n, s)| n <= s));
            sizes = now;
        }
    }

    #[test]
    fn test_commit_filters_neighbors_and_records() {
        let grid = line(2);
        let catalog = chain_catalog();
        let mut wave = wave(&grid, &catalog);

        wave.commit(0, 1).unwrap();
        assert!(wave.cell(0).is_decided());
        // "b" shows 2 to the right: neighbour needs 2 on its left face
        assert_eq!(domain(&wave, 1), vec![1, 2]);
        assert_eq!(wave.most_constrained(), Some(1));
        assert_eq!(
            wave.decisions().entries(),
            &[Decision {
                coord: (0, 0, 0),
                module: ModuleId(1),
                kind: DecisionKind::Commit
            }]
        );
    }

    #[test]
    fn test_commit_rejects_mismatched_decided_neighbor() {
        let grid = line(2);
        let catalog = chain_catalog();
        let domains = vec![
            ModuleSet::singleton(3, 0),
            ModuleSet::singleton(3, 1),
        ];
        let mut wave = Wave::new(&grid, &catalog, &domains, &mut StdRng::seed_from_u64(1));

        wave.commit_last(0).unwrap();
        assert_eq!(
            wave.commit_last(1),
            Err(Contradiction::NeighborMismatch {
                coord: (1, 0, 0),
                direction: Direction::Left
            })
        );
    }

    #[test]
    fn test_restore_undoes_changes_and_logs_rollback() {
        let grid = line(3);
        let catalog = chain_catalog();
        let mut wave = wave(&grid, &catalog);
        let initial: Vec<Vec<usize>> = (0..3).map(|cell| domain(&wave, cell)).collect();

        let checkpoint = wave.checkpoint();
        wave.commit(1, 0).unwrap();
        wave.remove_module(2, 0).unwrap_err();
        wave.restore(&checkpoint);

        let restored: Vec<Vec<usize>> = (0..3).map(|cell| domain(&wave, cell)).collect();
        assert_eq!(restored, initial);
        assert!(!wave.cell(1).is_decided());
        assert!(!wave.is_solved());

        let kinds: Vec<DecisionKind> = wave.decisions().entries().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DecisionKind::Commit, DecisionKind::Rollback]);
    }

    #[test]
    fn test_nested_checkpoints_restore_in_order() {
        let grid = line(2);
        let catalog = chain_catalog();
        let mut wave = wave(&grid, &catalog);

        let outer = wave.checkpoint();
        wave.remove_module(0, 1).unwrap();
        let after_outer = domain(&wave, 0);

        let inner = wave.checkpoint();
        wave.remove_module(0, 0).unwrap();
        wave.restore(&inner);
        assert_eq!(domain(&wave, 0), after_outer);

        // a fresh change after restoring the inner checkpoint is undone too
        wave.remove_module(0, 2).unwrap();
        wave.restore(&outer);
        assert_eq!(domain(&wave, 0), vec![0, 1, 2]);
        assert_eq!(domain(&wave, 1), vec![0, 1, 2]);
    }

    #[test]
    fn test_replay_final_skips_rolled_back_commits() {
        let record = DecisionRecord::new(vec![
            Decision { coord: (0, 0, 0), module: ModuleId(1), kind: DecisionKind::Commit },
            Decision { coord: (1, 0, 0), module: ModuleId(2), kind: DecisionKind::Commit },
            Decision { coord: (1, 0, 0), module: ModuleId(2), kind: DecisionKind::Rollback },
            Decision { coord: (1, 0, 0), module: ModuleId(0), kind: DecisionKind::Commit },
        ]);

        let mut seen = Vec::new();
        record.replay_final(|coord, module| seen.push((coord, module)));
        assert_eq!(
            seen,
            vec![((0, 0, 0), ModuleId(1)), ((1, 0, 0), ModuleId(0))]
        );

        let mut count = 0;
        record.replay(|_| count += 1);
        assert_eq!(count, 4);
    }
}
