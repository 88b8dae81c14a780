//! Per-cell possibility state.
//!
//! A domain is a bitmask over catalog indices: bit `i` set means catalog
//! module `i` is still possible. Membership, removal and intersection with
//! the catalog's face masks are word operations.

/// Bits per mask word.
const WORD_BITS: usize = 64;

/// A set of catalog indices stored as a bitmask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleSet {
    words: Vec<u64>,
    len: usize,
}

impl ModuleSet {
    /// An empty set able to hold indices `0..capacity`.
    pub fn empty(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(WORD_BITS)],
            len: 0,
        }
    }

    /// A set containing every index in `0..capacity`.
    pub fn full(capacity: usize) -> Self {
        let mut set = Self::empty(capacity);
        for (word_index, word) in set.words.iter_mut().enumerate() {
            let remaining = capacity - word_index * WORD_BITS;
            *word = if remaining >= WORD_BITS {
                u64::MAX
            } else {
                (1u64 << remaining) - 1
            };
        }
        set.len = capacity;
        set
    }

    pub fn from_indices(capacity: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::empty(capacity);
        for index in indices {
            set.insert(index);
        }
        set
    }

    /// A set holding only `index`.
    pub fn singleton(capacity: usize, index: usize) -> Self {
        Self::from_indices(capacity, [index])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.words
            .get(index / WORD_BITS)
            .is_some_and(|word| word & (1u64 << (index % WORD_BITS)) != 0)
    }

    /// Adds `index`; returns `true` if it was not present.
    pub fn insert(&mut self, index: usize) -> bool {
        let bit = 1u64 << (index % WORD_BITS);
        let word = &mut self.words[index / WORD_BITS];
        if *word & bit != 0 {
            return false;
        }
        *word |= bit;
        self.len += 1;
        true
    }

    /// Removes `index`; returns `true` if it was present.
    pub fn remove(&mut self, index: usize) -> bool {
        let Some(word) = self.words.get_mut(index / WORD_BITS) else {
            return false;
        };
        let bit = 1u64 << (index % WORD_BITS);
        if *word & bit == 0 {
            return false;
        }
        *word &= !bit;
        self.len -= 1;
        true
    }

    /// Whether the two sets share at least one index.
    #[inline]
    pub fn intersects(&self, other: &ModuleSet) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(a, b)| a & b != 0)
    }

    /// Smallest index in the set.
    pub fn first(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, word)| **word != 0)
            .map(|(word_index, word)| word_index * WORD_BITS + word.trailing_zeros() as usize)
    }

    /// Indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let mut remaining = word;
                std::iter::from_fn(move || {
                    if remaining == 0 {
                        return None;
                    }
                    let bit = remaining.trailing_zeros() as usize;
                    // clear the lowest set bit
                    remaining &= remaining - 1;
                    Some(word_index * WORD_BITS + bit)
                })
            })
    }
}

/// Mutable state of one grid cell during an attempt.
///
/// Neighbour wiring lives in [`crate::grid::Grid`]; a cell only knows what
/// can still go into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub(crate) domain: ModuleSet,
    pub(crate) decided: bool,
}

impl Cell {
    pub fn new(domain: ModuleSet) -> Self {
        Self {
            domain,
            decided: false,
        }
    }

    pub fn domain(&self) -> &ModuleSet {
        &self.domain
    }

    /// True once the single remaining module has been committed.
    pub fn is_decided(&self) -> bool {
        self.decided
    }

    /// The committed module, if any.
    pub fn decided_module(&self) -> Option<usize> {
        if self.decided {
            self.domain.first()
        } else {
            None
        }
    }
}

/// Saved `(domain, decided)` pair of one cell.
#[derive(Clone, Debug)]
pub struct CellSnapshot {
    pub(crate) cell: usize,
    pub(crate) state: Cell,
}

impl CellSnapshot {
    pub fn capture(cell: usize, state: &Cell) -> Self {
        Self {
            cell,
            state: state.clone(),
        }
    }

    pub fn cell(&self) -> usize {
        self.cell
    }
}
