use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// The two solver strategies under comparison.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlgorithmType {
    Genetic,
    Tournament,
}

impl AlgorithmType {
    /// Every declared category, in reporting order.
    pub const ALL: [AlgorithmType; 2] = [AlgorithmType::Genetic, AlgorithmType::Tournament];

    /// The literal passed on the solver command line and written in the record store.
    pub fn label(&self) -> &'static str {
        match self {
            AlgorithmType::Genetic => "Genetic",
            AlgorithmType::Tournament => "Tournament",
        }
    }
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AlgorithmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("genetic") {
            Ok(AlgorithmType::Genetic)
        } else if s.eq_ignore_ascii_case("tournament") {
            Ok(AlgorithmType::Tournament)
        } else {
            Err(format!("unknown algorithm type '{}'", s))
        }
    }
}

/// One (board size, algorithm, seed) triple: the identity of a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunSpec {
    pub n_queens: u32,
    pub algorithm: AlgorithmType,
    pub seed: i64,
}

impl fmt::Display for RunSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N={}, Algorithm={}, Seed={}", self.n_queens, self.algorithm, self.seed)
    }
}

/// Cartesian product of board sizes, algorithms and a contiguous seed range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterGrid {
    pub n_values: Vec<u32>,
    pub algorithms: Vec<AlgorithmType>,
    pub seeds: Range<i64>,
}

impl ParameterGrid {
    pub fn new(n_values: Vec<u32>, algorithms: Vec<AlgorithmType>, seeds: Range<i64>) -> Self {
        Self { n_values, algorithms, seeds }
    }

    /// Number of runs implied by the grid.
    pub fn len(&self) -> usize {
        self.n_values
            .len()
            .saturating_mul(self.algorithms.len())
            .saturating_mul(self.seed_count())
    }

    fn seed_count(&self) -> usize {
        if self.seeds.end <= self.seeds.start {
            return 0;
        }
        usize::try_from(self.seeds.end.abs_diff(self.seeds.start)).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Triples in size -> algorithm -> seed order.
    pub fn iter(&self) -> impl Iterator<Item = RunSpec> + '_ {
        self.n_values.iter().flat_map(move |&n_queens| {
            self.algorithms.iter().flat_map(move |&algorithm| {
                self.seeds.clone().map(move |seed| RunSpec { n_queens, algorithm, seed })
            })
        })
    }

    /// Random access by grid index, matching the order of `iter`.
    pub fn get(&self, index: usize) -> Option<RunSpec> {
        if index >= self.len() {
            return None;
        }
        let seeds = self.seed_count();
        let per_size = self.algorithms.len().saturating_mul(seeds);
        let n_queens = self.n_values[index / per_size];
        let rest = index % per_size;
        let algorithm = self.algorithms[rest / seeds];
        let seed = self.seeds.start.wrapping_add((rest % seeds) as i64);
        Some(RunSpec { n_queens, algorithm, seed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_grid() -> ParameterGrid {
        ParameterGrid::new(
            vec![4, 8],
            vec![AlgorithmType::Genetic, AlgorithmType::Tournament],
            0..2,
        )
    }

    #[test]
    fn iterates_size_then_algorithm_then_seed() {
        let grid = small_grid();
        let order: Vec<(u32, AlgorithmType, i64)> =
            grid.iter().map(|s| (s.n_queens, s.algorithm, s.seed)).collect();

        use AlgorithmType::*;
        assert_eq!(
            order,
            vec![
                (4, Genetic, 0),
                (4, Genetic, 1),
                (4, Tournament, 0),
                (4, Tournament, 1),
                (8, Genetic, 0),
                (8, Genetic, 1),
                (8, Tournament, 0),
                (8, Tournament, 1),
            ]
        );
        assert_eq!(grid.len(), 8);
    }

    #[test]
    fn get_matches_iteration_order() {
        let grid = ParameterGrid::new(vec![4, 6, 10], AlgorithmType::ALL.to_vec(), 3..7);
        for (i, spec) in grid.iter().enumerate() {
            assert_eq!(grid.get(i), Some(spec));
        }
        assert_eq!(grid.get(grid.len()), None);
    }

    #[test]
    fn empty_seed_range_gives_empty_grid() {
        let grid = ParameterGrid::new(vec![4], AlgorithmType::ALL.to_vec(), 5..5);
        assert!(grid.is_empty());
        assert_eq!(grid.iter().count(), 0);
        assert_eq!(grid.get(0), None);
    }

    #[test]
    fn extreme_seed_ranges_do_not_overflow() {
        let whole = ParameterGrid::new(vec![4], vec![AlgorithmType::Genetic], i64::MIN..i64::MAX);
        assert!(!whole.is_empty());
        assert_eq!(whole.get(0).map(|s| s.seed), Some(i64::MIN));
        assert_eq!(whole.get(1).map(|s| s.seed), Some(i64::MIN + 1));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(whole.get(whole.len() - 1).map(|s| s.seed), Some(i64::MAX - 1));

        let reversed = ParameterGrid::new(vec![4], AlgorithmType::ALL.to_vec(), i64::MAX..i64::MIN);
        assert_eq!(reversed.len(), 0);
        assert_eq!(reversed.get(0), None);

        let top = ParameterGrid::new(vec![4, 8], vec![AlgorithmType::Tournament], i64::MAX - 2..i64::MAX);
        assert_eq!(top.len(), 4);
        assert_eq!(top.get(3).map(|s| (s.n_queens, s.seed)), Some((8, i64::MAX - 1)));
    }

    #[test]
    fn algorithm_labels_parse_case_insensitively() {
        assert_eq!(" genetic ".parse::<AlgorithmType>(), Ok(AlgorithmType::Genetic));
        assert_eq!("TOURNAMENT".parse::<AlgorithmType>(), Ok(AlgorithmType::Tournament));
        assert!("Annealing".parse::<AlgorithmType>().is_err());
    }
}
