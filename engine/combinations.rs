// ========================================================================================
//
//               THE ASSIGNMENT ENUMERATOR: EVERY LABELING, EXACTLY ONCE
//
// ========================================================================================
//
// Given `n` distinguishable items and a capacity per group, the enumerator walks every
// assignment `item -> group` whose per-group counts stay within capacity. Assignments
// come out in lexicographic order of the group vector, each exactly once, together with
// the capacity still left in every group.
//
// The walk is an odometer. `advance` releases the rightmost item it can move to a
// higher group with room left, moves it, and refills every item to its right with the
// smallest group that still has room. Refilling always succeeds: placing a prefix within
// capacity leaves at least as much room as there are items still to place, which is
// checked once, at `restart`.

/// One enumerated assignment, owned. Produced by the `Iterator` implementation so that
/// batches of candidates can be shipped to worker threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// 0-based group of each item.
    pub assignment: Vec<usize>,
    /// Capacity left in each group after this assignment.
    pub residual: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct AssignmentEnumerator {
    capacity: Vec<usize>,
    current: Vec<usize>,
    residual: Vec<usize>,
    has_more: bool,
}

impl AssignmentEnumerator {
    /// Positions the enumerator on the first assignment of `num_items` items into
    /// groups of the given capacities. If the items cannot fit, nothing is enumerated.
    pub fn new(num_items: usize, capacity: Vec<usize>) -> Self {
        let mut enumerator = Self {
            current: vec![0; num_items],
            residual: capacity.clone(),
            capacity,
            has_more: false,
        };
        enumerator.restart();
        enumerator
    }

    /// Rewinds to the first assignment.
    pub fn restart(&mut self) {
        self.residual.clone_from(&self.capacity);
        let room: usize = self.capacity.iter().sum();
        self.has_more = room >= self.current.len();
        if self.has_more {
            self.fill_from(0);
        }
    }

    #[inline]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// The current assignment, 0-based group per item.
    #[inline]
    pub fn current(&self) -> &[usize] {
        &self.current
    }

    /// Capacity left in each group under the current assignment.
    #[inline]
    pub fn residual(&self) -> &[usize] {
        &self.residual
    }

    /// Moves to the next assignment, or clears `has_more` after the last one.
    pub fn advance(&mut self) {
        if !self.has_more {
            return;
        }
        let num_groups = self.capacity.len();
        for position in (0..self.current.len()).rev() {
            let group = self.current[position];
            self.residual[group] += 1;
            if let Some(next) = (group + 1..num_groups).find(|&g| self.residual[g] > 0) {
                self.current[position] = next;
                self.residual[next] -= 1;
                self.fill_from(position + 1);
                return;
            }
        }
        self.has_more = false;
    }

    /// Assigns every item from `start` on to the smallest group with room left.
    fn fill_from(&mut self, start: usize) {
        let mut group = 0;
        for position in start..self.current.len() {
            while self.residual[group] == 0 {
                group += 1;
            }
            self.current[position] = group;
            self.residual[group] -= 1;
        }
    }
}

impl Iterator for AssignmentEnumerator {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        if !self.has_more {
            return None;
        }
        let candidate = Candidate {
            assignment: self.current.clone(),
            residual: self.residual.clone(),
        };
        self.advance();
        Some(candidate)
    }
}

/// The number of assignments the enumerator will produce:
/// `sum over count vectors c <= capacity with sum(c) = n of n! / prod(c_k!)`.
///
/// Computed in floating point as `n!` times the `x^n` coefficient of
/// `prod_k sum_{c <= capacity_k} x^c / c!`, so huge counts saturate to infinity instead
/// of overflowing.
pub fn expected_candidate_count(num_items: usize, capacity: &[usize]) -> f64 {
    let mut poly = vec![0.0f64; num_items + 1];
    poly[0] = 1.0;
    for &cap in capacity {
        let mut next = vec![0.0f64; num_items + 1];
        for (degree, &coefficient) in poly.iter().enumerate() {
            if coefficient == 0.0 {
                continue;
            }
            let mut inverse_factorial = 1.0;
            for c in 0..=cap.min(num_items - degree) {
                if c > 0 {
                    inverse_factorial /= c as f64;
                }
                next[degree + c] += coefficient * inverse_factorial;
            }
        }
        poly = next;
    }
    let factorial: f64 = (1..=num_items).map(|i| i as f64).product();
    (poly[num_items] * factorial).round()
}
