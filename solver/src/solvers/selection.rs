//! Reduction operators that shrink a Pareto generation back to the
//! configured size, keeping the extremes and an even spread in between.

use super::partial_solution::PartialSolution;

/// Linear selection over the two-objective projection: sort by the
/// productivity objective (ties by flexibility) and keep evenly spaced
/// entries including both ends.
pub struct EnvironmentalSelectionOperator {
    intermediate_solutions: usize,
}

impl EnvironmentalSelectionOperator {
    pub fn new(intermediate_solutions: u32) -> Self {
        EnvironmentalSelectionOperator {
            intermediate_solutions: intermediate_solutions as usize,
        }
    }

    pub fn reduce(&self, mut values: Vec<PartialSolution>) -> Vec<PartialSolution> {
        if values.len() <= self.intermediate_solutions || self.intermediate_solutions == 0 {
            return values;
        }
        values.sort_by_key(|s| {
            (
                s.makespan_last_scheduled_job(),
                s.earliest_start_future_operation(),
            )
        });
        select_spread(values, self.intermediate_solutions)
    }
}

/// Angular selection: sort by the angle of the flattened objective product
/// and keep an even angular spread.
pub struct GeometricSelectionOperator {
    intermediate_solutions: usize,
}

impl GeometricSelectionOperator {
    pub fn new(intermediate_solutions: u32) -> Self {
        GeometricSelectionOperator {
            intermediate_solutions: intermediate_solutions as usize,
        }
    }

    fn flatten(s: &PartialSolution) -> f64 {
        (s.average_productivity() as f64 / 1e6) * (s.makespan_last_scheduled_job() as f64 / 1e6)
    }

    fn value_angle(s: &PartialSolution) -> f64 {
        Self::flatten(s).atan()
    }

    pub fn reduce(&self, mut values: Vec<PartialSolution>) -> Vec<PartialSolution> {
        if values.len() <= self.intermediate_solutions || self.intermediate_solutions == 0 {
            return values;
        }
        values.sort_by(|a, b| {
            Self::value_angle(a)
                .partial_cmp(&Self::value_angle(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        select_spread(values, self.intermediate_solutions)
    }
}

/// Keeps `k` elements of a sorted vector, evenly spaced, first and last
/// included.
fn select_spread(values: Vec<PartialSolution>, k: usize) -> Vec<PartialSolution> {
    let n = values.len();
    if k == 1 {
        let mut values = values;
        return vec![values.swap_remove(0)];
    }

    let mut keep: Vec<usize> = (0..k).map(|i| i * (n - 1) / (k - 1)).collect();
    keep.dedup();

    let mut result = Vec::with_capacity(keep.len());
    for (i, value) in values.into_iter().enumerate() {
        if keep.contains(&i) {
            result.push(value);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    fn solution(makespan: i64, earliest: i64) -> PartialSolution {
        let mut s = PartialSolution::new(HashMap::new(), vec![]);
        s.set_makespan_last_scheduled_job(makespan);
        s.set_earliest_start_future_operation(earliest);
        s
    }

    #[test]
    fn keeps_extremes() {
        let values: Vec<_> = (0..10).map(|i| solution(i, 10 - i)).collect();
        let reduced = EnvironmentalSelectionOperator::new(3).reduce(values);
        assert_eq!(reduced.len(), 3);
        assert_eq!(reduced[0].makespan_last_scheduled_job(), 0);
        assert_eq!(reduced[2].makespan_last_scheduled_job(), 9);
    }

    #[test]
    fn small_sets_pass_through() {
        let values: Vec<_> = (0..3).map(|i| solution(i, i)).collect();
        let reduced = EnvironmentalSelectionOperator::new(5).reduce(values);
        assert_eq!(reduced.len(), 3);
        let values: Vec<_> = (0..3).map(|i| solution(i, i)).collect();
        let reduced = GeometricSelectionOperator::new(5).reduce(values);
        assert_eq!(reduced.len(), 3);
    }

    #[test]
    fn geometric_keeps_angular_extremes() {
        // identical productivity, growing makespan: the objective product
        // (and with it the angle) grows monotonically with the makespan
        let mut values = Vec::new();
        for i in 0..10i64 {
            let mut s = solution(1_000_000 * (i + 1), 0);
            s.set_average_productivity(2_000_000);
            values.push(s);
        }
        // hand them over out of order to show the angular sort
        values.reverse();

        let reduced = GeometricSelectionOperator::new(3).reduce(values);
        assert_eq!(reduced.len(), 3);
        assert_eq!(reduced[0].makespan_last_scheduled_job(), 1_000_000);
        assert_eq!(reduced[2].makespan_last_scheduled_job(), 10_000_000);
        // the middle pick sits between the angular extremes
        let middle = reduced[1].makespan_last_scheduled_job();
        assert!(middle > 1_000_000 && middle < 10_000_000);
    }
}
