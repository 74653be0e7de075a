use serde::Serialize;

/// One point (t, y) of a computed trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub t: f64,
    pub y: f64,
}

/// Ordered samples of one integration run, starting at the initial point.
///
/// Never empty, strictly monotonic in `t`, and immutable once built.
/// Serializes as a plain array of `{ t, y }` objects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Trajectory {
    samples: Vec<Sample>,
}

impl Trajectory {
    pub(crate) fn new(samples: Vec<Sample>) -> Self {
        debug_assert!(!samples.is_empty(), "trajectory starts at the initial point");
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<Sample> {
        self.samples.first().copied()
    }

    pub fn last(&self) -> Option<Sample> {
        self.samples.last().copied()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Abscissae t_i, for use as plot x values.
    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.t).collect()
    }

    /// Ordinates y_i, for use as plot y values.
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.y).collect()
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// Outcome of one successful `solve`: the trajectory and y at its last sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionResult {
    pub(crate) trajectory: Trajectory,
    pub(crate) final_value: f64,
}

impl SolutionResult {
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn final_value(&self) -> f64 {
        self.final_value
    }

    /// Abscissa of the last sample.
    pub fn final_time(&self) -> f64 {
        self.trajectory.last().map_or(f64::NAN, |s| s.t)
    }

    pub fn into_trajectory(self) -> Trajectory {
        self.trajectory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> SolutionResult {
        SolutionResult {
            trajectory: Trajectory::new(vec![
                Sample { t: 0.0, y: 1.0 },
                Sample { t: 0.5, y: 1.5 },
                Sample { t: 1.0, y: 2.5 },
            ]),
            final_value: 2.5,
        }
    }

    #[test]
    fn exposes_parallel_arrays_for_plotting() {
        let result = sample_result();
        assert_eq!(result.trajectory().times(), vec![0.0, 0.5, 1.0]);
        assert_eq!(result.trajectory().values(), vec![1.0, 1.5, 2.5]);
        assert_eq!(result.final_time(), 1.0);
        assert_eq!(result.final_value(), 2.5);
        assert_eq!(result.trajectory().first(), Some(Sample { t: 0.0, y: 1.0 }));
        assert_eq!((&result.trajectory).into_iter().count(), 3);
    }

    #[test]
    fn into_trajectory_keeps_every_sample() {
        let trajectory = sample_result().into_trajectory();
        assert_eq!(trajectory.len(), 3);
        assert_eq!(trajectory.last(), Some(Sample { t: 1.0, y: 2.5 }));
    }

    #[test]
    fn serializes_trajectory_as_sample_array() {
        let json = serde_json::to_value(sample_result()).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "trajectory": [
                    { "t": 0.0, "y": 1.0 },
                    { "t": 0.5, "y": 1.5 },
                    { "t": 1.0, "y": 2.5 }
                ],
                "final_value": 2.5
            })
        );
    }
}
