//! Scalar cost functionals of a forward trajectory.
//!
//! A functional depends on the displacements of some subset of the stored states
//! (its samples). Velocity and acceleration never enter a functional,
//! which the adjoint relies on.

use nalgebra as na;

use crate::{model::Interface, store::StateReader, Error, Result};

/// Which stored states a functional samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Sampling {
    /// Every stored state.
    All,
    /// The states recorded as measurements.
    #[default]
    Measurements,
    /// Only the last state.
    Final,
}

impl Sampling {
    /// The sampled state indices, sorted.
    pub fn indices(&self, reader: &dyn StateReader) -> Vec<usize> {
        let num_states = reader.get_num_states();
        match self {
            Sampling::All => (0..num_states).collect(),
            Sampling::Measurements => {
                let mut indices = reader.get_measurement_indices();
                indices.sort_unstable();
                indices.dedup();
                indices
            }
            Sampling::Final => num_states.checked_sub(1).into_iter().collect(),
        }
    }
}

/// A differentiable scalar function of a trajectory.
pub trait Functional {
    /// Evaluate the functional.
    fn value(&self, reader: &dyn StateReader) -> Result<f64>;

    /// Gradient of the functional with respect to the displacement of state `n`.
    fn du(&self, n: usize, reader: &dyn StateReader) -> Result<na::DVector<f64>>;

    /// The state indices the functional depends on, sorted.
    fn sample_indices(&self, reader: &dyn StateReader) -> Vec<usize>;
}

/// A weighted sum of displacements, `sum_n w . u_n` over the sampled states.
#[derive(Clone, Debug)]
pub struct DisplacementProjection {
    /// Weight of each DOF.
    pub weights: na::DVector<f64>,
    /// States to sum over.
    pub sampling: Sampling,
}

impl Functional for DisplacementProjection {
    fn value(&self, reader: &dyn StateReader) -> Result<f64> {
        let mut total = 0.0;
        for n in self.sampling.indices(reader) {
            total += self.weights.dot(&reader.get_state(n)?.u);
        }
        Ok(total)
    }

    fn du(&self, n: usize, reader: &dyn StateReader) -> Result<na::DVector<f64>> {
        if self.sampling.indices(reader).contains(&n) {
            Ok(self.weights.clone())
        } else {
            Ok(na::DVector::zeros(self.weights.len()))
        }
    }

    fn sample_indices(&self, reader: &dyn StateReader) -> Vec<usize> {
        self.sampling.indices(reader)
    }
}

/// A weighted squared displacement, `sum_n 1/2 sum_i w_i u_n,i^2`.
///
/// With lumped mass weights this is a kinetic-energy-like measure
/// of how far the body moves.
#[derive(Clone, Debug)]
pub struct DisplacementEnergy {
    /// Weight of each DOF.
    pub weights: na::DVector<f64>,
    /// States to sum over.
    pub sampling: Sampling,
}

impl Functional for DisplacementEnergy {
    fn value(&self, reader: &dyn StateReader) -> Result<f64> {
        let mut total = 0.0;
        for n in self.sampling.indices(reader) {
            let u = reader.get_state(n)?.u;
            total += 0.5 * self.weights.dot(&u.component_mul(&u));
        }
        Ok(total)
    }

    fn du(&self, n: usize, reader: &dyn StateReader) -> Result<na::DVector<f64>> {
        if self.sampling.indices(reader).contains(&n) {
            Ok(self.weights.component_mul(&reader.get_state(n)?.u))
        } else {
            Ok(na::DVector::zeros(self.weights.len()))
        }
    }

    fn sample_indices(&self, reader: &dyn StateReader) -> Vec<usize> {
        self.sampling.indices(reader)
    }
}

/// The glottal width, the smallest channel area along the interface,
/// averaged over the sampled states.
///
/// The midline is read from the stored fluid properties of each state.
#[derive(Clone, Debug)]
pub struct MeanGlottalWidth {
    /// The fluid-structure interface the channel is bounded by.
    pub interface: Interface,
    /// Number of solid DOFs.
    pub num_dofs: usize,
    /// States to average over.
    pub sampling: Sampling,
}

impl MeanGlottalWidth {
    /// The narrowest vertex and the width there.
    fn width(&self, n: usize, reader: &dyn StateReader) -> Result<(usize, f64)> {
        let u = reader.get_state(n)?.u;
        let y_midline = reader.get_fluid_properties(n)?.y_midline;
        self.interface
            .gaps(&u, y_midline)
            .map(|gap| 2.0 * gap)
            .enumerate()
            .fold(None, |min: Option<(usize, f64)>, (i, w)| match min {
                Some((_, w_min)) if w_min <= w => min,
                _ => Some((i, w)),
            })
            .ok_or_else(|| Error::InvalidConfig("glottal width of an empty interface".to_string()))
    }
}

impl Functional for MeanGlottalWidth {
    fn value(&self, reader: &dyn StateReader) -> Result<f64> {
        let indices = self.sampling.indices(reader);
        if indices.is_empty() {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for &n in &indices {
            total += self.width(n, reader)?.1;
        }
        Ok(total / indices.len() as f64)
    }

    fn du(&self, n: usize, reader: &dyn StateReader) -> Result<na::DVector<f64>> {
        let indices = self.sampling.indices(reader);
        let mut grad = na::DVector::zeros(self.num_dofs);
        if indices.contains(&n) {
            let (vertex, _) = self.width(n, reader)?;
            grad[self.interface.y_dofs[vertex]] = -2.0 / indices.len() as f64;
        }
        Ok(grad)
    }

    fn sample_indices(&self, reader: &dyn StateReader) -> Vec<usize> {
        self.sampling.indices(reader)
    }
}

/// The sum of several functionals.
pub struct Sum(pub Vec<Box<dyn Functional>>);

impl Functional for Sum {
    fn value(&self, reader: &dyn StateReader) -> Result<f64> {
        self.0.iter().map(|f| f.value(reader)).sum()
    }

    fn du(&self, n: usize, reader: &dyn StateReader) -> Result<na::DVector<f64>> {
        let mut terms = self.0.iter().map(|f| f.du(n, reader));
        let first = terms.next().ok_or_else(|| {
            Error::InvalidConfig("sum of zero functionals has no gradient size".to_string())
        })??;
        terms.try_fold(first, |acc, term| Ok(acc + term?))
    }

    fn sample_indices(&self, reader: &dyn StateReader) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .0
            .iter()
            .flat_map(|f| f.sample_indices(reader))
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// A functional multiplied by a constant.
pub struct Scaled(pub f64, pub Box<dyn Functional>);

impl Functional for Scaled {
    fn value(&self, reader: &dyn StateReader) -> Result<f64> {
        Ok(self.0 * self.1.value(reader)?)
    }

    fn du(&self, n: usize, reader: &dyn StateReader) -> Result<na::DVector<f64>> {
        Ok(self.1.du(n, reader)? * self.0)
    }

    fn sample_indices(&self, reader: &dyn StateReader) -> Vec<usize> {
        self.1.sample_indices(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        properties::FluidProperties,
        state::{FluidState, SolidState},
        store::{MemoryStore, StateWriter},
        Vec2,
    };
    use approx::assert_relative_eq;

    /// Three states of a 4-DOF body with two interface vertices.
    fn trajectory() -> MemoryStore {
        let mut store = MemoryStore::new();
        for n in 0..3 {
            let mut state = SolidState::zeros(4);
            state.u = na::DVector::from_fn(4, |i, _| (n + 1) as f64 * 0.01 * (i as f64 - 1.0));
            store.append_time(n as f64).unwrap();
            store.append_state(&state).unwrap();
            store.append_fluid_state(&FluidState::zeros(2)).unwrap();
            store
                .append_fluid_properties(&FluidProperties {
                    y_midline: 1.0,
                    ..Default::default()
                })
                .unwrap();
        }
        store.append_measurement_index(2).unwrap();
        store.append_measurement_index(0).unwrap();
        store
    }

    fn interface() -> Interface {
        Interface {
            x_dofs: vec![0, 2],
            y_dofs: vec![1, 3],
            reference: vec![Vec2::new(0.0, 0.5), Vec2::new(1.0, 0.5)],
        }
    }

    #[test]
    fn sampling_indices() {
        let store = trajectory();
        assert_eq!(Sampling::All.indices(&store), vec![0, 1, 2]);
        assert_eq!(Sampling::Measurements.indices(&store), vec![0, 2]);
        assert_eq!(Sampling::Final.indices(&store), vec![2]);
        assert!(Sampling::Final.indices(&MemoryStore::new()).is_empty());
    }

    #[test]
    fn projection_and_energy_gradients() {
        let store = trajectory();
        let weights = na::DVector::from_vec(vec![1.0, 0.0, -2.0, 0.5]);
        let proj = DisplacementProjection {
            weights: weights.clone(),
            sampling: Sampling::Measurements,
        };
        // u_n = 0.01 (n + 1) [-1, 0, 1, 2]
        let w_dot_base = -1.0 - 2.0 + 1.0;
        assert_relative_eq!(proj.value(&store).unwrap(), 0.01 * (1.0 + 3.0) * w_dot_base);
        assert_eq!(proj.du(1, &store).unwrap(), na::DVector::zeros(4));
        assert_eq!(proj.du(2, &store).unwrap(), weights);

        let energy = DisplacementEnergy {
            weights: na::DVector::from_element(4, 2.0),
            sampling: Sampling::Final,
        };
        let u2 = store.get_state(2).unwrap().u;
        assert_relative_eq!(energy.value(&store).unwrap(), u2.norm_squared());
        assert_relative_eq!(energy.du(2, &store).unwrap(), u2 * 2.0);
    }

    #[test]
    fn glottal_width_picks_narrowest_vertex() {
        let store = trajectory();
        let width = MeanGlottalWidth {
            interface: interface(),
            num_dofs: 4,
            sampling: Sampling::All,
        };
        // vertex 1 moves up with u = 0.02 (n + 1), so it is the narrowest
        let expected: f64 = (0..3)
            .map(|n| 2.0 * (1.0 - (0.5 + 0.02 * (n + 1) as f64)))
            .sum::<f64>()
            / 3.0;
        assert_relative_eq!(width.value(&store).unwrap(), expected);
        let grad = width.du(0, &store).unwrap();
        assert_relative_eq!(grad[3], -2.0 / 3.0);
        assert_eq!(grad[1], 0.0);
    }

    #[test]
    fn combinators() {
        let store = trajectory();
        let weights = na::DVector::from_vec(vec![0.0, 1.0, 0.0, 0.0]);
        let make = || -> Box<dyn Functional> {
            Box::new(DisplacementProjection {
                weights: weights.clone(),
                sampling: Sampling::All,
            })
        };
        let f = Sum(vec![make(), Box::new(Scaled(3.0, make()))]);
        let single = make().value(&store).unwrap();
        assert_relative_eq!(f.value(&store).unwrap(), 4.0 * single);
        assert_eq!(f.du(1, &store).unwrap(), &weights * 4.0);
        assert_eq!(f.sample_indices(&store), vec![0, 1, 2]);
    }
}
