//! Persistence of forward trajectories.
//!
//! The forward pass appends to a [`StateWriter`] as it accepts steps,
//! and the adjoint pass later reads the finished trajectory back
//! through a [`StateReader`] in whatever order it needs.
//! [`MemoryStore`] implements both by keeping everything in memory.

use crate::{
    properties::{FluidProperties, SolidProperties},
    state::{FluidState, SolidState},
    Error, Result,
};

/// Append-only sink for a forward trajectory.
pub trait StateWriter {
    /// Record the solid properties of the run.
    fn set_solid_properties(&mut self, props: &SolidProperties) -> Result<()>;
    /// Append the time of the next state.
    fn append_time(&mut self, t: f64) -> Result<()>;
    /// Append the next solid state.
    fn append_state(&mut self, state: &SolidState) -> Result<()>;
    /// Append the fluid state on the next solid state's surface.
    fn append_fluid_state(&mut self, fluid: &FluidState) -> Result<()>;
    /// Append the fluid properties in effect at the next state's time.
    fn append_fluid_properties(&mut self, props: &FluidProperties) -> Result<()>;
    /// Mark state `n` as a measurement sample.
    fn append_measurement_index(&mut self, n: usize) -> Result<()>;
}

/// Random-access view of a finished trajectory.
pub trait StateReader {
    /// Number of stored states.
    fn get_num_states(&self) -> usize;
    /// Solid state `n`.
    fn get_state(&self, n: usize) -> Result<SolidState>;
    /// Fluid state `n`.
    fn get_fluid_state(&self, n: usize) -> Result<FluidState>;
    /// Times of all states.
    fn get_times(&self) -> Vec<f64>;
    /// Fluid properties in effect at state `n`.
    fn get_fluid_properties(&self, n: usize) -> Result<FluidProperties>;
    /// Indices of the states marked as measurement samples.
    fn get_measurement_indices(&self) -> Vec<usize>;
    /// Solid properties of the run.
    fn get_solid_properties(&self) -> Result<SolidProperties>;
}

/// A trajectory held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    times: Vec<f64>,
    states: Vec<SolidState>,
    fluid_states: Vec<FluidState>,
    fluid_properties: Vec<FluidProperties>,
    measurement_indices: Vec<usize>,
    solid_properties: Option<SolidProperties>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored solid states.
    pub fn states(&self) -> &[SolidState] {
        &self.states
    }

    /// All stored fluid states.
    pub fn fluid_states(&self) -> &[FluidState] {
        &self.fluid_states
    }
}

fn index<T: Clone>(items: &[T], n: usize) -> Result<T> {
    items.get(n).cloned().ok_or(Error::StateIndex {
        index: n,
        len: items.len(),
    })
}

impl StateWriter for MemoryStore {
    fn set_solid_properties(&mut self, props: &SolidProperties) -> Result<()> {
        self.solid_properties = Some(props.clone());
        Ok(())
    }

    fn append_time(&mut self, t: f64) -> Result<()> {
        self.times.push(t);
        Ok(())
    }

    fn append_state(&mut self, state: &SolidState) -> Result<()> {
        self.states.push(state.clone());
        Ok(())
    }

    fn append_fluid_state(&mut self, fluid: &FluidState) -> Result<()> {
        self.fluid_states.push(fluid.clone());
        Ok(())
    }

    fn append_fluid_properties(&mut self, props: &FluidProperties) -> Result<()> {
        self.fluid_properties.push(*props);
        Ok(())
    }

    fn append_measurement_index(&mut self, n: usize) -> Result<()> {
        self.measurement_indices.push(n);
        Ok(())
    }
}

impl StateReader for MemoryStore {
    fn get_num_states(&self) -> usize {
        self.states.len()
    }

    fn get_state(&self, n: usize) -> Result<SolidState> {
        index(&self.states, n)
    }

    fn get_fluid_state(&self, n: usize) -> Result<FluidState> {
        index(&self.fluid_states, n)
    }

    fn get_times(&self) -> Vec<f64> {
        self.times.clone()
    }

    fn get_fluid_properties(&self, n: usize) -> Result<FluidProperties> {
        index(&self.fluid_properties, n)
    }

    fn get_measurement_indices(&self) -> Vec<usize> {
        self.measurement_indices.clone()
    }

    fn get_solid_properties(&self) -> Result<SolidProperties> {
        self.solid_properties
            .clone()
            .ok_or_else(|| Error::TrajectoryMismatch {
                reason: "no solid properties were stored".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_what_was_written() {
        let mut store = MemoryStore::new();
        let state = SolidState::zeros(3);
        store.append_time(0.0).unwrap();
        store.append_state(&state).unwrap();
        store.append_fluid_state(&FluidState::zeros(2)).unwrap();
        store
            .append_fluid_properties(&FluidProperties::default())
            .unwrap();
        store.append_measurement_index(0).unwrap();

        assert_eq!(store.get_num_states(), 1);
        assert_eq!(store.get_state(0).unwrap(), state);
        assert_eq!(store.get_times(), vec![0.0]);
        assert_eq!(store.get_measurement_indices(), vec![0]);
        assert!(matches!(
            store.get_state(1),
            Err(Error::StateIndex { index: 1, len: 1 })
        ));
        assert!(matches!(
            store.get_solid_properties(),
            Err(Error::TrajectoryMismatch { .. })
        ));
    }
}
