//! Vocal fold lattice in Bernoulli flow.
//! Runs the forward model with a subglottal pressure ramp,
//! then computes the gradient of the mean glottal width
//! with respect to the elastic modulus of each node.
//!
//! An integrator configuration in JSON can be given as the first argument.
//! Run with `RUST_LOG=info` (or `debug` for every step) to see progress.

use vocalfold::{
    self as vf,
    fluid::Bernoulli,
    functional::{MeanGlottalWidth, Sampling},
    solid::{lattice, LatticeParams},
    SolidResidual,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => vf::IntegratorConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => vf::IntegratorConfig {
            scheme: vf::CouplingScheme::Adaptive,
            dt_max: 2e-4,
            ..Default::default()
        },
    };

    let (solid, interface) = lattice(&LatticeParams {
        nx: 9,
        ny: 4,
        ..Default::default()
    });
    let num_dofs = solid.num_dofs();
    let num_params = solid.num_parameters();
    let model = vf::FsiModel::new(solid, Bernoulli, interface.clone())?;

    let mut solid_props = vf::SolidProperties::uniform(num_params, 5e3, 1.0);
    solid_props.rayleigh_k = 1e-4;
    solid_props.k_collision = 1e6;
    solid_props.y_collision = 0.74;

    let schedule = vf::FluidSchedule {
        base: vf::FluidProperties {
            p_sub: 0.0,
            p_sup: 0.0,
            rho: 1.0,
            a_sub: 1.0,
            y_midline: 0.75,
        },
        p_sub_ramp: vec![(0.0, 0.0), (5e-3, 40.0)],
    };

    let targets: Vec<f64> = (0..=20).map(|i| i as f64 * 1e-3).collect();
    let mut store = vf::MemoryStore::new();
    let summary = vf::Integrator::new(&model, &solid_props, &config)?.integrate(
        &vf::SolidState::zeros(num_dofs),
        0.0,
        &targets,
        &schedule,
        &mut store,
    )?;

    println!("{} steps", summary.steps.len());
    for (&n, &t) in summary.meas_indices.iter().zip(&targets) {
        println!(
            "t = {t:.4}: glottal width {:.5}, flow rate {:.5}",
            summary.glottal_width[n], summary.flow_rate[n]
        );
    }

    let functional = MeanGlottalWidth {
        interface,
        num_dofs,
        sampling: Sampling::Measurements,
    };
    println!("mean glottal width {:.6}", vf::Functional::value(&functional, &store)?);
    let grad = vf::adjoint_gradient(&model, &store, &functional, &config)?;
    println!("gradient w.r.t. nodal modulus:");
    for (node, g) in grad.iter().enumerate() {
        println!("  node {node:3}: {g:+.4e}");
    }

    Ok(())
}
