//! Explicit and implicit adapters integrate to the same trajectories.

use nalgebra::Vector3;
use rd_components::ReciprocalDynamics;
use rd_core::units::kg;
use rd_model::{CoordinateCoupler, CouplerFunction, JointKind, Model, ModelBuilder};
use rd_sim::{
    ExplicitDynamics, ImplicitDynamics, IntegratorType, SimError, SimOptions, run_sim,
};
use rd_solver::SolverError;

const G: f64 = 9.81;

fn reciprocal() -> Model {
    let mut b = ModelBuilder::new("reciprocal");
    b.add_subsystem(Box::new(ReciprocalDynamics::new("foo", 0.28, 3.5).unwrap()));
    b.build().unwrap()
}

fn reciprocal_exact(t: f64) -> f64 {
    (3.5_f64 * 3.5 + 2.0 * 0.28 * t).sqrt()
}

fn opts(t_end: f64) -> SimOptions {
    SimOptions {
        dt: 0.01,
        t_end,
        record_every: 1,
        ..SimOptions::default()
    }
}

#[test]
fn explicit_reciprocal_matches_closed_form() {
    let model = reciprocal();
    let mut dynamics = ExplicitDynamics::from_defaults(&model).unwrap();
    let record = run_sim(&mut dynamics, &opts(0.23)).unwrap();
    let (t, y) = record.last().unwrap();
    assert!((t - 0.23).abs() < 1e-12);
    assert!((y[0] - reciprocal_exact(0.23)).abs() < 1e-5);
}

#[test]
fn implicit_reciprocal_matches_closed_form() {
    let model = reciprocal();
    let mut dynamics = ImplicitDynamics::from_defaults(&model).unwrap();
    let record = run_sim(&mut dynamics, &opts(0.23)).unwrap();
    let (_, y) = record.last().unwrap();
    assert!((y[0] - reciprocal_exact(0.23)).abs() < 1e-5);
    // 23 steps of four evaluations each
    assert_eq!(dynamics.evaluations(), 92);
}

#[test]
fn slider_falls_under_gravity() {
    let mut b = ModelBuilder::new("slider");
    b.set_gravity(Vector3::new(-G, 0.0, 0.0));
    let body = b.add_body("ptmass", kg(1.3));
    b.add_joint("slider", body, JointKind::slider(Vector3::x()), &["x"]);
    b.set_coordinate_default("x", 2.0, 1.7);
    let model = b.build().unwrap();

    let t_end = 0.5;
    let expected_x = 2.0 + 1.7 * t_end - 0.5 * G * t_end * t_end;
    let expected_u = 1.7 - G * t_end;

    let mut explicit = ExplicitDynamics::from_defaults(&model).unwrap();
    let record = run_sim(&mut explicit, &opts(t_end)).unwrap();
    let (_, y) = record.last().unwrap();
    assert!((y[0] - expected_x).abs() < 1e-10);
    assert!((y[1] - expected_u).abs() < 1e-10);

    let mut implicit = ImplicitDynamics::from_defaults(&model).unwrap();
    let record = run_sim(&mut implicit, &opts(t_end)).unwrap();
    let (_, y) = record.last().unwrap();
    assert!((y[0] - expected_x).abs() < 1e-7);
    assert!((y[1] - expected_u).abs() < 1e-7);
}

fn coupled_pair() -> Model {
    let mut b = ModelBuilder::new("coupled");
    b.set_gravity(Vector3::new(-G, 0.0, 0.0));
    for (k, name) in ["c0", "c1"].into_iter().enumerate() {
        let body = b.add_body(format!("b{k}"), kg(1.0 + 0.5 * k as f64));
        b.add_joint(format!("j{k}"), body, JointKind::slider(Vector3::x()), &[name]);
    }
    b.add_constraint(Box::new(CoordinateCoupler::new(
        "coupler",
        "c0",
        "c1",
        CouplerFunction::linear(5.1, 2.31),
    )));
    b.build().unwrap()
}

#[test]
fn coupled_trajectories_agree() {
    let model = coupled_pair();
    let mut state = model.default_state().unwrap();
    model.set_coordinate_speed(&mut state, "c0", 1.5).unwrap();
    model.project_constraints(&mut state, 1e-12).unwrap();

    let opts = SimOptions {
        integrator: IntegratorType::ForwardEuler,
        ..opts(0.2)
    };
    let mut explicit = ExplicitDynamics::new(&model, &state);
    let a = run_sim(&mut explicit, &opts).unwrap();
    let mut implicit =
        ImplicitDynamics::new(&model, &state, Default::default()).unwrap();
    let b = run_sim(&mut implicit, &opts).unwrap();

    assert_eq!(a.t.len(), b.t.len());
    for (ya, yb) in a.x.iter().zip(b.x.iter()) {
        assert!((ya - yb).amax() < 1e-6, "{ya} vs {yb}");
    }
    assert_eq!(implicit.last_multipliers().len(), 1);
}

#[test]
fn disabled_constraint_carries_through_implicit_runs() {
    let model = coupled_pair();
    let mut state = model.default_state().unwrap();
    model
        .set_constraint_enabled(&mut state, "coupler", false)
        .unwrap();
    model.set_coordinate_speed(&mut state, "c1", -0.7).unwrap();

    let opts = SimOptions {
        integrator: IntegratorType::ForwardEuler,
        ..opts(0.2)
    };
    let a = run_sim(&mut ExplicitDynamics::new(&model, &state), &opts).unwrap();
    let mut implicit =
        ImplicitDynamics::new(&model, &state, Default::default()).unwrap();
    let b = run_sim(&mut implicit, &opts).unwrap();

    assert_eq!(a.t.len(), b.t.len());
    for (ya, yb) in a.x.iter().zip(b.x.iter()) {
        assert!((ya - yb).amax() < 1e-6, "{ya} vs {yb}");
    }
    assert_eq!(implicit.last_multipliers().len(), 0);
    // Unconstrained: both sliders fall freely along -x.
    let (t, y) = b.last().unwrap();
    assert!((y[3] - (-0.7 - G * t)).abs() < 1e-6);
}

#[test]
fn solver_failures_surface_as_sim_errors() {
    let model = reciprocal();
    let state = model.default_state().unwrap();
    let config = rd_solver::DerivativeSolverConfig {
        bound: 1e-3,
        ..Default::default()
    };
    let mut dynamics = ImplicitDynamics::new(&model, &state, config).unwrap();
    assert!(matches!(
        run_sim(&mut dynamics, &opts(0.1)),
        Err(SimError::Solver(SolverError::ConvergenceFailed { .. }))
    ));
}
