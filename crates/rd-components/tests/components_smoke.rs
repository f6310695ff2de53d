//! Component library exercised through a built model.

use nalgebra::{DVector, Vector3};
use proptest::prelude::*;
use rd_components::{
    CoordinateFilter, FirstOrderActivation, QuadraticDynamics, ReciprocalDynamics, SubsystemGroup,
};
use rd_core::units::kg;
use rd_model::{JointKind, Model, ModelBuilder, ModelError, Subsystem, SubsystemKind};

fn muscle_model() -> Model {
    let mut b = ModelBuilder::new("arm");
    let body = b.add_body("hand", kg(1.2));
    b.add_joint("slider", body, JointKind::slider(Vector3::y()), &["elbow"]);
    b.set_coordinate_default("elbow", 0.4, 0.0);
    let group = SubsystemGroup::new("biceps")
        .with_child(Box::new(
            FirstOrderActivation::new("activ", 0.015, 0.8, 0.1).unwrap(),
        ))
        .with_child(Box::new(
            CoordinateFilter::new("sensor", "elbow", 0.05, 0.0).unwrap(),
        ));
    b.add_subsystem(Box::new(group));
    b.build().unwrap()
}

#[test]
fn nested_paths_are_assigned_depth_first() {
    let model = muscle_model();
    let index = model.index();
    assert_eq!(model.ny(), 4);
    assert_eq!(index.y_index("elbow/value").unwrap(), 0);
    assert_eq!(index.y_index("elbow/speed").unwrap(), 1);
    assert_eq!(index.y_index("biceps/activ/activation").unwrap(), 2);
    assert_eq!(index.y_index("biceps/sensor/filtered").unwrap(), 3);
    assert_eq!(index.label(2), Some("biceps/activ/activation"));

    let paths: Vec<&str> = index.auxiliary_entries().map(|e| e.path()).collect();
    assert_eq!(paths, ["biceps", "biceps/activ", "biceps/sensor"]);
    assert!(matches!(
        model.subsystem("biceps/sensor").unwrap().kind(),
        SubsystemKind::Auxiliary { slot: 2 }
    ));
}

#[test]
fn implicit_predicates_differ_between_local_and_subtree() {
    let model = muscle_model();
    assert!(model.subsystem_has_implicit_form_local("biceps").unwrap());
    assert!(!model.subsystem_has_implicit_form("biceps").unwrap());
    assert!(model.subsystem_has_implicit_form("biceps/activ").unwrap());
    assert!(!model.subsystem_has_implicit_form_local("biceps/sensor").unwrap());
    assert!(model.subsystem_has_implicit_form("elbow").unwrap());
    assert!(model.has_implicit_form_local());
    assert!(!model.has_implicit_form());
}

#[test]
fn activation_uses_its_implicit_form() {
    let model = muscle_model();
    let mut state = model.default_state().unwrap();
    model.realize_dynamics(&mut state).unwrap();

    let mut guess = DVector::zeros(model.ny());
    model
        .set_derivative_guess("biceps/activ/activation", 2.0, &mut guess)
        .unwrap();
    let r = model.calc_residuals(&state, &guess, &DVector::zeros(0)).unwrap();
    let expected = 0.015 * 2.0 - (0.8 - 0.1);
    let actual = model.residual_by_name("biceps/activ/activation", &r).unwrap();
    assert!((actual - expected).abs() < 1e-15);
}

#[test]
fn filter_tracks_the_coordinate() {
    let model = muscle_model();
    let mut state = model.default_state().unwrap();
    let (ydot, _) = model.calc_explicit_derivatives(&mut state).unwrap();
    assert!((ydot[3] - (0.4 - 0.0) / 0.05).abs() < 1e-12);

    model.set_coordinate_value(&mut state, "elbow", 1.0).unwrap();
    let (ydot, _) = model.calc_explicit_derivatives(&mut state).unwrap();
    assert!((ydot[3] - 1.0 / 0.05).abs() < 1e-12);
}

#[test]
fn defaults_round_trip_through_state() {
    let mut model = muscle_model();
    let mut state = model.default_state().unwrap();
    assert_eq!(
        model.state_value(&state, "biceps/activ/activation").unwrap(),
        0.1
    );
    model
        .set_state_value(&mut state, "biceps/activ/activation", 0.65)
        .unwrap();
    model
        .set_state_value(&mut state, "biceps/sensor/filtered", -0.2)
        .unwrap();
    model.sync_defaults_from_state(&state).unwrap();

    let fresh = model.default_state().unwrap();
    assert_eq!(fresh.y(), state.y());

    // Unchanged state: syncing again is a no-op.
    model.sync_defaults_from_state(&fresh).unwrap();
    assert_eq!(model.default_state().unwrap().y(), fresh.y());
}

/// Build a one-coordinate model around `sub`, move `path` to `value`, sync,
/// and check a fresh default state reproduces the edited one.
fn assert_defaults_round_trip(sub: Box<dyn Subsystem>, path: &str, value: f64) {
    let mut b = ModelBuilder::new("single");
    let body = b.add_body("cart", kg(1.0));
    b.add_joint("rail", body, JointKind::slider(Vector3::x()), &["x"]);
    b.add_subsystem(sub);
    let mut model = b.build().unwrap();
    let mut state = model.default_state().unwrap();
    model.set_state_value(&mut state, path, value).unwrap();
    model.sync_defaults_from_state(&state).unwrap();
    let fresh = model.default_state().unwrap();
    assert_eq!(model.state_value(&fresh, path).unwrap(), value, "{path}");
    assert_eq!(fresh.y(), state.y(), "{path}");
}

#[test]
fn every_component_round_trips_its_defaults() {
    assert_defaults_round_trip(
        Box::new(ReciprocalDynamics::new("rec", 0.28, 3.5).unwrap()),
        "rec/y",
        -1.25,
    );
    assert_defaults_round_trip(
        Box::new(QuadraticDynamics::new("quad", -0.73, 1.8).unwrap()),
        "quad/y",
        0.4,
    );
    assert_defaults_round_trip(
        Box::new(FirstOrderActivation::new("act", 0.02, 0.5, 0.1).unwrap()),
        "act/activation",
        0.9,
    );
    assert_defaults_round_trip(
        Box::new(CoordinateFilter::new("sensor", "x", 0.05, 0.0).unwrap()),
        "sensor/filtered",
        -0.2,
    );
    assert_defaults_round_trip(
        Box::new(
            SubsystemGroup::new("grp")
                .with_child(Box::new(QuadraticDynamics::new("inner", 1.0, 0.0).unwrap())),
        ),
        "grp/inner/y",
        2.5,
    );
}

#[test]
fn reciprocal_rejects_a_zero_default_on_sync() {
    let mut b = ModelBuilder::new("rec");
    b.add_subsystem(Box::new(ReciprocalDynamics::new("foo", 0.28, 3.5).unwrap()));
    let mut model = b.build().unwrap();
    let mut state = model.default_state().unwrap();
    model.set_state_value(&mut state, "foo/y", 0.0).unwrap();
    assert!(matches!(
        model.sync_defaults_from_state(&state),
        Err(ModelError::Configuration { .. })
    ));

    let fresh = model.default_state().unwrap();
    assert_eq!(model.state_value(&fresh, "foo/y").unwrap(), 3.5);
    assert!(model.calc_explicit_derivatives(&mut fresh.clone()).is_ok());
}

#[test]
fn reciprocal_and_quadratic_share_a_model() {
    let mut b = ModelBuilder::new("pair");
    b.add_subsystem(Box::new(ReciprocalDynamics::new("foo", 0.28, 3.5).unwrap()));
    b.add_subsystem(Box::new(QuadraticDynamics::new("bar", -0.73, 1.8).unwrap()));
    let model = b.build().unwrap();
    let mut state = model.default_state().unwrap();
    let (ydot, lambda) = model.calc_explicit_derivatives(&mut state).unwrap();
    let r = model.calc_residuals(&state, &ydot, &lambda).unwrap();
    assert!(r.amax() < 1e-14);
    assert!(model.subsystem_has_implicit_form("foo").unwrap());
    assert!(!model.subsystem_has_implicit_form("bar").unwrap());
}

#[test]
fn filter_on_unknown_coordinate_fails_at_evaluation() {
    let mut b = ModelBuilder::new("lonely");
    b.add_subsystem(Box::new(
        CoordinateFilter::new("sensor", "ghost", 0.1, 0.0).unwrap(),
    ));
    let model = b.build().unwrap();
    let mut state = model.default_state().unwrap();
    assert!(model.realize_acceleration(&mut state).is_err());
}

proptest! {
    #[test]
    fn activation_residual_is_linear_in_the_guess(
        a in 0.0..1.0_f64,
        e in 0.0..1.0_f64,
        g in -50.0..50.0_f64,
    ) {
        let mut b = ModelBuilder::new("act");
        b.add_subsystem(Box::new(FirstOrderActivation::new("act", 0.02, e, a).unwrap()));
        let model = b.build().unwrap();
        let state = model.default_state().unwrap();
        let r = model
            .calc_residuals(&state, &DVector::from_vec(vec![g]), &DVector::zeros(0))
            .unwrap();
        let expected = 0.02 * g - (e - a);
        prop_assert!((r[0] - expected).abs() < 1e-12);
    }
}
