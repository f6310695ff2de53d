//! The initialized model: realization, explicit dynamics, and state access.

use std::fmt;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::constraint::Constraint;
use crate::error::{ModelError, ModelResult};
use crate::indexing::{SubsystemEntry, SubsystemKind, SystemIndex};
use crate::multibody::Multibody;
use crate::stage::Stage;
use crate::state::{ConstraintSlot, State};
use crate::subsystem::{LocalVector, Subsystem, SubsystemFrame, flatten};

/// Iteration cap for [`Model::project_constraints`].
const MAX_PROJECTION_ITERATIONS: usize = 50;

/// A built system. Topology and state indices never change after `build()`.
pub struct Model {
    name: String,
    multibody: Multibody,
    constraints: Vec<Box<dyn Constraint>>,
    subsystems: Vec<Box<dyn Subsystem>>,
    index: SystemIndex,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("nq", &self.index.nq())
            .field("nz", &self.index.nz())
            .field("constraints", &self.constraint_names())
            .field("subsystems", &self.index.entries().len())
            .finish()
    }
}

impl Model {
    pub(crate) fn new(
        name: String,
        multibody: Multibody,
        constraints: Vec<Box<dyn Constraint>>,
        subsystems: Vec<Box<dyn Subsystem>>,
        index: SystemIndex,
    ) -> Self {
        Self {
            name,
            multibody,
            constraints,
            subsystems,
            index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn multibody(&self) -> &Multibody {
        &self.multibody
    }

    pub fn index(&self) -> &SystemIndex {
        &self.index
    }

    /// Length of the state vector `Y`.
    pub fn ny(&self) -> usize {
        self.index.ny()
    }

    pub fn nq(&self) -> usize {
        self.index.nq()
    }

    pub fn nu(&self) -> usize {
        self.index.nu()
    }

    pub fn nz(&self) -> usize {
        self.index.nz()
    }

    pub fn state_vector_length(&self, state: &State) -> usize {
        state.ny()
    }

    /// Multipliers of the constraints enabled in `state`.
    pub fn multiplier_count(&self, state: &State) -> usize {
        state.num_multipliers()
    }

    pub fn constraint_names(&self) -> Vec<&str> {
        self.constraints.iter().map(|c| c.name()).collect()
    }

    /// Auxiliary subsystems in depth-first pre-order, aligned with
    /// [`SystemIndex::auxiliary_entries`].
    pub(crate) fn flat_subsystems(&self) -> Vec<&dyn Subsystem> {
        let mut out = Vec::with_capacity(self.index.entries().len());
        flatten(&self.subsystems, &mut out);
        out
    }

    /// Metadata of a subsystem (coordinate or auxiliary) by path.
    pub fn subsystem(&self, path: &str) -> ModelResult<&SubsystemEntry> {
        self.index.entry(path)
    }

    /// The model owns no state variables of its own.
    pub fn has_implicit_form_local(&self) -> bool {
        true
    }

    /// True when every subsystem, coordinates included, is locally fully implicit.
    pub fn has_implicit_form(&self) -> bool {
        self.index
            .entries()
            .iter()
            .all(SubsystemEntry::has_implicit_form_local)
    }

    pub fn subsystem_has_implicit_form_local(&self, path: &str) -> ModelResult<bool> {
        Ok(self.index.entry(path)?.has_implicit_form_local())
    }

    pub fn subsystem_has_implicit_form(&self, path: &str) -> ModelResult<bool> {
        Ok(self.index.entry(path)?.has_implicit_form())
    }

    /// A fresh state holding every declared default, realized to `Instance`.
    pub fn default_state(&self) -> ModelResult<State> {
        let slots = self
            .constraints
            .iter()
            .map(|c| ConstraintSlot {
                equations: c.num_equations(),
                enabled: c.enabled_by_default(),
            })
            .collect();
        let mut state = State::new(self.nq(), self.nu(), self.nz(), slots);

        let mut y = DVector::zeros(self.ny());
        for entry in self.index.entries() {
            for var in entry.registry().variables() {
                y[var.y_index] = var.default_value;
            }
        }
        for coord in self.multibody.coordinates() {
            y[coord.id.slot()] = coord.default_value;
            y[self.nq() + coord.id.slot()] = coord.default_speed;
        }
        for (slot, sub) in self.flat_subsystems().into_iter().enumerate() {
            let entry = self.index.auxiliary_entry(slot);
            let registry = entry.registry();
            let mut values = LocalVector::from_values(entry.path(), registry, registry.gather(&y));
            sub.init_state_from_defaults(&mut values)?;
            let values = values.into_complete("initial state")?;
            registry.scatter(&values, &mut y);
        }
        state.set_y(&y)?;
        Ok(state)
    }

    fn check_state(&self, state: &State) -> ModelResult<()> {
        if state.ny() != self.ny() {
            return Err(ModelError::ShapeMismatch {
                what: "state vector",
                expected: self.ny(),
                actual: state.ny(),
            });
        }
        if state.num_constraints() != self.constraints.len() {
            return Err(ModelError::ShapeMismatch {
                what: "constraint set",
                expected: self.constraints.len(),
                actual: state.num_constraints(),
            });
        }
        Ok(())
    }

    /// Compute every cached quantity up to and including `stage`.
    pub fn realize(&self, state: &mut State, stage: Stage) -> ModelResult<()> {
        self.check_state(state)?;
        for next in Stage::ALL {
            if next <= state.stage() || next > stage {
                continue;
            }
            match next {
                Stage::Position => self.realize_position(state),
                Stage::Velocity => self.realize_velocity(state),
                Stage::Dynamics => self.realize_forces(state),
                Stage::Acceleration => self.realize_accelerations(state)?,
                _ => {}
            }
            state.mark_realized(next);
        }
        Ok(())
    }

    pub fn realize_dynamics(&self, state: &mut State) -> ModelResult<()> {
        self.realize(state, Stage::Dynamics)
    }

    pub fn realize_acceleration(&self, state: &mut State) -> ModelResult<()> {
        self.realize(state, Stage::Acceleration)
    }

    fn enabled_constraints<'a>(
        &'a self,
        state: &'a State,
    ) -> impl Iterator<Item = &'a dyn Constraint> + 'a {
        self.constraints
            .iter()
            .enumerate()
            .filter(move |(i, _)| state.is_constraint_enabled(*i))
            .map(|(_, c)| c.as_ref())
    }

    fn realize_position(&self, state: &mut State) {
        let q = state.q().to_vec();
        let nm = state.num_multipliers();
        let mut g = DMatrix::zeros(nm, self.nu());
        let mut p = DVector::zeros(nm);
        let mut row = 0;
        for c in self.enabled_constraints(state) {
            let n = c.num_equations();
            c.position_errors(&q, &mut p.as_mut_slice()[row..row + n]);
            c.jacobian(&q, &mut g, row);
            row += n;
        }
        state.cache.mass_matrix = self.multibody.mass_matrix(&q);
        state.cache.constraint_jacobian = g;
        state.cache.position_errors = p;
    }

    fn realize_velocity(&self, state: &mut State) {
        let nm = state.num_multipliers();
        let mut b = DVector::zeros(nm);
        let mut row = 0;
        for c in self.enabled_constraints(state) {
            let n = c.num_equations();
            c.acceleration_bias(state.q(), state.u(), &mut b.as_mut_slice()[row..row + n]);
            row += n;
        }
        state.cache.acceleration_bias = b;
    }

    fn realize_forces(&self, state: &mut State) {
        state.cache.applied_forces = self.multibody.applied_forces(state.q(), state.u());
    }

    fn realize_accelerations(&self, state: &mut State) -> ModelResult<()> {
        let (udot, lambda) = solve_kkt(
            &state.cache.mass_matrix,
            &state.cache.constraint_jacobian,
            &state.cache.applied_forces,
            &state.cache.acceleration_bias,
        )?;
        let zdot = self.auxiliary_derivatives(state)?;

        let (nq, nu) = (self.nq(), self.nu());
        let mut ydot = DVector::zeros(self.ny());
        ydot.rows_mut(0, nq).copy_from_slice(state.u());
        ydot.rows_mut(nq, nu).copy_from(&udot);
        for (entry, values) in self.index.auxiliary_entries().zip(&zdot) {
            entry.registry().scatter(values, &mut ydot);
        }
        state.cache.ydot = ydot;
        state.cache.multipliers = lambda;
        Ok(())
    }

    /// Explicit derivatives of every auxiliary subsystem, in traversal order.
    fn auxiliary_derivatives(&self, state: &State) -> ModelResult<Vec<Vec<f64>>> {
        self.flat_subsystems()
            .into_iter()
            .zip(self.index.auxiliary_entries())
            .map(|(sub, entry)| explicit_local(sub, entry, &self.index, state))
            .collect()
    }

    /// Explicit `YDot` and multipliers. Realizes `state` to `Acceleration`.
    pub fn calc_explicit_derivatives(
        &self,
        state: &mut State,
    ) -> ModelResult<(DVector<f64>, DVector<f64>)> {
        self.realize_acceleration(state)?;
        Ok((state.ydot()?.clone(), state.multipliers()?.clone()))
    }

    /// `G uDot + b` for a candidate `uDot`. Requires `Stage::Velocity`.
    pub fn calc_constraint_acceleration_errors(
        &self,
        state: &State,
        udot: &DVector<f64>,
    ) -> ModelResult<DVector<f64>> {
        state.require(Stage::Velocity)?;
        if udot.len() != self.nu() {
            return Err(ModelError::ShapeMismatch {
                what: "uDot",
                expected: self.nu(),
                actual: udot.len(),
            });
        }
        Ok(&state.cache.constraint_jacobian * udot + &state.cache.acceleration_bias)
    }

    /// Position-level constraint errors. Requires `Stage::Position`.
    pub fn calc_constraint_position_errors(&self, state: &State) -> ModelResult<DVector<f64>> {
        state.require(Stage::Position)?;
        Ok(state.cache.position_errors.clone())
    }

    pub fn state_value(&self, state: &State, path: &str) -> ModelResult<f64> {
        Ok(state.y()[self.index.y_index(path)?])
    }

    pub fn set_state_value(&self, state: &mut State, path: &str, value: f64) -> ModelResult<()> {
        self.check_state(state)?;
        let i = self.index.y_index(path)?;
        state.set_y_entry(i, value, self.index.invalidates(i));
        Ok(())
    }

    pub fn set_coordinate_value(
        &self,
        state: &mut State,
        coordinate: &str,
        value: f64,
    ) -> ModelResult<()> {
        self.set_state_value(state, &format!("{coordinate}/value"), value)
    }

    pub fn set_coordinate_speed(
        &self,
        state: &mut State,
        coordinate: &str,
        speed: f64,
    ) -> ModelResult<()> {
        self.set_state_value(state, &format!("{coordinate}/speed"), speed)
    }

    pub fn set_constraint_enabled(
        &self,
        state: &mut State,
        constraint: &str,
        enabled: bool,
    ) -> ModelResult<()> {
        self.check_state(state)?;
        let i = self
            .constraints
            .iter()
            .position(|c| c.name() == constraint)
            .ok_or_else(|| ModelError::InvalidArg {
                what: format!("unknown constraint '{constraint}'"),
            })?;
        state.set_constraint_enabled(i, enabled);
        Ok(())
    }

    /// Copy state values back into coordinate and subsystem defaults, so a new
    /// [`default_state`](Self::default_state) reproduces `state`.
    pub fn sync_defaults_from_state(&mut self, state: &State) -> ModelResult<()> {
        self.check_state(state)?;
        let nq = self.index.nq();
        for coord in &mut self.multibody.coordinates {
            coord.default_value = state.y()[coord.id.slot()];
            coord.default_speed = state.y()[nq + coord.id.slot()];
        }
        let mut slot = 0;
        sync_tree(&mut self.subsystems, &self.index, state, &mut slot)?;
        self.index.sync_defaults(state.y());
        Ok(())
    }

    /// Assemble: move `q` onto `p(q) = 0` and `u` onto `G u = 0` by
    /// minimum-norm corrections. Leaves the state realized to `Velocity`.
    pub fn project_constraints(&self, state: &mut State, tolerance: f64) -> ModelResult<()> {
        self.check_state(state)?;
        if state.num_multipliers() == 0 {
            return self.realize(state, Stage::Velocity);
        }
        let nq = self.nq();
        let mut converged = false;
        for iteration in 0..MAX_PROJECTION_ITERATIONS {
            self.realize(state, Stage::Position)?;
            let p = &state.cache.position_errors;
            let err = p.amax();
            debug!(iteration, err, "position projection");
            if err <= tolerance {
                converged = true;
                break;
            }
            let dq = min_norm_correction(&state.cache.constraint_jacobian, p)?;
            let mut y = state.y().clone();
            for i in 0..nq {
                y[i] -= dq[i];
            }
            state.set_y(&y)?;
        }
        if !converged {
            warn!(model = %self.name, "position projection did not converge");
            return Err(ModelError::ProjectionFailed {
                what: format!(
                    "position errors above {tolerance} after {MAX_PROJECTION_ITERATIONS} iterations"
                ),
            });
        }

        let g = state.cache.constraint_jacobian.clone();
        let u = DVector::from_column_slice(state.u());
        let du = min_norm_correction(&g, &(&g * &u))?;
        let mut y = state.y().clone();
        for i in 0..self.nu() {
            y[nq + i] -= du[i];
        }
        state.set_y(&y)?;
        self.realize(state, Stage::Velocity)
    }
}

/// Solve `[M G^T; G 0][uDot; lambda] = [f; -b]`.
fn solve_kkt(
    m: &DMatrix<f64>,
    g: &DMatrix<f64>,
    f: &DVector<f64>,
    b: &DVector<f64>,
) -> ModelResult<(DVector<f64>, DVector<f64>)> {
    let nu = m.nrows();
    let nm = g.nrows();
    if nu == 0 {
        return Ok((DVector::zeros(0), DVector::zeros(nm)));
    }
    if nm == 0 {
        let chol = m
            .clone()
            .cholesky()
            .ok_or(ModelError::Singular { what: "mass matrix" })?;
        return Ok((chol.solve(f), DVector::zeros(0)));
    }

    let n = nu + nm;
    let mut a = DMatrix::zeros(n, n);
    a.view_mut((0, 0), (nu, nu)).copy_from(m);
    a.view_mut((0, nu), (nu, nm)).copy_from(&g.transpose());
    a.view_mut((nu, 0), (nm, nu)).copy_from(g);
    let mut rhs = DVector::zeros(n);
    rhs.rows_mut(0, nu).copy_from(f);
    rhs.rows_mut(nu, nm).copy_from(&(-b));

    let x = a
        .lu()
        .solve(&rhs)
        .ok_or(ModelError::Singular { what: "constraint system" })?;
    Ok((x.rows(0, nu).into_owned(), x.rows(nu, nm).into_owned()))
}

/// `G^T (G G^T)^-1 e`: the smallest `dx` with `G dx = e`.
fn min_norm_correction(g: &DMatrix<f64>, e: &DVector<f64>) -> ModelResult<DVector<f64>> {
    let ggt = g * g.transpose();
    let w = ggt.lu().solve(e).ok_or(ModelError::Singular {
        what: "constraint Jacobian",
    })?;
    Ok(g.transpose() * w)
}

pub(crate) fn explicit_local(
    sub: &dyn Subsystem,
    entry: &SubsystemEntry,
    index: &SystemIndex,
    state: &State,
) -> ModelResult<Vec<f64>> {
    debug_assert!(matches!(entry.kind(), SubsystemKind::Auxiliary { .. }));
    let frame = SubsystemFrame::new(entry, index, state);
    let mut out = LocalVector::unassigned(entry.path(), entry.registry());
    sub.explicit_derivatives(&frame, &mut out)?;
    out.into_complete("explicit derivatives")
}

fn sync_tree(
    list: &mut [Box<dyn Subsystem>],
    index: &SystemIndex,
    state: &State,
    slot: &mut usize,
) -> ModelResult<()> {
    for sub in list {
        let entry = index.auxiliary_entry(*slot);
        *slot += 1;
        sub.sync_defaults_from_state(&SubsystemFrame::new(entry, index, state))?;
        sync_tree(sub.children_mut(), index, state, slot)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModelBuilder;
    use crate::constraint::{CoordinateCoupler, CouplerFunction};
    use crate::multibody::JointKind;
    use nalgebra::Vector3;
    use rd_core::units::{kg, m};

    fn pendulum_pair() -> Model {
        let mut b = ModelBuilder::new("pair");
        let b0 = b.add_body("a", kg(1.0));
        let b1 = b.add_body("b", kg(2.0));
        b.add_joint("j0", b0, JointKind::slider(Vector3::x()), &["c0"]);
        b.add_joint("j1", b1, JointKind::slider(Vector3::y()), &["c1"]);
        b.add_constraint(Box::new(CoordinateCoupler::new(
            "cc",
            "c0",
            "c1",
            CouplerFunction::linear(2.0, 0.5),
        )));
        b.build().unwrap()
    }

    #[test]
    fn default_state_starts_at_instance() {
        let model = pendulum_pair();
        let state = model.default_state().unwrap();
        assert_eq!(state.stage(), Stage::Instance);
        assert_eq!(state.ny(), 4);
        assert_eq!(model.multiplier_count(&state), 1);
    }

    #[test]
    fn realization_walks_every_stage() {
        let model = pendulum_pair();
        let mut state = model.default_state().unwrap();
        model.realize(&mut state, Stage::Dynamics).unwrap();
        assert_eq!(state.stage(), Stage::Dynamics);
        assert!(state.ydot().is_err());
        model.realize_acceleration(&mut state).unwrap();
        assert_eq!(state.stage(), Stage::Acceleration);

        model.set_coordinate_speed(&mut state, "c0", 1.0).unwrap();
        assert_eq!(state.stage(), Stage::Position);
    }

    #[test]
    fn explicit_dynamics_satisfy_constraint_accelerations() {
        let model = pendulum_pair();
        let mut state = model.default_state().unwrap();
        let (ydot, lambda) = model.calc_explicit_derivatives(&mut state).unwrap();
        // c1'' = 2 c0''
        assert!((ydot[3] - 2.0 * ydot[2]).abs() < 1e-12);
        assert_eq!(lambda.len(), 1);
        let udot = ydot.rows(2, 2).into_owned();
        let err = model.calc_constraint_acceleration_errors(&state, &udot).unwrap();
        assert!(err[0].abs() < 1e-12);
    }

    #[test]
    fn disabled_constraint_leaves_free_fall() {
        let model = pendulum_pair();
        let mut state = model.default_state().unwrap();
        model.set_constraint_enabled(&mut state, "cc", false).unwrap();
        let (ydot, lambda) = model.calc_explicit_derivatives(&mut state).unwrap();
        assert_eq!(lambda.len(), 0);
        assert_eq!(ydot[2], 0.0);
        assert!((ydot[3] + 9.806_65).abs() < 1e-12);
    }

    #[test]
    fn projection_assembles_positions_and_speeds() {
        let model = pendulum_pair();
        let mut state = model.default_state().unwrap();
        model.set_coordinate_value(&mut state, "c0", 0.3).unwrap();
        model.set_coordinate_speed(&mut state, "c0", 1.0).unwrap();
        model.project_constraints(&mut state, 1e-12).unwrap();

        let c0 = model.state_value(&state, "c0/value").unwrap();
        let c1 = model.state_value(&state, "c1/value").unwrap();
        assert!((c1 - (2.0 * c0 + 0.5)).abs() < 1e-12);
        let u0 = model.state_value(&state, "c0/speed").unwrap();
        let u1 = model.state_value(&state, "c1/speed").unwrap();
        assert!((u1 - 2.0 * u0).abs() < 1e-12);
        assert_eq!(state.stage(), Stage::Velocity);
    }

    #[test]
    fn pendulum_swings_back() {
        let mut b = ModelBuilder::new("pendulum");
        let bob = b.add_body("bob", kg(1.5));
        b.add_joint("pin", bob, JointKind::Pin { length: m(0.8) }, &["theta"]);
        b.set_coordinate_default("theta", 0.4, 0.0);
        let model = b.build().unwrap();
        let mut state = model.default_state().unwrap();
        let (ydot, _) = model.calc_explicit_derivatives(&mut state).unwrap();
        let expected = -9.806_65 / 0.8 * 0.4_f64.sin();
        assert!((ydot[1] - expected).abs() < 1e-12);
    }

    #[test]
    fn sync_defaults_round_trips_coordinates() {
        let mut model = pendulum_pair();
        let mut state = model.default_state().unwrap();
        model.set_coordinate_value(&mut state, "c0", 0.25).unwrap();
        model.set_coordinate_speed(&mut state, "c1", -1.5).unwrap();
        model.sync_defaults_from_state(&state).unwrap();
        let fresh = model.default_state().unwrap();
        assert_eq!(fresh.y(), state.y());
    }

    /// Declares a default but overrides neither defaults hook.
    struct Decay;

    impl Subsystem for Decay {
        fn name(&self) -> &str {
            "decay"
        }

        fn declare_state_variables(&self, decls: &mut crate::variables::StateDeclarations) {
            decls.add("x").with_default(1.0);
        }

        fn explicit_derivatives(
            &self,
            frame: &SubsystemFrame<'_>,
            derivatives: &mut LocalVector<'_>,
        ) -> ModelResult<()> {
            derivatives.set("x", -frame.value("x")?)
        }
    }

    #[test]
    fn sync_defaults_reaches_subsystems_without_hooks() {
        let mut b = ModelBuilder::new("decay");
        b.add_subsystem(Box::new(Decay));
        let mut model = b.build().unwrap();
        let mut state = model.default_state().unwrap();
        assert_eq!(model.state_value(&state, "decay/x").unwrap(), 1.0);

        model.set_state_value(&mut state, "decay/x", -0.2).unwrap();
        model.sync_defaults_from_state(&state).unwrap();
        let fresh = model.default_state().unwrap();
        assert_eq!(model.state_value(&fresh, "decay/x").unwrap(), -0.2);
        assert_eq!(
            model.index().entry("decay").unwrap().registry().variables()[0].default_value,
            -0.2
        );
    }

    #[test]
    fn foreign_states_are_rejected() {
        let model = pendulum_pair();
        let mut other = ModelBuilder::new("empty").build().unwrap().default_state().unwrap();
        assert!(matches!(
            model.realize(&mut other, Stage::Position),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }
}
