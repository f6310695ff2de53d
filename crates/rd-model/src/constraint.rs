//! Holonomic constraints between generalized coordinates.
//!
//! A constraint contributes `num_equations` rows to the position errors `p(q)`,
//! the Jacobian `G(q)` (so that velocity errors are `G u`), and the acceleration
//! errors `G uDot + b(q, u)`. Multipliers enter the equations of motion as
//! `M uDot + G^T lambda = f`.

use crate::error::{ModelError, ModelResult};
use crate::multibody::Coordinate;
use nalgebra::DMatrix;

/// Name lookup handed to constraints when the model is built.
pub struct CoordinateTable<'a> {
    coordinates: &'a [Coordinate],
}

impl<'a> CoordinateTable<'a> {
    pub(crate) fn new(coordinates: &'a [Coordinate]) -> Self {
        Self { coordinates }
    }

    /// Index of a coordinate in `q` (and `u`).
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.coordinates
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id.slot())
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

pub trait Constraint: Send + Sync {
    fn name(&self) -> &str;

    fn num_equations(&self) -> usize {
        1
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    /// Resolve coordinate references. Called once while the model is built.
    fn bind(&mut self, table: &CoordinateTable<'_>) -> ModelResult<()>;

    fn position_errors(&self, q: &[f64], out: &mut [f64]);

    /// Write this constraint's rows of `G` starting at `row`. Columns index `u`.
    fn jacobian(&self, q: &[f64], g: &mut DMatrix<f64>, row: usize);

    fn acceleration_bias(&self, q: &[f64], u: &[f64], out: &mut [f64]);
}

/// Scalar function used by [`CoordinateCoupler`].
#[derive(Debug, Clone, PartialEq)]
pub enum CouplerFunction {
    Linear { slope: f64, intercept: f64 },
    /// `c[0] + c[1] x + c[2] x^2 + ...`
    Polynomial { coefficients: Vec<f64> },
}

impl CouplerFunction {
    pub fn linear(slope: f64, intercept: f64) -> Self {
        CouplerFunction::Linear { slope, intercept }
    }

    pub fn value(&self, x: f64) -> f64 {
        match self {
            CouplerFunction::Linear { slope, intercept } => slope * x + intercept,
            CouplerFunction::Polynomial { coefficients } => {
                coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
            }
        }
    }

    pub fn first_derivative(&self, x: f64) -> f64 {
        match self {
            CouplerFunction::Linear { slope, .. } => *slope,
            CouplerFunction::Polynomial { coefficients } => coefficients
                .iter()
                .enumerate()
                .skip(1)
                .rev()
                .fold(0.0, |acc, (k, &c)| acc * x + k as f64 * c),
        }
    }

    pub fn second_derivative(&self, x: f64) -> f64 {
        match self {
            CouplerFunction::Linear { .. } => 0.0,
            CouplerFunction::Polynomial { coefficients } => coefficients
                .iter()
                .enumerate()
                .skip(2)
                .rev()
                .fold(0.0, |acc, (k, &c)| acc * x + (k * (k - 1)) as f64 * c),
        }
    }
}

/// Enforces `q[dependent] = f(q[independent])`.
#[derive(Debug, Clone)]
pub struct CoordinateCoupler {
    name: String,
    independent: String,
    dependent: String,
    function: CouplerFunction,
    bound: Option<(usize, usize)>,
}

impl CoordinateCoupler {
    pub fn new(
        name: impl Into<String>,
        independent: impl Into<String>,
        dependent: impl Into<String>,
        function: CouplerFunction,
    ) -> Self {
        Self {
            name: name.into(),
            independent: independent.into(),
            dependent: dependent.into(),
            function,
            bound: None,
        }
    }

    pub fn function(&self) -> &CouplerFunction {
        &self.function
    }
}

impl Constraint for CoordinateCoupler {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, table: &CoordinateTable<'_>) -> ModelResult<()> {
        let lookup = |coord: &str| {
            table.index_of(coord).ok_or_else(|| {
                ModelError::config(&self.name, format!("unknown coordinate '{coord}'"))
            })
        };
        let i = lookup(&self.independent)?;
        let d = lookup(&self.dependent)?;
        if i == d {
            return Err(ModelError::config(
                &self.name,
                "independent and dependent coordinate are the same",
            ));
        }
        self.bound = Some((i, d));
        Ok(())
    }

    fn position_errors(&self, q: &[f64], out: &mut [f64]) {
        let Some((i, d)) = self.bound else { return };
        out[0] = q[d] - self.function.value(q[i]);
    }

    fn jacobian(&self, q: &[f64], g: &mut DMatrix<f64>, row: usize) {
        let Some((i, d)) = self.bound else { return };
        g[(row, i)] = -self.function.first_derivative(q[i]);
        g[(row, d)] = 1.0;
    }

    fn acceleration_bias(&self, q: &[f64], u: &[f64], out: &mut [f64]) {
        let Some((i, _)) = self.bound else { return };
        out[0] = -self.function.second_derivative(q[i]) * u[i] * u[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rd_core::Id;

    fn coords(names: &[&str]) -> Vec<Coordinate> {
        names
            .iter()
            .enumerate()
            .map(|(k, n)| Coordinate {
                id: Id::from_index(k as u32),
                name: (*n).into(),
                joint: Id::from_index(0),
                default_value: 0.0,
                default_speed: 0.0,
            })
            .collect()
    }

    #[test]
    fn polynomial_derivatives() {
        // 1 + 2x + 3x^2
        let f = CouplerFunction::Polynomial {
            coefficients: vec![1.0, 2.0, 3.0],
        };
        assert_eq!(f.value(2.0), 17.0);
        assert_eq!(f.first_derivative(2.0), 14.0);
        assert_eq!(f.second_derivative(2.0), 6.0);
    }

    #[test]
    fn linear_coupler_rows() {
        let table_coords = coords(&["c0", "c1", "c2"]);
        let table = CoordinateTable::new(&table_coords);
        let mut cc = CoordinateCoupler::new("cplr", "c0", "c1", CouplerFunction::linear(5.1, 2.31));
        cc.bind(&table).unwrap();

        let q = [0.5, 5.1 * 0.5 + 2.31, 0.0];
        let mut p = [1.0];
        cc.position_errors(&q, &mut p);
        assert!(p[0].abs() < 1e-14);

        let mut g = DMatrix::zeros(1, 3);
        cc.jacobian(&q, &mut g, 0);
        assert_eq!(g[(0, 0)], -5.1);
        assert_eq!(g[(0, 1)], 1.0);
        assert_eq!(g[(0, 2)], 0.0);

        let mut b = [1.0];
        cc.acceleration_bias(&q, &[1.0, 5.1, 0.0], &mut b);
        assert_eq!(b[0], 0.0);
    }

    #[test]
    fn binding_reports_unknown_coordinates() {
        let table_coords = coords(&["c0"]);
        let table = CoordinateTable::new(&table_coords);
        let mut cc = CoordinateCoupler::new("cplr", "c0", "nope", CouplerFunction::linear(1.0, 0.0));
        assert!(matches!(
            cc.bind(&table),
            Err(ModelError::Configuration { .. })
        ));
    }
}
