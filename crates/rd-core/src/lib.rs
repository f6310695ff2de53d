//! rd-core: numeric vocabulary shared by the residual-dynamics crates.
//!
//! - `ids`: typed arena indices for bodies, joints, coordinates and constraints
//! - `numeric`: tolerance comparisons, finiteness checks, difference steps
//! - `units`: uom SI quantities used at model-building boundaries
//! - `error`: `CoreError`

pub mod error;
pub mod ids;
pub mod numeric;
pub mod units;

pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
pub use units::*;
