//! Structured, node-centered 3D grids.
//!
//! Every map and potential of one calculation shares a single [`GridTopology`]; node
//! `(i, j, k)` sits at `origin + (i hx, j hy, k hz)` and is stored at linear index
//! `i + nx (j + ny k)`.

pub mod field;
pub mod topology;

pub use field::{GridError, GridField, OutOfDomain};
pub use topology::GridTopology;
