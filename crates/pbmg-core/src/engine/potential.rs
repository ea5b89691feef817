use crate::core::grid::{GridError, GridField, GridTopology};
use nalgebra::{Point3, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PotentialStatus {
    /// Initial guess or parent data; not the result of a completed solve.
    Unsolved,
    Converged,
    Failed,
}

/// Electrostatic potential in kT/e on the nodes of the calculation grid, with the record of
/// the solve that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialField {
    field: GridField,
    status: PotentialStatus,
    iterations: usize,
    residual_history: Vec<f64>,
}

impl PotentialField {
    pub fn zeros(topology: GridTopology) -> Self {
        Self::initial(GridField::new(topology))
    }

    /// Wraps a field to be used as an initial guess.
    pub fn initial(field: GridField) -> Self {
        Self {
            field,
            status: PotentialStatus::Unsolved,
            iterations: 0,
            residual_history: Vec::new(),
        }
    }

    pub(crate) fn solved(
        field: GridField,
        status: PotentialStatus,
        iterations: usize,
        residual_history: Vec<f64>,
    ) -> Self {
        Self {
            field,
            status,
            iterations,
            residual_history,
        }
    }

    pub fn field(&self) -> &GridField {
        &self.field
    }

    pub fn topology(&self) -> &GridTopology {
        self.field.topology()
    }

    pub fn values(&self) -> &[f64] {
        self.field.values()
    }

    pub fn status(&self) -> PotentialStatus {
        self.status
    }

    pub fn is_converged(&self) -> bool {
        self.status == PotentialStatus::Converged
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// `‖r_k‖ / ‖r_0‖` after each iteration.
    pub fn residual_history(&self) -> &[f64] {
        &self.residual_history
    }

    pub fn final_relative_residual(&self) -> Option<f64> {
        self.residual_history.last().copied()
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> Result<f64, GridError> {
        self.field.get(i, j, k)
    }

    pub fn value_at(&self, point: &Point3<f64>) -> Result<f64, GridError> {
        self.field.value_at(point)
    }

    pub fn gradient_at(&self, point: &Point3<f64>) -> Result<Vector3<f64>, GridError> {
        self.field.gradient_at(point)
    }

    pub fn into_field(self) -> GridField {
        self.field
    }
}
