use nalgebra::{Const, DMatrix, Dim, Dyn, Matrix, MatrixView};

use super::{LinReg, LinRegError};

/// Tikhonov regularization aka ridge regression with a single fixed strength.
/// Solves `(X^T X + alpha * I) W = X^T Y` directly, which makes it the
/// reference the shared eigendecomposition solver is checked against.
#[derive(Debug, Clone)]
pub struct TikhonovRegularization {
    /// Ridge parameter
    pub regularization_coeff: f64,
}

impl LinReg for TikhonovRegularization {
    fn fit_readout<'a>(
        &self,
        design: &'a MatrixView<'a, f64, Dyn, Dyn, Const<1>, Dyn>,
        targets: &'a MatrixView<'a, f64, Dyn, Dyn, Const<1>, Dyn>,
    ) -> Result<DMatrix<f64>, LinRegError> {
        if design.nrows() != targets.nrows() {
            return Err(LinRegError::ShapeMismatch {
                what: "design rows vs target rows",
                expected: design.nrows(),
                got: targets.nrows(),
            });
        }
        let reg_m: DMatrix<f64> = Matrix::from_diagonal_element_generic(
            Dim::from_usize(design.ncols()),
            Dim::from_usize(design.ncols()),
            self.regularization_coeff,
        );

        let p0 = design.transpose() * design;
        let p1 = (p0 + reg_m).try_inverse().ok_or(LinRegError::Singular(design.ncols()))?;
        let p2 = design.transpose() * targets;

        Ok(p1 * p2)
    }
}
