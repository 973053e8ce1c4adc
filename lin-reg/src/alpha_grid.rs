use crate::LinRegError;

/// Ordered, strictly increasing set of positive ridge strengths that is
/// evaluated on every fold.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaGrid {
    alphas: Vec<f64>,
}

impl AlphaGrid {
    /// Create a grid from explicit values
    ///
    /// # Errors
    /// If the grid is empty, contains a non finite or non positive value, or
    /// is not strictly increasing
    pub fn new(alphas: Vec<f64>) -> Result<Self, LinRegError> {
        if alphas.is_empty() {
            return Err(LinRegError::InvalidAlphaGrid("grid is empty".to_string()));
        }
        if let Some(a) = alphas.iter().find(|a| !a.is_finite() || **a <= 0.0) {
            return Err(LinRegError::InvalidAlphaGrid(format!("{a} is not a positive strength")));
        }
        if let Some(w) = alphas.windows(2).find(|w| w[1] <= w[0]) {
            return Err(LinRegError::InvalidAlphaGrid(format!(
                "{} does not increase over {}",
                w[1], w[0]
            )));
        }

        Ok(Self { alphas })
    }

    /// `num` logarithmically spaced strengths from `10^start` to `10^stop`,
    /// both ends included
    pub fn logspace(start: f64, stop: f64, num: usize) -> Result<Self, LinRegError> {
        let alphas = match num {
            0 => vec![],
            1 => vec![10_f64.powf(start)],
            _ => {
                let step = (stop - start) / (num - 1) as f64;
                (0..num).map(|i| 10_f64.powf(start + step * i as f64)).collect()
            }
        };
        Self::new(alphas)
    }

    /// The strengths in increasing order
    #[inline(always)]
    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    /// Number of strengths in the grid
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.alphas.len()
    }

    /// Always false, an empty grid cannot be constructed
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.alphas.is_empty()
    }
}

impl Default for AlphaGrid {
    /// Ten strengths from 1e2 to 1e7
    fn default() -> Self {
        let step = 5.0 / 9.0;
        Self {
            alphas: (0..10).map(|i| 10_f64.powf(2.0 + step * i as f64)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use round::round;

    use super::*;

    #[test]
    fn alpha_grid_logspace() {
        let grid = AlphaGrid::logspace(2.0, 7.0, 10).unwrap();

        assert_eq!(grid.len(), 10);
        assert_eq!(round(grid.alphas()[0], 6), 100.0);
        assert_eq!(round(grid.alphas()[9], 1), 10_000_000.0);
        assert_eq!(grid, AlphaGrid::default());
    }

    #[test]
    fn alpha_grid_rejects_invalid() {
        assert!(AlphaGrid::new(vec![]).is_err());
        assert!(AlphaGrid::new(vec![1.0, 1.0]).is_err());
        assert!(AlphaGrid::new(vec![10.0, 1.0]).is_err());
        assert!(AlphaGrid::new(vec![0.0, 1.0]).is_err());
        assert!(AlphaGrid::new(vec![f64::NAN]).is_err());
        assert!(AlphaGrid::new(vec![0.5, 1.0, 2.0]).is_ok());
    }
}
