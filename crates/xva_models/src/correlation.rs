//! Factor correlation and its Cholesky factor.

use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::types::Currency;

/// Stochastic factor of the cross-asset model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FactorId {
    /// Interest rate factor of a currency.
    Ir(Currency),
    /// FX factor of a foreign currency against the domestic one.
    Fx(Currency),
}

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorId::Ir(ccy) => write!(f, "IR:{}", ccy),
            FactorId::Fx(ccy) => write!(f, "FX:{}", ccy),
        }
    }
}

impl FromStr for FactorId {
    type Err = ModelError;

    /// Parses `IR:USD` or `FX:EUR`.
    fn from_str(s: &str) -> Result<Self, ModelError> {
        let invalid = || ModelError::Correlation(format!("unknown factor '{}'", s));
        let (kind, ccy) = s.split_once(':').ok_or_else(invalid)?;
        let ccy: Currency = ccy.parse().map_err(|_| invalid())?;
        match kind.to_uppercase().as_str() {
            "IR" => Ok(FactorId::Ir(ccy)),
            "FX" => Ok(FactorId::Fx(ccy)),
            _ => Err(invalid()),
        }
    }
}

/// Correlation matrix with validation and Cholesky decomposition.
///
/// A correlation matrix must be symmetric with unit diagonal, off-diagonal
/// elements in [-1, 1], and positive definite for the decomposition.
#[derive(Clone, Debug)]
pub struct CorrelationMatrix {
    /// Row-major elements.
    data: Vec<f64>,
    dim: usize,
}

impl CorrelationMatrix {
    /// Creates a matrix from row-major data.
    ///
    /// # Errors
    ///
    /// `ModelError::Correlation` if the shape, diagonal, symmetry or range
    /// checks fail.
    pub fn new(data: &[f64], dim: usize) -> Result<Self, ModelError> {
        let expected = dim * dim;
        if data.len() != expected {
            return Err(ModelError::Correlation(format!(
                "expected {} elements, got {}",
                expected,
                data.len()
            )));
        }

        let epsilon = 1e-10;
        for i in 0..dim {
            let diag = data[i * dim + i];
            if (diag - 1.0).abs() > epsilon {
                return Err(ModelError::Correlation(format!(
                    "diagonal element {} is {}, expected 1.0",
                    i, diag
                )));
            }
        }

        for i in 0..dim {
            for j in (i + 1)..dim {
                let val_ij = data[i * dim + j];
                let val_ji = data[j * dim + i];
                if (val_ij - val_ji).abs() > epsilon {
                    return Err(ModelError::Correlation(format!(
                        "matrix is not symmetric at ({}, {})",
                        i, j
                    )));
                }
                if !(-1.0..=1.0).contains(&val_ij) {
                    return Err(ModelError::Correlation(format!(
                        "correlation at ({}, {}) is {}, must be in [-1, 1]",
                        i, j, val_ij
                    )));
                }
            }
        }

        Ok(Self {
            data: data.to_vec(),
            dim,
        })
    }

    /// Identity matrix (independent factors).
    pub fn identity(dim: usize) -> Self {
        let mut data = vec![0.0; dim * dim];
        for i in 0..dim {
            data[i * dim + i] = 1.0;
        }
        Self { data, dim }
    }

    /// Builds a matrix over `factors` from pairwise entries; unlisted pairs are
    /// uncorrelated.
    pub fn from_pairs(
        factors: &[FactorId],
        pairs: &[(FactorId, FactorId, f64)],
    ) -> Result<Self, ModelError> {
        let dim = factors.len();
        let mut data = Self::identity(dim).data;
        let position = |f: &FactorId| {
            factors
                .iter()
                .position(|g| g == f)
                .ok_or_else(|| ModelError::Correlation(format!("factor {} is not modelled", f)))
        };
        for (f1, f2, rho) in pairs {
            let (i, j) = (position(f1)?, position(f2)?);
            if i == j {
                if (*rho - 1.0).abs() > 1e-10 {
                    return Err(ModelError::Correlation(format!(
                        "self-correlation of {} must be 1",
                        f1
                    )));
                }
                continue;
            }
            data[i * dim + j] = *rho;
            data[j * dim + i] = *rho;
        }
        Self::new(&data, dim)
    }

    /// Matrix dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Element at (i, j).
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.dim + j]
    }

    /// Lower triangular L with C = L Lᵀ.
    pub fn cholesky(&self) -> Result<CholeskyFactor, ModelError> {
        let n = self.dim;
        let mut lower = vec![0.0; n * n];
        let not_pd = || ModelError::Correlation("matrix is not positive definite".to_string());

        for i in 0..n {
            for j in 0..=i {
                let mut sum = 0.0;
                if j == i {
                    for k in 0..j {
                        let l_jk = lower[j * n + k];
                        sum += l_jk * l_jk;
                    }
                    let diag = self.get(j, j) - sum;
                    if diag <= 0.0 {
                        return Err(not_pd());
                    }
                    lower[j * n + j] = diag.sqrt();
                } else {
                    for k in 0..j {
                        sum += lower[i * n + k] * lower[j * n + k];
                    }
                    let l_jj = lower[j * n + j];
                    if l_jj <= 0.0 {
                        return Err(not_pd());
                    }
                    lower[i * n + j] = (self.get(i, j) - sum) / l_jj;
                }
            }
        }

        Ok(CholeskyFactor { data: lower, dim: n })
    }
}

/// Lower triangular Cholesky factor of a correlation matrix.
#[derive(Clone, Debug)]
pub struct CholeskyFactor {
    data: Vec<f64>,
    dim: usize,
}

impl CholeskyFactor {
    /// Matrix dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Element at (i, j); zero above the diagonal.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        if j > i {
            0.0
        } else {
            self.data[i * self.dim + j]
        }
    }

    /// Correlates independent normals in place (`z <- L z`).
    ///
    /// Only the first `dim()` entries are transformed.
    pub fn transform_inplace(&self, z: &mut [f64]) {
        let n = self.dim.min(z.len());
        // walk rows bottom-up so each row only reads untouched entries
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in 0..=i {
                sum += self.data[i * self.dim + j] * z[j];
            }
            z[i] = sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_factor_id_round_trip() {
        let f: FactorId = "FX:EUR".parse().unwrap();
        assert_eq!(f, FactorId::Fx(Currency::EUR));
        assert_eq!(f.to_string(), "FX:EUR");
        assert!("EQ:EUR".parse::<FactorId>().is_err());
        assert!("IR".parse::<FactorId>().is_err());
    }

    #[test]
    fn test_invalid_matrices() {
        assert!(CorrelationMatrix::new(&[1.0, 0.5, 0.5], 2).is_err());
        assert!(CorrelationMatrix::new(&[1.0, 0.5, 0.4, 1.0], 2).is_err());
        assert!(CorrelationMatrix::new(&[1.0, 1.5, 1.5, 1.0], 2).is_err());
        assert!(CorrelationMatrix::new(&[0.9, 0.0, 0.0, 1.0], 2).is_err());
    }

    #[test]
    fn test_cholesky_2x2() {
        let rho = 0.6;
        let l = CorrelationMatrix::new(&[1.0, rho, rho, 1.0], 2)
            .unwrap()
            .cholesky()
            .unwrap();
        assert_relative_eq!(l.get(0, 0), 1.0);
        assert_relative_eq!(l.get(1, 0), rho);
        assert_relative_eq!(l.get(1, 1), (1.0 - rho * rho).sqrt());
        assert_eq!(l.get(0, 1), 0.0);

        let mut z = vec![1.0, 2.0];
        l.transform_inplace(&mut z);
        assert_relative_eq!(z[0], 1.0);
        assert_relative_eq!(z[1], rho + 2.0 * (1.0 - rho * rho).sqrt());
    }

    #[test]
    fn test_not_positive_definite() {
        let m = CorrelationMatrix::new(
            &[1.0, 0.99, -0.99, 0.99, 1.0, 0.99, -0.99, 0.99, 1.0],
            3,
        )
        .unwrap();
        assert!(m.cholesky().is_err());
    }

    #[test]
    fn test_from_pairs() {
        let factors = [FactorId::Ir(Currency::USD), FactorId::Ir(Currency::EUR), FactorId::Fx(Currency::EUR)];
        let m = CorrelationMatrix::from_pairs(
            &factors,
            &[(FactorId::Ir(Currency::USD), FactorId::Fx(Currency::EUR), -0.2)],
        )
        .unwrap();
        assert_relative_eq!(m.get(2, 0), -0.2);
        assert_relative_eq!(m.get(1, 2), 0.0);

        let missing = CorrelationMatrix::from_pairs(
            &factors,
            &[(FactorId::Ir(Currency::GBP), FactorId::Fx(Currency::EUR), 0.1)],
        );
        assert!(missing.is_err());
    }
}
