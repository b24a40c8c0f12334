#![allow(clippy::needless_range_loop)]
//! Dense matrix operations backed by faer.
//!
//! Wraps faer's column-major Mat<f64> with the operations the
//! association engines need: block products for kinship accumulation,
//! eigenbasis rotation of marker blocks, symmetric subsetting for
//! resampling and column access for per-marker tests.

use faer::Mat;

/// A dense matrix wrapper around faer's `Mat<f64>`.
///
/// Column-major layout, so `col` and `set_col` are the cheap accessors.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    inner: Mat<f64>,
}

impl DenseMatrix {
    /// Create a new dense matrix filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            inner: Mat::zeros(nrows, ncols),
        }
    }

    /// Create a matrix whose entry (i, j) is `f(i, j)`.
    pub fn from_fn<F>(nrows: usize, ncols: usize, f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        Self {
            inner: Mat::from_fn(nrows, ncols, f),
        }
    }

    /// Create a dense matrix from a flat vec (column-major order).
    pub fn from_col_major(nrows: usize, ncols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[j * nrows + i]);
        Self { inner }
    }

    /// Create a dense matrix from a 2D slice (row-major input).
    pub fn from_row_major(nrows: usize, ncols: usize, data: &[f64]) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[i * ncols + j]);
        Self { inner }
    }

    /// Build an n x p matrix from p column vectors of equal length n.
    pub fn from_columns(nrows: usize, columns: &[Vec<f64>]) -> Self {
        for c in columns {
            assert_eq!(c.len(), nrows);
        }
        let inner = Mat::from_fn(nrows, columns.len(), |i, j| columns[j][i]);
        Self { inner }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    /// Get element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.read(row, col)
    }

    /// Set element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.inner.write(row, col, value);
    }

    /// Get a reference to the underlying faer matrix.
    pub fn as_faer(&self) -> &Mat<f64> {
        &self.inner
    }

    /// Matrix-vector product: self * v -> result vector.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.ncols(), v.len());
        let n = self.nrows();
        let mut result = vec![0.0; n];
        for j in 0..self.ncols() {
            let vj = v[j];
            if vj == 0.0 {
                continue;
            }
            for i in 0..n {
                result[i] += self.inner.read(i, j) * vj;
            }
        }
        result
    }

    /// Transposed matrix-vector product: self' * v.
    pub fn t_mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.nrows(), v.len());
        let n = self.nrows();
        (0..self.ncols())
            .map(|j| {
                let mut s = 0.0;
                for i in 0..n {
                    s += self.inner.read(i, j) * v[i];
                }
                s
            })
            .collect()
    }

    /// Matrix-matrix product: self * other.
    pub fn mat_mul(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.ncols(), other.nrows());
        let result = &self.inner * &other.inner;
        DenseMatrix { inner: result }
    }

    /// Gram product self * self' (n x n for an n x b block).
    pub fn gram(&self) -> DenseMatrix {
        let t = self.inner.transpose().to_owned();
        DenseMatrix {
            inner: &self.inner * &t,
        }
    }

    /// Cross product self * other' for two blocks with equal column count.
    pub fn mul_transpose(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.ncols(), other.ncols());
        let t = other.inner.transpose().to_owned();
        DenseMatrix {
            inner: &self.inner * &t,
        }
    }

    /// Transpose.
    pub fn transpose(&self) -> DenseMatrix {
        let inner = self.inner.transpose().to_owned();
        DenseMatrix { inner }
    }

    /// Extract column as a Vec<f64>.
    pub fn col(&self, j: usize) -> Vec<f64> {
        let n = self.nrows();
        let mut v = Vec::with_capacity(n);
        for i in 0..n {
            v.push(self.inner.read(i, j));
        }
        v
    }

    /// Set an entire column from a slice.
    pub fn set_col(&mut self, j: usize, data: &[f64]) {
        assert_eq!(data.len(), self.nrows());
        for i in 0..self.nrows() {
            self.inner.write(i, j, data[i]);
        }
    }

    /// In-place element-wise addition: self += other.
    pub fn add_assign(&mut self, other: &DenseMatrix) {
        assert_eq!(self.nrows(), other.nrows());
        assert_eq!(self.ncols(), other.ncols());
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                let v = self.inner.read(i, j) + other.inner.read(i, j);
                self.inner.write(i, j, v);
            }
        }
    }

    /// Scalar multiplication.
    pub fn scale(&self, s: f64) -> DenseMatrix {
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.inner.read(i, j) * s
        });
        DenseMatrix { inner }
    }

    /// Diagonal of a square matrix.
    pub fn diag(&self) -> Vec<f64> {
        let n = self.nrows().min(self.ncols());
        let mut d = Vec::with_capacity(n);
        for i in 0..n {
            d.push(self.inner.read(i, i));
        }
        d
    }

    /// Largest absolute difference between (i, j) and (j, i).
    pub fn max_asymmetry(&self) -> f64 {
        assert_eq!(self.nrows(), self.ncols());
        let n = self.nrows();
        let mut worst = 0.0_f64;
        for j in 0..n {
            for i in (j + 1)..n {
                worst = worst.max((self.inner.read(i, j) - self.inner.read(j, i)).abs());
            }
        }
        worst
    }

    /// Replace a square matrix with (A + A') / 2.
    pub fn symmetrize(&mut self) {
        assert_eq!(self.nrows(), self.ncols());
        let n = self.nrows();
        for j in 0..n {
            for i in (j + 1)..n {
                let avg = 0.5 * (self.inner.read(i, j) + self.inner.read(j, i));
                self.inner.write(i, j, avg);
                self.inner.write(j, i, avg);
            }
        }
    }

    /// Principal submatrix (or general row/column selection).
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> DenseMatrix {
        let inner = Mat::from_fn(rows.len(), cols.len(), |i, j| {
            self.inner.read(rows[i], cols[j])
        });
        DenseMatrix { inner }
    }

    /// Dot product of two vectors.
    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    /// Extract column data as a flat Vec in column-major order.
    pub fn to_col_major(&self) -> Vec<f64> {
        let mut data = Vec::with_capacity(self.nrows() * self.ncols());
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                data.push(self.inner.read(i, j));
            }
        }
        data
    }
}
