//! Dense matrix helpers for complex and real tiles
//!
//! Thin wrappers over `ndarray` for the handful of operations the
//! co-registration core relies on: window copies, products, element-wise
//! helpers and a small symmetric solver for least-squares fits.

use ndarray::{s, Array1, Array2, ArrayView2, LinalgScalar};
use num_traits::Zero;

use crate::types::{ComplexMatrix, RealMatrix, SarError, SarResult, Window};

fn check_inside<T>(matrix: &Array2<T>, win: &Window, what: &str) -> SarResult<()> {
    let bounds = Window::from_shape(matrix.nrows(), matrix.ncols());
    if matrix.is_empty() || !bounds.contains(win) {
        return Err(SarError::OutOfBounds(format!(
            "{} window {} outside matrix {}x{}",
            what,
            win,
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    Ok(())
}

fn slice_of<'a, T>(matrix: &'a Array2<T>, win: &Window) -> ArrayView2<'a, T> {
    matrix.slice(s![
        win.line_lo as usize..=win.line_hi as usize,
        win.pix_lo as usize..=win.pix_hi as usize
    ])
}

/// Copy `input[in_win]` into `out[out_win]`.
///
/// Both windows are in matrix coordinates and must have the same size.
pub fn set_data<T: Clone>(
    out: &mut Array2<T>,
    out_win: Window,
    input: &Array2<T>,
    in_win: Window,
) -> SarResult<()> {
    if !out_win.same_size(&in_win) {
        return Err(SarError::InvalidArgument(format!(
            "Window size mismatch: output {:?} vs input {:?}",
            out_win.shape(),
            in_win.shape()
        )));
    }
    check_inside(out, &out_win, "Output")?;
    check_inside(input, &in_win, "Input")?;

    out.slice_mut(s![
        out_win.line_lo as usize..=out_win.line_hi as usize,
        out_win.pix_lo as usize..=out_win.pix_hi as usize
    ])
    .assign(&slice_of(input, &in_win));
    Ok(())
}

/// Copy of the sub-window `win` of `input`
pub fn extract<T: Clone + Zero>(input: &Array2<T>, win: Window) -> SarResult<Array2<T>> {
    check_inside(input, &win, "Input")?;
    Ok(slice_of(input, &win).to_owned())
}

pub fn transpose<T: Clone>(a: &Array2<T>) -> Array2<T> {
    a.t().as_standard_layout().into_owned()
}

/// Matrix product `a * b`
pub fn matmul<T: LinalgScalar>(a: &Array2<T>, b: &Array2<T>) -> SarResult<Array2<T>> {
    if a.ncols() != b.nrows() {
        return Err(SarError::InvalidArgument(format!(
            "Cannot multiply {}x{} by {}x{}",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    Ok(a.dot(b))
}

/// Matrix product `a^T * b`
pub fn mat_t_x_mat<T: LinalgScalar>(a: &Array2<T>, b: &Array2<T>) -> SarResult<Array2<T>> {
    if a.nrows() != b.nrows() {
        return Err(SarError::InvalidArgument(format!(
            "Cannot multiply transpose of {}x{} by {}x{}",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    Ok(a.t().dot(b))
}

/// Element-wise `a *= b`
pub fn dot_mult_in_place(a: &mut ComplexMatrix, b: &ComplexMatrix) -> SarResult<()> {
    if a.dim() != b.dim() {
        return Err(SarError::InvalidArgument(format!(
            "Element-wise product of {:?} and {:?}",
            a.dim(),
            b.dim()
        )));
    }
    *a *= b;
    Ok(())
}

pub fn magnitude(a: &ComplexMatrix) -> RealMatrix {
    a.mapv(|c| c.norm())
}

pub fn intensity(a: &ComplexMatrix) -> RealMatrix {
    a.mapv(|c| c.norm_sqr())
}

/// Reverse the element order of a vector
pub fn fliplr<T: Clone>(v: &Array1<T>) -> Array1<T> {
    v.slice(s![..;-1]).to_owned()
}

/// Frequency mirror of a vector in FFT order: element `k` moves to `-k mod n`
pub fn mirror<T: Clone>(v: &Array1<T>) -> Array1<T> {
    let n = v.len();
    Array1::from_shape_fn(n, |k| v[(n - k) % n].clone())
}

/// Remove the mean of a real matrix in place, returning the mean
pub fn demean(a: &mut RealMatrix) -> f64 {
    let mean = a.mean().unwrap_or(0.0);
    a.mapv_inplace(|v| v - mean);
    mean
}

/// Solve `n x = rhs` for symmetric positive definite `n` (Cholesky)
pub fn solve_symmetric(n: &RealMatrix, rhs: &Array1<f64>) -> SarResult<Array1<f64>> {
    let size = n.nrows();
    if n.ncols() != size || rhs.len() != size {
        return Err(SarError::InvalidArgument(format!(
            "System {}x{} with right-hand side of length {}",
            n.nrows(),
            n.ncols(),
            rhs.len()
        )));
    }

    let mut l = RealMatrix::zeros((size, size));
    for i in 0..size {
        for j in 0..=i {
            let mut sum = n[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return Err(SarError::NumericalDegenerate(format!(
                        "Normal matrix not positive definite at row {}",
                        i
                    )));
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    // forward then backward substitution
    let mut y = Array1::zeros(size);
    for i in 0..size {
        let mut sum = rhs[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }
    let mut x = Array1::zeros(size);
    for i in (0..size).rev() {
        let mut sum = y[i];
        for k in i + 1..size {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    Ok(x)
}
