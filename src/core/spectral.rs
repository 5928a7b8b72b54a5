//! FFT utilities on complex tiles
//!
//! Transforms run along one axis of an `ndarray` matrix (axis 0 = azimuth,
//! axis 1 = range) using `rustfft`. Inverse transforms are normalized by the
//! transform length so that `ifft(fft(x)) == x`.

use std::cell::RefCell;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayViewMut1, Axis};
use rustfft::{Fft, FftDirection, FftPlanner};

thread_local! {
    // the planner caches every plan it hands out
    static PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

/// Plan for a transform of `len` samples, shared per thread
pub fn plan(len: usize, direction: FftDirection) -> Arc<dyn Fft<f64>> {
    PLANNER.with(|planner| planner.borrow_mut().plan_fft(len, direction))
}

use crate::types::{ComplexMatrix, RealMatrix, SarComplex, SarError, SarResult};

fn run_lanes(data: &mut ComplexMatrix, axis: Axis, fft: Arc<dyn Fft<f64>>, scale: Option<f64>) {
    let len = data.len_of(axis);
    let mut buffer = vec![SarComplex::new(0.0, 0.0); len];
    for mut lane in data.lanes_mut(axis) {
        match lane.as_slice_mut() {
            Some(slice) => fft.process(slice),
            None => {
                for (b, v) in buffer.iter_mut().zip(lane.iter()) {
                    *b = *v;
                }
                fft.process(&mut buffer);
                for (v, b) in lane.iter_mut().zip(buffer.iter()) {
                    *v = *b;
                }
            }
        }
        if let Some(s) = scale {
            lane.mapv_inplace(|v| v * s);
        }
    }
}

/// Transform every lane along `axis` in place
pub fn transform_axis(data: &mut ComplexMatrix, axis: Axis, direction: FftDirection) {
    let len = data.len_of(axis);
    if len == 0 {
        return;
    }
    let fft = plan(len, direction);
    let scale = match direction {
        FftDirection::Forward => None,
        FftDirection::Inverse => Some(1.0 / len as f64),
    };
    run_lanes(data, axis, fft, scale);
}

pub fn fft_axis(data: &mut ComplexMatrix, axis: Axis) {
    transform_axis(data, axis, FftDirection::Forward);
}

pub fn ifft_axis(data: &mut ComplexMatrix, axis: Axis) {
    transform_axis(data, axis, FftDirection::Inverse);
}

/// Forward 2-D FFT in place
pub fn fft2d(data: &mut ComplexMatrix) {
    fft_axis(data, Axis(1));
    fft_axis(data, Axis(0));
}

/// Inverse 2-D FFT in place
pub fn ifft2d(data: &mut ComplexMatrix) {
    ifft_axis(data, Axis(1));
    ifft_axis(data, Axis(0));
}

fn rotate_lane<T: Clone>(mut lane: ArrayViewMut1<'_, T>, shift: usize) {
    let n = lane.len();
    if n == 0 || shift % n == 0 {
        return;
    }
    let copy: Vec<T> = lane.iter().cloned().collect();
    for (i, v) in lane.iter_mut().enumerate() {
        *v = copy[(i + n - shift % n) % n].clone();
    }
}

fn shift_2d<T: Clone>(data: &mut Array2<T>, forward: bool) {
    for axis in [Axis(0), Axis(1)] {
        let n = data.len_of(axis);
        let shift = if forward { n / 2 } else { n - n / 2 };
        for lane in data.lanes_mut(axis) {
            rotate_lane(lane, shift);
        }
    }
}

/// Move the zero-frequency bin to the centre (index `n/2`)
pub fn fftshift<T: Clone>(data: &mut Array2<T>) {
    shift_2d(data, true);
}

/// Inverse of [`fftshift`]: bring a centred spectrum back to FFT order
pub fn ifftshift<T: Clone>(data: &mut Array2<T>) {
    shift_2d(data, false);
}

/// [`ifftshift`] for vectors
pub fn ifftshift_vec<T: Clone>(v: &mut Array1<T>) {
    let n = v.len();
    rotate_lane(v.view_mut(), n - n / 2);
}

/// Index mapping of the input spectrum into an oversampled spectrum
fn oversample_lanes(data: &ComplexMatrix, axis: Axis, factor: usize) -> ComplexMatrix {
    let n = data.len_of(axis);
    if factor == 1 || n == 0 {
        return data.clone();
    }
    let m = n * factor;
    let mut shape = [data.nrows(), data.ncols()];
    shape[axis.index()] = m;

    let mut spectrum = data.clone();
    fft_axis(&mut spectrum, axis);

    let mut out = ComplexMatrix::zeros((shape[0], shape[1]));
    let half = n / 2;
    for (src, mut dst) in spectrum.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        // positive frequencies
        for k in 0..(n + 1) / 2 {
            dst[k] = src[k];
        }
        // negative frequencies
        for k in half + 1..n {
            dst[m - n + k] = src[k];
        }
        // split the Nyquist bin of even lengths
        if n % 2 == 0 {
            dst[half] = src[half] * 0.5;
            dst[m - half] = src[half] * 0.5;
        }
    }
    ifft_axis(&mut out, axis);
    out.mapv_inplace(|v| v * factor as f64);
    out
}

fn check_factor(factor: usize) -> SarResult<()> {
    if factor == 0 || !factor.is_power_of_two() {
        return Err(SarError::InvalidArgument(format!(
            "Oversampling factor must be a power of two >= 1, got {}",
            factor
        )));
    }
    Ok(())
}

/// Band-limited oversampling by zero padding in the frequency domain.
///
/// Output sample `(i * factor_l, j * factor_p)` equals input sample `(i, j)`.
pub fn oversample(data: &ComplexMatrix, factor_l: usize, factor_p: usize) -> SarResult<ComplexMatrix> {
    check_factor(factor_l)?;
    check_factor(factor_p)?;
    let ranged = oversample_lanes(data, Axis(1), factor_p);
    Ok(oversample_lanes(&ranged, Axis(0), factor_l))
}

/// [`oversample`] for real surfaces such as correlation maps
pub fn oversample_real(data: &RealMatrix, factor_l: usize, factor_p: usize) -> SarResult<RealMatrix> {
    let complex = data.mapv(|v| SarComplex::new(v, 0.0));
    Ok(oversample(&complex, factor_l, factor_p)?.mapv(|c| c.re))
}

/// Frequency axis `-fs/2 + i*fs/n`, centred order
pub fn frequency_axis(n: usize, sampling_rate: f64) -> Array1<f64> {
    let df = sampling_rate / n as f64;
    Array1::from_shape_fn(n, |i| -sampling_rate / 2.0 + i as f64 * df)
}

/// Position and value of the largest element
pub fn argmax(data: &RealMatrix) -> (usize, usize, f64) {
    let mut best = (0, 0, f64::NEG_INFINITY);
    for ((i, j), &v) in data.indexed_iter() {
        if v > best.2 {
            best = (i, j, v);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn test_tile(rows: usize, cols: usize) -> ComplexMatrix {
        Array2::from_shape_fn((rows, cols), |(i, j)| {
            SarComplex::new((i as f64 * 0.7).sin() + j as f64 * 0.1, (j as f64 * 1.3).cos())
        })
    }

    #[test]
    fn test_fft2d_round_trip() {
        let original = test_tile(8, 12);
        let mut data = original.clone();
        fft2d(&mut data);
        ifft2d(&mut data);
        for (a, b) in data.iter().zip(original.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-12);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_fft_axis_tone() {
        // one complex tone per column along azimuth
        let n = 16;
        let mut data = Array2::from_shape_fn((n, 3), |(i, _)| {
            SarComplex::from_polar(1.0, 2.0 * PI * 3.0 * i as f64 / n as f64)
        });
        fft_axis(&mut data, Axis(0));
        for j in 0..3 {
            assert_abs_diff_eq!(data[[3, j]].norm(), n as f64, epsilon = 1e-9);
            assert_abs_diff_eq!(data[[4, j]].norm(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_shift_round_trip() {
        let original = Array2::from_shape_fn((5, 6), |(i, j)| (i * 10 + j) as i32);
        let mut data = original.clone();
        fftshift(&mut data);
        assert_eq!(data[[2, 3]], 0);
        ifftshift(&mut data);
        assert_eq!(data, original);

        let mut v = Array1::from(vec![0, 1, 2, 3, 4]);
        ifftshift_vec(&mut v);
        assert_eq!(v, Array1::from(vec![2, 3, 4, 0, 1]));
    }

    #[test]
    fn test_oversample_keeps_samples() {
        let data = test_tile(8, 8);
        let ovs = oversample(&data, 2, 4).unwrap();
        assert_eq!(ovs.dim(), (16, 32));
        for ((i, j), v) in data.indexed_iter() {
            assert_abs_diff_eq!(ovs[[2 * i, 4 * j]].re, v.re, epsilon = 1e-10);
            assert_abs_diff_eq!(ovs[[2 * i, 4 * j]].im, v.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_oversample_interpolates_tone() {
        let n = 16;
        let tone = |x: f64| SarComplex::from_polar(1.0, 2.0 * PI * 2.0 * x / n as f64);
        let data = Array2::from_shape_fn((1, n), |(_, j)| tone(j as f64));
        let ovs = oversample(&data, 1, 2).unwrap();
        for j in 0..2 * n {
            let expected = tone(j as f64 / 2.0);
            assert_abs_diff_eq!(ovs[[0, j]].re, expected.re, epsilon = 1e-10);
            assert_abs_diff_eq!(ovs[[0, j]].im, expected.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_oversample_rejects_bad_factor() {
        let data = test_tile(4, 4);
        assert!(matches!(oversample(&data, 3, 1), Err(SarError::InvalidArgument(_))));
        assert!(oversample(&data, 0, 1).is_err());
    }

    #[test]
    fn test_frequency_axis_and_argmax() {
        let axis = frequency_axis(4, 100.0);
        assert_eq!(axis.to_vec(), vec![-50.0, -25.0, 0.0, 25.0]);

        let mut surface = RealMatrix::zeros((3, 4));
        surface[[2, 1]] = 5.0;
        assert_eq!(argmax(&surface), (2, 1, 5.0));
    }

    #[test]
    fn test_plans_are_reused() {
        let first = plan(48, FftDirection::Forward);
        let second = plan(48, FftDirection::Forward);
        assert!(std::ptr::eq(Arc::as_ptr(&first) as *const u8, Arc::as_ptr(&second) as *const u8));
    }
}
