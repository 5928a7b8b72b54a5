//! Python bindings

use numpy::{Complex64, IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::prelude::*;

use crate::core::{correlation, phase_filter, range_filter::RangeFilter, RangeFilterParams};
use crate::types::SarError;

fn to_py_err(err: SarError) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", err))
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(goldstein_filter, m)?)?;
    m.add_function(wrap_pyfunction!(crosscorrelate, m)?)?;
    m.add_function(wrap_pyfunction!(range_filter_block, m)?)?;
    m.add_class::<PyCorrelationResult>()?;
    m.add_class::<PyRangeFilterStats>()?;
    Ok(())
}

#[pyclass(name = "CorrelationResult")]
struct PyCorrelationResult {
    #[pyo3(get)]
    coherence: f64,
    #[pyo3(get)]
    offset_l: f64,
    #[pyo3(get)]
    offset_p: f64,
}

#[pymethods]
impl PyCorrelationResult {
    fn __repr__(&self) -> String {
        format!(
            "CorrelationResult(coherence={:.4}, offset_l={:.4}, offset_p={:.4})",
            self.coherence, self.offset_l, self.offset_p
        )
    }
}

#[pyclass(name = "RangeFilterStats")]
struct PyRangeFilterStats {
    #[pyo3(get)]
    mean_shift: f64,
    #[pyo3(get)]
    mean_snr: f64,
    #[pyo3(get)]
    percent_not_filtered: f64,
}

/// Goldstein filter an interferogram with square blocks
#[pyfunction]
#[pyo3(signature = (data, alpha = 0.5, block_size = 32, overlap = 8))]
fn goldstein_filter<'py>(
    py: Python<'py>,
    data: PyReadonlyArray2<'py, Complex64>,
    alpha: f64,
    block_size: usize,
    overlap: usize,
) -> PyResult<&'py PyArray2<Complex64>> {
    let data = data.as_array().to_owned();
    let smoothing = [1.0 / 3.0; 3];
    let filtered = phase_filter::goldstein_2d(&data, block_size, overlap, Some(&smoothing), alpha)
        .map_err(to_py_err)?;
    Ok(filtered.into_pyarray(py))
}

/// Sub-pixel offset and coherence of two equally sized tiles
#[pyfunction]
#[pyo3(signature = (master, slave, ovs_factor = 16, acc_l = 8, acc_p = 8))]
fn crosscorrelate(
    master: PyReadonlyArray2<'_, Complex64>,
    slave: PyReadonlyArray2<'_, Complex64>,
    ovs_factor: usize,
    acc_l: usize,
    acc_p: usize,
) -> PyResult<PyCorrelationResult> {
    let master = master.as_array().to_owned();
    let slave = slave.as_array().to_owned();
    let result = correlation::crosscorrelate(&master, &slave, ovs_factor, acc_l, acc_p).map_err(to_py_err)?;
    Ok(PyCorrelationResult {
        coherence: result.coherence,
        offset_l: result.offset_l,
        offset_p: result.offset_p,
    })
}

/// Adaptive range filter of a master/slave block pair.
///
/// Returns the filtered master, filtered slave and filter statistics.
#[pyfunction]
#[pyo3(signature = (master, slave, rsr, rbw, nl_mean = 15, snr_threshold = 5.0, alpha_hamming = 0.75, ovs_factor = 1, do_weight_correl = false))]
#[allow(clippy::too_many_arguments)]
fn range_filter_block<'py>(
    py: Python<'py>,
    master: PyReadonlyArray2<'py, Complex64>,
    slave: PyReadonlyArray2<'py, Complex64>,
    rsr: f64,
    rbw: f64,
    nl_mean: usize,
    snr_threshold: f64,
    alpha_hamming: f64,
    ovs_factor: usize,
    do_weight_correl: bool,
) -> PyResult<(&'py PyArray2<Complex64>, &'py PyArray2<Complex64>, PyRangeFilterStats)> {
    let params = RangeFilterParams {
        nl_mean,
        snr_threshold,
        alpha_hamming,
        ovs_factor,
        do_weight_correl,
    };
    let mut filter =
        RangeFilter::from_rates(rsr, rbw, master.as_array().to_owned(), slave.as_array().to_owned(), params);
    let stats = filter.run().map_err(to_py_err)?;
    let (master, slave) = filter.into_data();
    Ok((
        master.into_pyarray(py),
        slave.into_pyarray(py),
        PyRangeFilterStats {
            mean_shift: stats.mean_shift,
            mean_snr: stats.mean_snr,
            percent_not_filtered: stats.percent_not_filtered,
        },
    ))
}
