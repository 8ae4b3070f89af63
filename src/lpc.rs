// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Algorithms for quantized linear-prediction coding (QLPC).

use std::collections::BTreeMap;
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::constant::panic_msg;
use super::constant::qlpc::MAX_ORDER;
use super::constant::qlpc::MAX_PRECISION;
use super::constant::qlpc::MAX_SHIFT;
use super::constant::qlpc::MIN_PRECISION;
use super::constant::qlpc::MIN_SHIFT;
use super::constant::qlpc::TUKEY_ALPHA;
use super::error::UnrepresentableLpcError;
use super::reusable;
use super::reuse;

/// Computes the Tukey window of length `len`.
///
/// Samples in `[alpha * (len - 1) / 2, (len - 1) * (1 - alpha / 2))` have the
/// weight 1, and the remaining samples are raised-cosine tapers.
pub fn tukey(len: usize, alpha: f64) -> Vec<f64> {
    if len <= 1 || alpha <= 0.0 {
        return vec![1.0f64; len];
    }
    let max_t = len as f64 - 1.0;
    let alpha_len = alpha * max_t;
    let mut ret = Vec::with_capacity(len);
    for t in 0..len {
        let t = t as f64;
        let w = if t < alpha_len / 2.0 {
            0.5 * (1.0 - (2.0 * std::f64::consts::PI * t / alpha_len).cos())
        } else if t < max_t - alpha_len / 2.0 {
            1.0
        } else {
            0.5 * (1.0 - (2.0 * std::f64::consts::PI * (max_t - t) / alpha_len).cos())
        };
        ret.push(w);
    }
    ret
}

reusable!(WINDOW_CACHE: BTreeMap<usize, Rc<[f64]>>);

/// Returns the analysis window for blocks of `len` samples.
fn get_window(len: usize) -> Rc<[f64]> {
    reuse!(WINDOW_CACHE, |cache: &mut BTreeMap<usize, Rc<[f64]>>| {
        Rc::clone(
            cache
                .entry(len)
                .or_insert_with(|| Rc::from(tukey(len, TUKEY_ALPHA))),
        )
    })
}

/// Computes auto-correlation coefficients for lags `0..dest.len()`.
///
/// # Examples
///
/// ```
/// # use flacore::lpc::auto_correlation;
/// let mut dest = [0.0; 3];
/// auto_correlation(&[1.0, 2.0, 3.0], &mut dest);
/// assert_eq!(dest, [14.0, 8.0, 3.0]);
/// ```
pub fn auto_correlation(signal: &[f64], dest: &mut [f64]) {
    for (lag, d) in dest.iter_mut().enumerate() {
        *d = if lag < signal.len() {
            signal[lag..]
                .iter()
                .zip(signal)
                .map(|(x, y)| x * y)
                .sum()
        } else {
            0.0
        };
    }
}

/// Unquantized predictor of a specific order.
#[derive(Clone, Debug, PartialEq)]
pub struct LpcModel {
    /// `coefs[j]` is multiplied with `x[t - 1 - j]`.
    pub coefs: Vec<f64>,
    /// Prediction error energy.
    pub error: f64,
}

impl LpcModel {
    /// Returns the order of the predictor.
    pub fn order(&self) -> usize {
        self.coefs.len()
    }
}

/// Runs Levinson-Durbin recursion and returns models for order `1..`.
///
/// The recursion stops at `max_order`, when the error does not strictly
/// decrease, or after the error becomes zero. `autoc` must contain at least
/// `max_order + 1` lags.
///
/// # Examples
///
/// ```
/// # use flacore::lpc::levinson_durbin;
/// let models = levinson_durbin(&[1.0, 0.5, 0.0], 2);
/// assert_eq!(models.len(), 2);
/// assert_eq!(models[0].coefs, vec![0.5]);
/// assert!((models[1].coefs[0] - 2.0 / 3.0).abs() < 1e-12);
/// assert!((models[1].coefs[1] + 1.0 / 3.0).abs() < 1e-12);
/// ```
pub fn levinson_durbin(autoc: &[f64], max_order: usize) -> Vec<LpcModel> {
    let max_order = std::cmp::min(max_order, autoc.len().saturating_sub(1));
    let mut ret: Vec<LpcModel> = Vec::with_capacity(max_order);
    let mut lpc: Vec<f64> = Vec::with_capacity(max_order);
    let mut err = autoc.first().copied().unwrap_or(0.0);

    for i in 0..max_order {
        if err <= 0.0 {
            break;
        }
        let mut acc = autoc[i + 1];
        for j in 0..i {
            acc -= lpc[j] * autoc[i - j];
        }
        let k = acc / err;
        let next_err = (err * k.mul_add(-k, 1.0)).max(0.0);
        // also rejects NaN
        if !(next_err < err) {
            break;
        }

        let prev = lpc.clone();
        for j in 0..i {
            lpc[j] = k.mul_add(-prev[i - 1 - j], prev[j]);
        }
        lpc.push(k);
        err = next_err;
        ret.push(LpcModel {
            coefs: lpc.clone(),
            error: err,
        });
    }
    ret
}

/// Computes candidate predictors of orders up to `max_order` for `signal`.
///
/// The signal is weighted with a Tukey window before computing the
/// auto-correlation. If `signal` is too short, the auto-correlation vanishes,
/// or the recursion yields no model, a single order-1 model with the
/// coefficient 0 is returned.
pub fn estimate_models(signal: &[i32], max_order: usize) -> Vec<LpcModel> {
    let max_order = std::cmp::min(max_order, MAX_ORDER);
    let fallback = || {
        vec![LpcModel {
            coefs: vec![0.0],
            error: 0.0,
        }]
    };
    if max_order == 0 || signal.len() < max_order + 1 {
        return fallback();
    }
    let window = get_window(signal.len());
    let windowed: Vec<f64> = signal
        .iter()
        .zip(window.iter())
        .map(|(x, w)| f64::from(*x) * w)
        .collect();
    let mut autoc = vec![0.0f64; max_order + 1];
    auto_correlation(&windowed, &mut autoc);
    if autoc.iter().all(|r| *r == 0.0) {
        return fallback();
    }
    let models = levinson_durbin(&autoc, max_order);
    if models.is_empty() {
        return fallback();
    }
    models
}

/// Estimates residual bits per sample from the prediction error energy.
#[inline]
fn expected_bits_per_residual(error: f64, total_samples: usize) -> f64 {
    let error_scale = 0.5 / total_samples as f64;
    let ln2 = std::f64::consts::LN_2;
    if error > 0.0 {
        let bits = 0.5 * (error_scale * error * ln2 * ln2).log2();
        bits.max(0.0)
    } else {
        0.0
    }
}

/// Picks the model order with the smallest estimated subframe size.
///
/// The estimate is `(n - order) * bits_per_residual + order * (bps + precision)`.
/// A model whose error is exactly zero is returned immediately. Ties go to
/// the lower order.
pub fn estimate_best_order(
    models: &[LpcModel],
    total_samples: usize,
    bits_per_sample: usize,
    precision: usize,
) -> usize {
    let mut best_order = models.first().map_or(1, LpcModel::order);
    let mut best_bits = f64::INFINITY;
    for model in models {
        let order = model.order();
        if model.error == 0.0 {
            return order;
        }
        let residual_samples = total_samples.saturating_sub(order) as f64;
        let bits = expected_bits_per_residual(model.error, total_samples)
            .mul_add(residual_samples, (order * (bits_per_sample + precision)) as f64);
        if bits < best_bits {
            best_bits = bits;
            best_order = order;
        }
    }
    best_order
}

/// Quantized LPC coefficients.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct QuantizedParameters {
    coefs: heapless::Vec<i16, MAX_ORDER>,
    shift: i8,
    precision: usize,
}

impl QuantizedParameters {
    /// Constructs `QuantizedParameters` from already quantized values.
    ///
    /// # Panics
    ///
    /// Panics if `coefs` is longer than the maximum LPC order.
    pub fn from_parts(coefs: &[i16], shift: i8, precision: usize) -> Self {
        let coefs = heapless::Vec::from_slice(coefs).expect(panic_msg::DATA_INCONSISTENT);
        Self {
            coefs,
            shift,
            precision,
        }
    }

    /// Quantizes `coefs` into `precision`-bit integers.
    ///
    /// The shift is `(precision - 1) - floor(log2(max |coef|)) - 1`, capped at
    /// 15. Negative shifts are realized by dividing the coefficients, and the
    /// stored shift becomes 0. Rounding errors are carried over to the next
    /// coefficient.
    ///
    /// # Errors
    ///
    /// Returns `UnrepresentableLpcError` if the required shift is below -16.
    ///
    /// # Panics
    ///
    /// Panics if `coefs` is longer than the maximum LPC order or if `precision`
    /// is not supported.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::lpc::QuantizedParameters;
    /// let qp = QuantizedParameters::with_coefs(&[0.3, 0.3, 0.3], 5).unwrap();
    /// assert_eq!(qp.shift(), 5);
    /// assert_eq!(qp.coefs(), vec![10, 9, 10]);
    /// ```
    pub fn with_coefs(coefs: &[f64], precision: usize) -> Result<Self, UnrepresentableLpcError> {
        assert!((MIN_PRECISION..=MAX_PRECISION).contains(&precision));
        assert!(coefs.len() <= MAX_ORDER);
        let cmax = coefs.iter().fold(0.0f64, |acc, c| acc.max(c.abs()));
        let qmax = (1i32 << (precision - 1)) - 1;
        let qmin = -(1i32 << (precision - 1));

        if cmax <= 0.0 {
            let zeros = vec![0i16; coefs.len()];
            return Ok(Self::from_parts(&zeros, 0, precision));
        }

        let log2cmax = cmax.log2().floor() as i32;
        let shift = std::cmp::min(
            (precision as i32 - 1) - log2cmax - 1,
            i32::from(MAX_SHIFT),
        );
        if shift < i32::from(MIN_SHIFT) {
            return Err(UnrepresentableLpcError::new(shift));
        }

        let scale = 2.0f64.powi(shift);
        let mut q_coefs: heapless::Vec<i16, MAX_ORDER> = heapless::Vec::new();
        let mut error = 0.0f64;
        for c in coefs {
            error = c.mul_add(scale, error);
            let q = (error.round() as i32).clamp(qmin, qmax);
            error -= f64::from(q);
            q_coefs
                .push(q as i16)
                .expect(panic_msg::DATA_INCONSISTENT);
        }
        Ok(Self {
            coefs: q_coefs,
            shift: std::cmp::max(shift, 0) as i8,
            precision,
        })
    }

    /// Returns the order of LPC specified by this parameter.
    pub fn order(&self) -> usize {
        self.coefs.len()
    }

    /// Returns precision.
    pub const fn precision(&self) -> usize {
        self.precision
    }

    /// Returns the shift parameter.
    pub const fn shift(&self) -> i8 {
        self.shift
    }

    /// Returns an individual coefficient in quantized form.
    pub fn coef(&self, idx: usize) -> i16 {
        self.coefs[idx]
    }

    /// Returns `Vec` containing quantized coefficients.
    pub fn coefs(&self) -> Vec<i16> {
        self.coefs.to_vec()
    }

    /// Returns dequantized coefficients.
    pub fn dequantized(&self) -> Vec<f64> {
        let scale = 2.0f64.powi(-i32::from(self.shift));
        self.coefs.iter().map(|c| f64::from(*c) * scale).collect()
    }

    /// Computes the prediction residual for `signal`.
    ///
    /// The returned vector has the same length as `signal` and starts with
    /// `order` zeros. Returns `None` if a residual does not fit in `i32` or if
    /// `signal` is shorter than the order.
    pub fn compute_residuals(&self, signal: &[i32]) -> Option<Vec<i32>> {
        let order = self.order();
        if signal.len() < order {
            return None;
        }
        let mut ret = vec![0i32; signal.len()];
        for t in order..signal.len() {
            let mut pred = 0i64;
            for (j, c) in self.coefs.iter().enumerate() {
                pred += i64::from(*c) * i64::from(signal[t - 1 - j]);
            }
            let pred = pred >> self.shift;
            ret[t] = i32::try_from(i64::from(signal[t]) - pred).ok()?;
        }
        Some(ret)
    }
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery, clippy::needless_range_loop)]
mod tests {
    use super::*;
    use crate::assert_close;
    use crate::test_helper;

    use rstest::rstest;
    use std::f64::consts::PI;

    #[test]
    fn auto_correlation_computation() {
        let mut signal = [0f64; 128];
        for t in 0..signal.len() {
            signal[t] = (t as f64 / 32.0 * 2.0 * PI).sin() * 1024.0;
        }
        let mut corr = [0f64; 32];
        auto_correlation(&signal, &mut corr);

        let mut max_corr: f64 = 0.0;
        let mut min_corr: f64 = 0.0;
        let mut argmax_corr: usize = 0;
        let mut argmin_corr: usize = 0;
        for t in 0..32 {
            if corr[t] > max_corr {
                argmax_corr = t;
                max_corr = corr[t];
            }
            if corr[t] < min_corr {
                argmin_corr = t;
                min_corr = corr[t];
            }
        }
        assert_eq!(argmax_corr, 0);
        assert_eq!(argmin_corr, 16);
    }

    #[test]
    fn tukey_window() {
        // reference computed with scipy as `scipy.signal.windows.tukey(32, 0.3)`.
        let reference = [
            0., 0.1098376, 0.39109322, 0.720197, 0.95255725, 1., 1., 1., 1., 1., 1., 1., 1., 1.,
            1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 1., 0.95255725, 0.720197, 0.39109322,
            0.1098376, 0.,
        ];
        let win_vec = tukey(reference.len(), 0.3);
        for (t, &expected_w) in reference.iter().enumerate() {
            assert_close!(win_vec[t], expected_w);
        }
        assert_eq!(tukey(1, 0.5), vec![1.0]);
        assert!(tukey(0, 0.5).is_empty());
    }

    #[test]
    fn window_cache_returns_same_weights() {
        let w1 = get_window(100);
        let w2 = get_window(100);
        assert!(Rc::ptr_eq(&w1, &w2));
        assert_eq!(&*w1, tukey(100, TUKEY_ALPHA).as_slice());
    }

    #[test]
    fn levinson_stops_when_error_stalls() {
        // auto-correlation of an AR(1) process with the coefficient 0.5.
        let models = levinson_durbin(&[1.0, 0.5, 0.25, 0.125], 3);
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].coefs, vec![0.5]);
        assert_close!(models[0].error, 0.75f64);
    }

    #[test]
    fn levinson_errors_decrease() {
        let signal = test_helper::sinusoid_plus_noise(1024, 32, 10000.0, 64);
        let windowed: Vec<f64> = signal.iter().map(|x| f64::from(*x)).collect();
        let mut autoc = vec![0.0; 13];
        auto_correlation(&windowed, &mut autoc);
        let models = levinson_durbin(&autoc, 12);
        assert!(!models.is_empty());
        let mut prev = autoc[0];
        for (i, m) in models.iter().enumerate() {
            assert_eq!(m.order(), i + 1);
            assert!(m.error < prev);
            prev = m.error;
        }
    }

    #[test]
    fn degenerate_inputs_fall_back_to_zero_predictor() {
        let expected = vec![LpcModel {
            coefs: vec![0.0],
            error: 0.0,
        }];
        assert_eq!(estimate_models(&[0; 64], 8), expected);
        assert_eq!(estimate_models(&[1, 2, 3], 8), expected);
        assert_eq!(estimate_models(&[1, 2, 3], 0), expected);
    }

    #[test]
    fn heuristic_order_prefers_cheaper_models() {
        let models = vec![
            LpcModel {
                coefs: vec![0.5],
                error: 1e6,
            },
            LpcModel {
                coefs: vec![0.5, 0.1],
                error: 1e3,
            },
            LpcModel {
                coefs: vec![0.5, 0.1, 0.01],
                error: 999.0,
            },
        ];
        assert_eq!(estimate_best_order(&models, 4096, 16, 12), 2);

        let models = vec![
            LpcModel {
                coefs: vec![0.5],
                error: 10.0,
            },
            LpcModel {
                coefs: vec![0.5, 0.1],
                error: 0.0,
            },
        ];
        assert_eq!(estimate_best_order(&models, 64, 16, 12), 2);
    }

    #[test]
    fn parameter_quantizer() {
        let qp = QuantizedParameters::with_coefs(&[1.0, -0.5, 0.5], 5).unwrap();
        assert_eq!(qp.shift(), 3);
        assert_eq!(qp.coefs(), vec![8, -4, 4]);
        assert_eq!(qp.dequantized(), vec![1.0, -0.5, 0.5]);

        let qp = QuantizedParameters::with_coefs(&[0.0, 0.0], 12).unwrap();
        assert_eq!(qp.shift(), 0);
        assert_eq!(qp.coefs(), vec![0, 0]);

        let qp = QuantizedParameters::with_coefs(&[1e-9], 15).unwrap();
        assert_eq!(qp.shift(), 15);
    }

    #[test]
    fn negative_shift_divides_coefficients() {
        let qp = QuantizedParameters::with_coefs(&[1000.0], 5).unwrap();
        assert_eq!(qp.shift(), 0);
        assert_eq!(qp.coefs(), vec![15]);

        let qp = QuantizedParameters::with_coefs(&[1.0e6], 5).unwrap();
        assert_eq!(qp.shift(), 0);

        let err = QuantizedParameters::with_coefs(&[1.0e7], 5).unwrap_err();
        assert_eq!(err.shift(), -20);
    }

    #[rstest]
    fn quantization_stays_in_range(
        #[values(5, 8, 12, 15)] precision: usize,
        #[values(1e-6, 0.3, 1.9, 700.0, 65536.0)] scale: f64,
    ) {
        let coefs: Vec<f64> = (0..12).map(|i| ((i * 7 % 5) as f64 - 2.0) * scale).collect();
        let qp = QuantizedParameters::with_coefs(&coefs, precision).unwrap();
        assert!((0..=15).contains(&qp.shift()));
        let limit = 1i32 << (precision - 1);
        for c in qp.coefs() {
            assert!(-limit <= i32::from(c) && i32::from(c) < limit);
        }
    }

    #[rstest]
    fn qlpc_recovery(#[values(2, 12, 24)] lpc_order: usize) {
        let coef_prec: usize = 12;
        let signal = test_helper::sinusoid_plus_noise(1024, 32, 30000.0, 128);

        let models = estimate_models(&signal, lpc_order);
        let model = models.last().unwrap();
        let qlpc = QuantizedParameters::with_coefs(&model.coefs, coef_prec).unwrap();
        let order = qlpc.order();
        let errors = qlpc.compute_residuals(&signal).unwrap();

        let mut signal_energy = 0.0f64;
        let mut error_energy = 0.0f64;
        for t in order..signal.len() {
            signal_energy += signal[t] as f64 * signal[t] as f64;
            error_energy += errors[t] as f64 * errors[t] as f64;
        }
        // expect some prediction efficiency.
        assert!(error_energy < signal_energy);

        for t in order..signal.len() {
            let mut pred: i64 = 0;
            for (tau, ref_qcoef) in qlpc.coefs().iter().enumerate() {
                pred += i64::from(signal[t - tau - 1]) * i64::from(*ref_qcoef)
            }
            pred >>= qlpc.shift();
            assert_eq!(errors[t] + (pred as i32), signal[t], "Failed at t={}", t);
        }
    }

    #[test]
    fn lpc_with_pure_dc() {
        let signal = [12345, 12345, 12345, 12345, 12345, 12345, 12345];
        let models = estimate_models(&signal, 1);
        assert_eq!(models.len(), 1);
        assert!(models[0].coefs[0] > 0.5);

        let qlpc = QuantizedParameters::with_coefs(&models[0].coefs, 15).unwrap();
        let errors = qlpc.compute_residuals(&signal).unwrap();
        for t in 1..errors.len() {
            assert!(errors[t].abs() < 12345);
        }
    }

    #[test]
    fn residual_overflow_is_reported() {
        let qlpc = QuantizedParameters::from_parts(&[-16384], 0, 15);
        assert_eq!(qlpc.compute_residuals(&[i32::MAX, i32::MAX]), None);
        assert_eq!(qlpc.compute_residuals(&[]), None);
        assert_eq!(qlpc.compute_residuals(&[7]), Some(vec![0]));
    }
}
