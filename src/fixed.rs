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

//! Fixed polynomial predictors (orders 0 to 4).

use super::constant::fixed::ERROR_SUM_START;
use super::constant::fixed::MAX_LPC_ORDER;

/// Coefficients of the fixed predictors, `coefs[order][j]` multiplies `x[t-1-j]`.
const FIXED_COEFS: [&[i64]; MAX_LPC_ORDER + 1] = [
    &[],
    &[1],
    &[2, -1],
    &[3, -3, 1],
    &[4, -6, 4, -1],
];

/// Returns the sums of absolute residuals for each order.
///
/// The order-0 residual is the signal itself; each higher order is the first
/// difference of the previous one. The order-`k` sum runs over the
/// differenced sequence from index `4 - k`, i.e. all orders are scored from
/// sample 4.
///
/// # Examples
///
/// ```
/// # use flacore::fixed::total_errors;
/// assert_eq!(total_errors(&[0, 1, 2, 3, 4]), [4, 1, 0, 0, 0]);
/// ```
pub fn total_errors(signal: &[i32]) -> [u64; MAX_LPC_ORDER + 1] {
    let mut ret = [0u64; MAX_LPC_ORDER + 1];
    let mut residual: Vec<i64> = signal.iter().map(|x| i64::from(*x)).collect();
    for (order, err) in ret.iter_mut().enumerate() {
        if order > 0 {
            for t in (1..residual.len()).rev() {
                residual[t] -= residual[t - 1];
            }
            if !residual.is_empty() {
                residual.remove(0);
            }
        }
        let start = std::cmp::min(ERROR_SUM_START - order, residual.len());
        *err = residual[start..].iter().map(|x| x.unsigned_abs()).sum();
    }
    ret
}

/// Selects the order with the smallest summed residual magnitude.
///
/// The lowest order whose error does not exceed any higher order's error is
/// chosen, so exact ties pick the lower order. Signals shorter than 5 samples
/// always use order 0.
///
/// # Examples
///
/// ```
/// # use flacore::fixed::select_order;
/// assert_eq!(select_order(&[0, 1, 2, 3, 4]), 2);
/// assert_eq!(select_order(&[7, 7, 7, 7, 7, 7]), 1);
/// assert_eq!(select_order(&[1, 2, 3]), 0);
/// ```
pub fn select_order(signal: &[i32]) -> usize {
    if signal.len() <= ERROR_SUM_START {
        return 0;
    }
    let errors = total_errors(signal);
    for order in 0..MAX_LPC_ORDER {
        let rest = errors[order + 1..].iter().min().copied().unwrap_or(u64::MAX);
        if errors[order] <= rest {
            return order;
        }
    }
    MAX_LPC_ORDER
}

/// Computes the prediction residual of the fixed predictor of `order`.
///
/// The returned vector has the same length as `signal`, and the first `order`
/// elements (warm-up) are zero. Returns `None` if a residual does not fit in
/// `i32`, or if `order` is not supported for the signal length.
///
/// # Examples
///
/// ```
/// # use flacore::fixed::residuals;
/// assert_eq!(residuals(&[1, 3, 6, 10, 15], 2), Some(vec![0, 0, 1, 1, 1]));
/// assert_eq!(residuals(&[i32::MAX, i32::MIN], 1), None);
/// ```
pub fn residuals(signal: &[i32], order: usize) -> Option<Vec<i32>> {
    if order > MAX_LPC_ORDER || order > signal.len() {
        return None;
    }
    let coefs = FIXED_COEFS[order];
    let mut ret = vec![0i32; signal.len()];
    for t in order..signal.len() {
        let mut pred = 0i64;
        for (j, c) in coefs.iter().enumerate() {
            pred += c * i64::from(signal[t - 1 - j]);
        }
        ret[t] = i32::try_from(i64::from(signal[t]) - pred).ok()?;
    }
    Some(ret)
}
