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

//! Encoder configuration structs.

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::constant::qlpc::DEFAULT_MAX_ORDER as QLPC_DEFAULT_MAX_ORDER;
use super::constant::qlpc::MAX_ORDER as QLPC_MAX_ORDER;
use super::constant::qlpc::MAX_PRECISION as QLPC_MAX_PRECISION;
use super::constant::qlpc::MIN_PRECISION as QLPC_MIN_PRECISION;
use super::constant::qlpc::PRECISION_FOR_LARGE_BLOCKS;
use super::constant::qlpc::PRECISION_TABLE;
use super::constant::rice::DEFAULT_MAX_PARTITION_ORDER;
use super::constant::rice::EXTENDED_PARAMETER_BPS_THRESHOLD;
use super::constant::rice::MAX_EXTENDED_RICE_PARAMETER;
use super::constant::rice::MAX_PARTITION_ORDER;
use super::constant::rice::MAX_RICE_PARAMETER;
use super::constant::MAX_BLOCK_SIZE;
use super::constant::MIN_BLOCK_SIZE;
use super::error::verify_range;
use super::error::verify_true;
use super::error::Verify;
use super::error::VerifyError;

/// Highest compression level accepted by [`EncodingOptions::preset`].
pub const MAX_PRESET_LEVEL: usize = 8;

/// Configuration for a single encoding session.
///
/// All fields are plain values so the struct can be (de)serialized and
/// edited in place. Use [`Verify::verify`] before handing a hand-edited
/// value to the encoder; the encoder itself rejects invalid options with
/// [`EncodeError::Config`].
///
/// [`EncodeError::Config`]: crate::error::EncodeError::Config
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[non_exhaustive]
pub struct EncodingOptions {
    /// Number of inter-channel samples per frame.
    pub block_size: usize,
    /// Maximum LPC order. Zero disables LPC.
    pub max_lpc_order: usize,
    /// Precision of quantized LPC coefficients.
    ///
    /// If `None`, the precision is derived from `block_size`.
    pub qlp_precision: Option<usize>,
    /// Enables the four-way stereo decorrelation search.
    pub mid_side: bool,
    /// Enables the two-way (independent or mid-side) stereo search.
    ///
    /// Ignored when `mid_side` is set.
    pub adaptive_mid_side: bool,
    /// Builds every candidate order instead of estimating the best one.
    pub exhaustive_model_search: bool,
    /// Minimum partition order of the residual coder.
    pub min_residual_partition_order: usize,
    /// Maximum partition order of the residual coder.
    pub max_residual_partition_order: usize,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            block_size: 4096,
            max_lpc_order: QLPC_DEFAULT_MAX_ORDER,
            qlp_precision: None,
            mid_side: true,
            adaptive_mid_side: false,
            exhaustive_model_search: false,
            min_residual_partition_order: 0,
            max_residual_partition_order: DEFAULT_MAX_PARTITION_ORDER,
        }
    }
}

impl EncodingOptions {
    /// Returns options corresponding to a compression level.
    ///
    /// Levels follow the conventional `0` (fastest) to `8` (smallest)
    /// scale of FLAC encoders.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if `level` is larger than 8.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::config::EncodingOptions;
    /// let fast = EncodingOptions::preset(0).unwrap();
    /// assert_eq!(fast.max_lpc_order, 0);
    /// assert_eq!(fast.block_size, 1152);
    ///
    /// let best = EncodingOptions::preset(8).unwrap();
    /// assert!(best.exhaustive_model_search);
    /// assert!(EncodingOptions::preset(9).is_err());
    /// ```
    pub fn preset(level: usize) -> Result<Self, VerifyError> {
        verify_range!("level", level, ..= MAX_PRESET_LEVEL)?;
        // (block_size, max_lpc_order, mid_side, adaptive_mid_side, max_partition_order)
        let (block_size, max_lpc_order, mid_side, adaptive_mid_side, max_partition_order) =
            match level {
                0 => (1152, 0, false, false, 3),
                1 => (1152, 0, false, true, 3),
                2 => (1152, 0, true, false, 3),
                3 => (4096, 6, false, false, 4),
                4 => (4096, 8, false, true, 4),
                5 => (4096, 8, true, false, 5),
                6 => (4096, 8, true, false, 6),
                _ => (4096, 12, true, false, 6),
            };
        Ok(Self {
            block_size,
            max_lpc_order,
            qlp_precision: None,
            mid_side,
            adaptive_mid_side,
            exhaustive_model_search: level == MAX_PRESET_LEVEL,
            min_residual_partition_order: 0,
            max_residual_partition_order: max_partition_order,
        })
    }

    /// Returns the effective precision for quantized LPC coefficients.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::config::EncodingOptions;
    /// let mut opts = EncodingOptions::default();
    /// assert_eq!(opts.qlp_precision(), 12);
    /// opts.block_size = 192;
    /// assert_eq!(opts.qlp_precision(), 7);
    /// opts.qlp_precision = Some(15);
    /// assert_eq!(opts.qlp_precision(), 15);
    /// ```
    pub fn qlp_precision(&self) -> usize {
        self.qlp_precision.unwrap_or_else(|| {
            PRECISION_TABLE
                .iter()
                .find(|(threshold, _)| self.block_size <= *threshold)
                .map_or(PRECISION_FOR_LARGE_BLOCKS, |(_, precision)| *precision)
        })
    }

    /// Returns the largest Rice parameter usable for the source bit depth.
    pub const fn max_rice_parameter(bits_per_sample: usize) -> usize {
        if bits_per_sample <= EXTENDED_PARAMETER_BPS_THRESHOLD {
            MAX_RICE_PARAMETER
        } else {
            MAX_EXTENDED_RICE_PARAMETER
        }
    }

    /// Returns `true` if any stereo decorrelation is enabled.
    pub const fn stereo_search_enabled(&self) -> bool {
        self.mid_side || self.adaptive_mid_side
    }
}

impl Verify for EncodingOptions {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!("block_size", self.block_size, MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE)?;
        verify_range!("max_lpc_order", self.max_lpc_order, ..= QLPC_MAX_ORDER)?;
        if let Some(precision) = self.qlp_precision {
            verify_range!(
                "qlp_precision",
                precision,
                QLPC_MIN_PRECISION..=QLPC_MAX_PRECISION
            )?;
        }
        verify_range!(
            "max_residual_partition_order",
            self.max_residual_partition_order,
            ..= MAX_PARTITION_ORDER
        )?;
        verify_true!(
            "min_residual_partition_order",
            self.min_residual_partition_order <= self.max_residual_partition_order,
            "must not exceed `max_residual_partition_order`"
        )?;
        Ok(())
    }
}
