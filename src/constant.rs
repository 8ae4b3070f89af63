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

//! Format and encoder constants.

#![allow(dead_code)] // it's okay if some FLAC-spec constants are not used.

// Top-level constants first, and then sub-modules. Constants that are used
// only in a specific sub-module or its caller should be placed in the
// corresponding submodule.

/// Minimum length of a block supported by the stream encoder.
pub const MIN_BLOCK_SIZE: usize = 16;

/// Maximum length of a block (16-bit field storing `size - 1`).
pub const MAX_BLOCK_SIZE: usize = 65535;

/// Maximum number of channels.
pub const MAX_CHANNELS: usize = 8;

/// Minimum bits-per-sample supported.
pub const MIN_BITS_PER_SAMPLE: usize = 4;

/// Maximum bits-per-sample supported.
pub const MAX_BITS_PER_SAMPLE: usize = 24;

/// Maximum sample rate representable in STREAMINFO (20 bits).
pub const MAX_SAMPLE_RATE: usize = (1 << 20) - 1;

/// Maximum sample rate representable in a frame header.
pub const MAX_FRAME_HEADER_SAMPLE_RATE: usize = 655_350;

/// Sub-module containing constants related to build-time information.
pub mod build_info {
    pub const CRATE_VERSION: &str = match option_env!("CARGO_PKG_VERSION") {
        Some(v) => v,
        None => "unknown",
    };
}

/// Constants related to the container layout.
pub mod container {
    /// Stream marker "fLaC".
    pub const STREAM_MARKER: [u8; 4] = [0x66, 0x4C, 0x61, 0x43];

    /// Byte offset of the STREAMINFO body (after the marker and block header).
    pub const STREAM_INFO_OFFSET: u64 = 8;

    /// Size of STREAMINFO body in bytes.
    pub const STREAM_INFO_SIZE: usize = 34;

    /// Metadata block type tag for STREAMINFO.
    pub const STREAM_INFO_TYPE: u8 = 0;

    /// Maximum frame size representable in STREAMINFO (24 bits).
    pub const MAX_FRAME_SIZE: usize = (1 << 24) - 1;

    /// Maximum number of samples representable in STREAMINFO (36 bits).
    pub const MAX_TOTAL_SAMPLES: u64 = (1 << 36) - 1;
}

/// Constants related to fixed-parameter LPC encoding.
pub mod fixed {
    /// Maximum order of fixed LPC supported.
    pub const MAX_LPC_ORDER: usize = 4;

    /// Sample index from which prediction errors are compared.
    pub const ERROR_SUM_START: usize = 4;
}

/// Constants related to quantized linear predictive coding (QLPC).
pub mod qlpc {
    /// The number of bits used for encoding shift bits of QLPC.
    pub const SHIFT_BITS: usize = 5;

    /// The number of bits used for encoding the coefficient precision.
    pub const PRECISION_BITS: usize = 4;

    /// Maximum order of LPC. (32 in the specification.)
    pub const MAX_ORDER: usize = 32;

    /// Minimum precision accepted for QLPC coefficients.
    pub const MIN_PRECISION: usize = 5;

    /// Max number of bits (precision) for storing QLPC coefficients.
    pub const MAX_PRECISION: usize = 15;

    /// Maximum shift parameter of QLPC.
    pub const MAX_SHIFT: i8 = (1i8 << (SHIFT_BITS - 1)) - 1;

    /// Minimum shift parameter of QLPC before the quantizer gives up.
    pub const MIN_SHIFT: i8 = -(1i8 << (SHIFT_BITS - 1));

    /// Default maximum LPC order.
    pub const DEFAULT_MAX_ORDER: usize = 8;

    /// Alpha parameter of the Tukey analysis window.
    pub const TUKEY_ALPHA: f64 = 0.5;

    /// Block-size thresholds (inclusive) and the precisions chosen for them.
    pub const PRECISION_TABLE: [(usize, usize); 6] = [
        (192, 7),
        (384, 8),
        (576, 9),
        (1152, 10),
        (2304, 11),
        (4608, 12),
    ];

    /// Precision used for block sizes above the last threshold.
    pub const PRECISION_FOR_LARGE_BLOCKS: usize = 13;
}

/// Constants related to partitioned rice coding (PRC).
pub mod rice {
    /// Largest parameter storable with the 4-bit parameter method.
    pub const MAX_RICE_PARAMETER: usize = 14;

    /// Largest parameter storable with the 5-bit parameter method.
    pub const MAX_EXTENDED_RICE_PARAMETER: usize = 30;

    /// Sources wider than this use the extended parameter limit.
    pub const EXTENDED_PARAMETER_BPS_THRESHOLD: usize = 16;

    /// Maximum order of Rice parameter partitioning.
    pub const MAX_PARTITION_ORDER: usize = 15;

    /// Default maximum partition order.
    pub const DEFAULT_MAX_PARTITION_ORDER: usize = 5;
}

/// Module for internal error messages.
///
/// Use `panic!` and those messages only for unrecoverable internal errors.
pub(crate) mod panic_msg {
    pub const DATA_INCONSISTENT: &str = "INTERNAL ERROR: Internal variable inconsistency detected.";
}
