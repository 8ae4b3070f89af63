// Copyright 2022-2024 Google LLC
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

use crate::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use crate::constant::qlpc::MAX_PRECISION as MAX_LPC_PRECISION;
use crate::constant::qlpc::MAX_SHIFT as MAX_LPC_SHIFT;
use crate::constant::qlpc::MIN_PRECISION as MIN_LPC_PRECISION;
use crate::constant::rice::MAX_EXTENDED_RICE_PARAMETER;
use crate::constant::MAX_CHANNELS;
use crate::constant::MAX_SAMPLE_RATE;
use crate::error::verify_range;
use crate::error::verify_true;
use crate::error::Verify;
use crate::error::VerifyError;
use crate::rice::is_valid_partition_order;

use super::datatype::ChannelAssignment;
use super::datatype::Constant;
use super::datatype::FixedLpc;
use super::datatype::Frame;
use super::datatype::FrameHeader;
use super::datatype::Lpc;
use super::datatype::Residual;
use super::datatype::StreamInfo;
use super::datatype::SubFrame;
use super::datatype::Verbatim;
use crate::lpc::QuantizedParameters;

// Some (internal) utility macros for value verification.
macro_rules! verify_block_size {
    ($varname:literal, $size:expr) => {
        verify_range!($varname, $size, 1..=(crate::constant::MAX_BLOCK_SIZE))
    };
}
pub(crate) use verify_block_size;

// Side channels need one extra bit, hence `MAX_BITS_PER_SAMPLE + 1`.
macro_rules! verify_bps {
    ($varname:literal, $bps:expr) => {
        verify_range!(
            $varname,
            $bps,
            (crate::constant::MIN_BITS_PER_SAMPLE)..=(crate::constant::MAX_BITS_PER_SAMPLE + 1)
        )
    };
}

macro_rules! verify_sample_range {
    ($varname:literal, $sample:expr, $bps:expr) => {{
        let min_sample = -(1i64 << ($bps as usize - 1));
        let max_sample = (1i64 << ($bps as usize - 1)) - 1;
        verify_range!($varname, i64::from($sample), min_sample..=max_sample)
    }};
}

impl Verify for StreamInfo {
    fn verify(&self) -> Result<(), VerifyError> {
        if self.total_samples() != 0 {
            verify_true!(
                "min_block_size",
                self.min_block_size() <= self.max_block_size(),
                "must be smaller than `max_block_size`"
            )?;
            verify_block_size!("min_block_size", self.min_block_size())?;
            verify_block_size!("max_block_size", self.max_block_size())?;
            verify_true!(
                "min_frame_size",
                self.min_frame_size() <= self.max_frame_size(),
                "must be smaller than `max_frame_size`"
            )?;
        }
        verify_range!("sample_rate", self.sample_rate(), ..=MAX_SAMPLE_RATE)?;
        verify_range!("channels", self.channels(), 1..=MAX_CHANNELS)?;
        verify_bps!("bits_per_sample", self.bits_per_sample())
    }
}

impl Verify for Frame {
    fn verify(&self) -> Result<(), VerifyError> {
        self.header().verify().map_err(|e| e.within("header"))?;
        verify_true!(
            "subframes.len",
            self.subframes().len() == self.header().channel_assignment().channels(),
            "must match to the channel assignment"
        )?;
        for (ch, sf) in self.subframes().iter().enumerate() {
            sf.verify()
                .map_err(|e| e.within(&format!("subframe[{ch}]")))?;
            verify_true!(
                "block_size",
                sf.block_size() == self.block_size(),
                "must be equal to the block size in the header"
            )
            .map_err(|e| e.within(&format!("subframe[{ch}]")))?;
        }
        Ok(())
    }
}

impl Verify for ChannelAssignment {
    fn verify(&self) -> Result<(), VerifyError> {
        match *self {
            Self::Independent(ch) => {
                verify_range!("Independent(ch)", ch as usize, 1..=MAX_CHANNELS)
            }
            Self::LeftSide | Self::RightSide | Self::MidSide => Ok(()),
        }
    }
}

impl Verify for FrameHeader {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_block_size!("block_size", self.block_size())?;
        verify_range!(
            "frame_number",
            self.frame_number(),
            ..=(crate::constant::container::MAX_TOTAL_SAMPLES >> 4)
        )?;
        self.channel_assignment()
            .verify()
            .map_err(|e| e.within("channel_assignment"))
    }
}

impl Verify for SubFrame {
    fn verify(&self) -> Result<(), VerifyError> {
        match self {
            Self::Verbatim(c) => c.verify(),
            Self::Constant(c) => c.verify(),
            Self::FixedLpc(c) => c.verify(),
            Self::Lpc(c) => c.verify(),
        }
    }
}

impl Verify for Constant {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_block_size!("block_size", self.block_size())?;
        verify_bps!("bits_per_sample", self.bits_per_sample())?;
        verify_sample_range!("dc_offset", self.dc_offset(), self.bits_per_sample())
    }
}

fn verify_wasted_bits(bits_per_sample: usize, wasted_bits: usize) -> Result<(), VerifyError> {
    verify_true!(
        "wasted_bits",
        wasted_bits < bits_per_sample,
        "must be smaller than bits_per_sample"
    )
}

impl Verify for Verbatim {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_block_size!("data.len", self.samples().len())?;
        verify_bps!("bits_per_sample", self.bits_per_sample())?;
        verify_wasted_bits(self.bits_per_sample(), self.wasted_bits())?;
        let effective_bps = self.bits_per_sample() - self.wasted_bits();
        for (t, v) in self.samples().iter().enumerate() {
            verify_sample_range!("data[{t}]", *v, effective_bps)?;
        }
        Ok(())
    }
}

impl Verify for FixedLpc {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_bps!("bits_per_sample", self.bits_per_sample())?;
        verify_wasted_bits(self.bits_per_sample(), self.wasted_bits())?;
        let effective_bps = self.bits_per_sample() - self.wasted_bits();
        for (t, v) in self.warm_up().iter().enumerate() {
            verify_sample_range!("warm_up[{t}]", *v, effective_bps)?;
        }
        verify_true!(
            "residual.warmup_length",
            self.residual().warmup_length() == self.order(),
            "must be equal to the predictor order"
        )?;
        self.residual()
            .verify()
            .map_err(|err| err.within("residual"))
    }
}

impl Verify for Lpc {
    fn verify(&self) -> Result<(), VerifyError> {
        self.parameters()
            .verify()
            .map_err(|err| err.within("parameters"))?;
        verify_bps!("bits_per_sample", self.bits_per_sample())?;
        verify_wasted_bits(self.bits_per_sample(), self.wasted_bits())?;
        let effective_bps = self.bits_per_sample() - self.wasted_bits();
        for (t, v) in self.warm_up().iter().enumerate() {
            verify_sample_range!("warm_up[{t}]", *v, effective_bps)?;
        }
        verify_true!(
            "residual.warmup_length",
            self.residual().warmup_length() == self.order(),
            "must be equal to the predictor order"
        )?;
        self.residual()
            .verify()
            .map_err(|err| err.within("residual"))
    }
}

impl Verify for QuantizedParameters {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!("order", self.order(), 1..=MAX_LPC_ORDER)?;
        verify_range!("shift", self.shift(), 0..=MAX_LPC_SHIFT)?;
        verify_range!(
            "precision",
            self.precision(),
            MIN_LPC_PRECISION..=MAX_LPC_PRECISION
        )?;
        let max_coef = (1i32 << (self.precision() - 1)) - 1;
        let min_coef = -(1i32 << (self.precision() - 1));
        for (j, c) in self.coefs().iter().enumerate() {
            verify_range!("coefs[{j}]", i32::from(*c), min_coef..=max_coef)?;
        }
        Ok(())
    }
}

impl Verify for Residual {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_block_size!("block_size", self.block_size())?;
        verify_true!(
            "residuals.len",
            self.residuals().len() == self.block_size(),
            "must have the same length as the block size"
        )?;
        verify_true!(
            "partition_order",
            is_valid_partition_order(
                self.block_size(),
                self.warmup_length(),
                self.partition_order()
            ),
            "must divide the block into partitions longer than the warm-up"
        )?;
        verify_true!(
            "warmup_length",
            self.warmup_length() <= self.block_size(),
            "must not exceed the block size"
        )?;
        for t in 0..self.warmup_length() {
            verify_true!(
                "residuals[{t}]",
                self.residuals()[t] == 0,
                "must be zero for warmup samples"
            )?;
        }
        for (p, rice_p) in self.rice_params().iter().enumerate() {
            verify_range!(
                "rice_params[{p}]",
                *rice_p as usize,
                ..=MAX_EXTENDED_RICE_PARAMETER
            )?;
        }
        Ok(())
    }
}
