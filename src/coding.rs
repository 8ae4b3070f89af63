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

//! Controller connecting coding algorithms.

#[cfg(feature = "log")]
use log::warn;

use super::arrayutils::common_trailing_zeros;
use super::arrayutils::is_constant;
use super::component::BitRepr;
use super::component::ChannelAssignment;
use super::component::Constant;
use super::component::FixedLpc;
use super::component::Frame;
use super::component::FrameHeader;
use super::component::Lpc;
use super::component::Residual;
use super::component::StreamInfo;
use super::component::SubFrame;
use super::component::Verbatim;
use super::config::EncodingOptions;
use super::constant::fixed::MAX_LPC_ORDER as MAX_FIXED_ORDER;
use super::constant::panic_msg;
use super::error::EncodeError;
use super::fixed;
use super::lpc;
use super::lpc::LpcModel;
use super::lpc::QuantizedParameters;
use super::rice;
use super::source::FrameBuf;

/// Constructs `Residual` component given the error signal.
///
/// `errors` has the full block length and starts with `warmup_length` zeros.
pub fn encode_residual(
    options: &EncodingOptions,
    errors: Vec<i32>,
    warmup_length: usize,
    max_rice_parameter: usize,
) -> Residual {
    let prc_p = rice::find_partitioned_rice_parameter(
        &errors,
        warmup_length,
        options.min_residual_partition_order,
        options.max_residual_partition_order,
        max_rice_parameter,
    );
    Residual::from_parts(
        prc_p.order as u8,
        errors.len(),
        warmup_length,
        prc_p.ps,
        errors,
    )
}

/// Shape of the subframe being encoded.
#[derive(Clone, Copy, Debug)]
struct SubFrameShape {
    bits_per_sample: usize,
    wasted_bits: usize,
    max_rice_parameter: usize,
}

impl SubFrameShape {
    const fn effective_bits_per_sample(&self) -> usize {
        self.bits_per_sample - self.wasted_bits
    }
}

/// Builds a fixed-predictor subframe of the given order.
///
/// Returns `None` if a residual does not fit in `i32`.
fn fixed_subframe(
    options: &EncodingOptions,
    signal: &[i32],
    order: usize,
    shape: SubFrameShape,
) -> Option<FixedLpc> {
    let errors = fixed::residuals(signal, order)?;
    let residual = encode_residual(options, errors, order, shape.max_rice_parameter);
    let warm_up = heapless::Vec::from_slice(&signal[..order]).expect(panic_msg::DATA_INCONSISTENT);
    Some(FixedLpc::from_parts(
        warm_up,
        residual,
        shape.bits_per_sample as u8,
        shape.wasted_bits as u8,
    ))
}

/// Returns the fixed-predictor candidate for `signal`.
///
/// Without exhaustive search, the order is chosen by [`fixed::select_order`].
fn fixed_lpc(options: &EncodingOptions, signal: &[i32], shape: SubFrameShape) -> Option<FixedLpc> {
    if options.exhaustive_model_search {
        let max_order = std::cmp::min(MAX_FIXED_ORDER, signal.len());
        let mut best: Option<(usize, FixedLpc)> = None;
        for order in 0..=max_order {
            let Some(candidate) = fixed_subframe(options, signal, order, shape) else {
                continue;
            };
            let bits = candidate.count_bits();
            if best.as_ref().map_or(true, |(min_bits, _)| bits < *min_bits) {
                best = Some((bits, candidate));
            }
        }
        best.map(|(_, subframe)| subframe)
    } else {
        let order = fixed::select_order(signal);
        fixed_subframe(options, signal, order, shape).or_else(|| {
            #[cfg(feature = "log")]
            warn!("fixed predictor of order {order} overflowed; falling back to order 0");
            fixed_subframe(options, signal, 0, shape)
        })
    }
}

/// Quantizes `model` and builds an LPC subframe with it.
///
/// Returns `None` if the coefficients cannot be quantized or the residual
/// overflows.
fn lpc_subframe(
    options: &EncodingOptions,
    signal: &[i32],
    model: &LpcModel,
    shape: SubFrameShape,
) -> Option<Lpc> {
    let params = match QuantizedParameters::with_coefs(&model.coefs, options.qlp_precision()) {
        Ok(params) => params,
        Err(_e) => {
            #[cfg(feature = "log")]
            warn!(
                "dropped LPC candidate of order {}: {_e}",
                model.order()
            );
            return None;
        }
    };
    let order = params.order();
    let Some(errors) = params.compute_residuals(signal) else {
        #[cfg(feature = "log")]
        warn!("dropped LPC candidate of order {order}: residual overflow");
        return None;
    };
    let residual = encode_residual(options, errors, order, shape.max_rice_parameter);
    let warm_up = heapless::Vec::from_slice(&signal[..order]).expect(panic_msg::DATA_INCONSISTENT);
    Some(Lpc::from_parts(
        warm_up,
        params,
        residual,
        shape.bits_per_sample as u8,
        shape.wasted_bits as u8,
    ))
}

/// Estimates LPC models for `signal` and returns the best candidate.
///
/// With exhaustive search every estimated order is built and the smallest
/// encoding is kept; otherwise the order is estimated from the prediction
/// errors.
fn estimated_qlpc(options: &EncodingOptions, signal: &[i32], shape: SubFrameShape) -> Option<Lpc> {
    let models = lpc::estimate_models(signal, options.max_lpc_order);
    if options.exhaustive_model_search {
        let mut best: Option<(usize, Lpc)> = None;
        for model in &models {
            let Some(candidate) = lpc_subframe(options, signal, model, shape) else {
                continue;
            };
            let bits = candidate.count_bits();
            if best.as_ref().map_or(true, |(min_bits, _)| bits < *min_bits) {
                best = Some((bits, candidate));
            }
        }
        best.map(|(_, subframe)| subframe)
    } else {
        let order = lpc::estimate_best_order(
            &models,
            signal.len(),
            shape.effective_bits_per_sample(),
            options.qlp_precision(),
        );
        let model = models.iter().find(|m| m.order() == order)?;
        lpc_subframe(options, signal, model, shape)
    }
}

/// Finds the best method to encode the given samples, and returns `SubFrame`.
///
/// Constant blocks always become [`Constant`]. Otherwise, common trailing
/// zeros are removed, and fixed and LPC candidates replace the verbatim
/// encoding only if they are strictly smaller.
///
/// # Examples
///
/// ```
/// # use flacore::coding::encode_subframe;
/// # use flacore::component::SubFrame;
/// # use flacore::config::EncodingOptions;
/// let opts = EncodingOptions::default();
/// let subframe = encode_subframe(&opts, &[7; 64], 16, 14);
/// assert!(matches!(subframe, SubFrame::Constant(_)));
///
/// let ramp: Vec<i32> = (0..64).map(|t| t * 4).collect();
/// let subframe = encode_subframe(&opts, &ramp, 16, 14);
/// assert_eq!(subframe.wasted_bits(), 2);
/// ```
pub fn encode_subframe(
    options: &EncodingOptions,
    signal: &[i32],
    bits_per_sample: usize,
    max_rice_parameter: usize,
) -> SubFrame {
    if is_constant(signal) {
        let dc = signal.first().copied().unwrap_or(0);
        return Constant::from_parts(signal.len(), dc, bits_per_sample as u8).into();
    }

    let wasted_bits = common_trailing_zeros(signal) as usize;
    let samples: Vec<i32> = signal.iter().map(|v| v >> wasted_bits).collect();
    let shape = SubFrameShape {
        bits_per_sample,
        wasted_bits,
        max_rice_parameter,
    };

    let mut best: Option<SubFrame> = None;
    let mut min_bits =
        Verbatim::count_bits_from_metadata(samples.len(), bits_per_sample, wasted_bits);

    if let Some(fixed) = fixed_lpc(options, &samples, shape) {
        let bits = fixed.count_bits();
        if bits < min_bits {
            min_bits = bits;
            best = Some(fixed.into());
        }
    }

    if options.max_lpc_order > 0 {
        if let Some(lpc) = estimated_qlpc(options, &samples, shape) {
            if lpc.count_bits() < min_bits {
                best = Some(lpc.into());
            }
        }
    }

    best.unwrap_or_else(|| {
        Verbatim::from_parts(samples, bits_per_sample as u8, wasted_bits as u8).into()
    })
}

/// Candidate channel assignments for stereo frames.
///
/// Indices refer to the encoded `[left, right, mid, side]` subframes.
const STEREO_CANDIDATES: [(ChannelAssignment, usize, usize); 4] = [
    (ChannelAssignment::Independent(2), 0, 1),
    (ChannelAssignment::LeftSide, 0, 3),
    (ChannelAssignment::RightSide, 3, 1),
    (ChannelAssignment::MidSide, 2, 3),
];

/// Chooses a stereo channel assignment and returns the subframes for it.
fn encode_stereo(
    options: &EncodingOptions,
    left: &[i32],
    right: &[i32],
    bits_per_sample: usize,
    max_rice_parameter: usize,
) -> (ChannelAssignment, Vec<SubFrame>) {
    let mid: Vec<i32> = left
        .iter()
        .zip(right)
        .map(|(l, r)| (l + r) >> 1)
        .collect();
    let side: Vec<i32> = left.iter().zip(right).map(|(l, r)| l - r).collect();

    let mut subframes = [
        Some(encode_subframe(options, left, bits_per_sample, max_rice_parameter)),
        Some(encode_subframe(options, right, bits_per_sample, max_rice_parameter)),
        Some(encode_subframe(options, &mid, bits_per_sample, max_rice_parameter)),
        Some(encode_subframe(options, &side, bits_per_sample + 1, max_rice_parameter)),
    ];
    let bits: Vec<usize> = subframes
        .iter()
        .map(|sf| sf.as_ref().map_or(usize::MAX, BitRepr::count_bits))
        .collect();

    let mut best = 0;
    let mut min_bits = bits[0] + bits[1];
    for (idx, (ch_info, ch0, ch1)) in STEREO_CANDIDATES.iter().enumerate().skip(1) {
        if !options.mid_side && *ch_info != ChannelAssignment::MidSide {
            continue;
        }
        let candidate_bits = bits[*ch0] + bits[*ch1];
        if candidate_bits < min_bits {
            min_bits = candidate_bits;
            best = idx;
        }
    }

    let (ch_info, ch0, ch1) = STEREO_CANDIDATES[best];
    let first = subframes[ch0].take().expect(panic_msg::DATA_INCONSISTENT);
    let second = subframes[ch1].take().expect(panic_msg::DATA_INCONSISTENT);
    (ch_info, vec![first, second])
}

/// Finds the best configuration for encoding samples and returns a `Frame`.
///
/// Only the first `block_size` samples of each channel in `framebuf` are
/// encoded. Stereo decorrelation is applied only to two-channel streams.
///
/// # Errors
///
/// Returns an error if the frame header cannot represent the block.
///
/// # Panics
///
/// Panics if `block_size` exceeds `framebuf.size()`.
pub fn encode_frame(
    options: &EncodingOptions,
    framebuf: &FrameBuf,
    block_size: usize,
    stream_info: &StreamInfo,
    frame_number: u64,
) -> Result<Frame, EncodeError> {
    let channels = stream_info.channels();
    let bits_per_sample = stream_info.bits_per_sample();
    let max_rice_parameter = EncodingOptions::max_rice_parameter(bits_per_sample);

    let (ch_info, subframes) = if channels == 2 && options.stereo_search_enabled() {
        encode_stereo(
            options,
            &framebuf.channel_slice(0)[..block_size],
            &framebuf.channel_slice(1)[..block_size],
            bits_per_sample,
            max_rice_parameter,
        )
    } else {
        let subframes = (0..channels)
            .map(|ch| {
                encode_subframe(
                    options,
                    &framebuf.channel_slice(ch)[..block_size],
                    bits_per_sample,
                    max_rice_parameter,
                )
            })
            .collect();
        (ChannelAssignment::Independent(channels as u8), subframes)
    };

    let header = FrameHeader::new(
        block_size,
        ch_info,
        bits_per_sample,
        stream_info.sample_rate(),
        frame_number,
    )
    .map_err(|e| e.within("header"))?;
    Ok(Frame::new(header, subframes)?)
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery, clippy::needless_range_loop)]
mod tests {
    use super::*;
    use crate::bitsink::ByteSink;
    use crate::constant::rice::MAX_EXTENDED_RICE_PARAMETER;
    use crate::constant::rice::MAX_RICE_PARAMETER;
    use crate::error::Verify;
    use crate::test_helper;

    use rstest::rstest;

    fn stereo_framebuf(left: &[i32], right: &[i32]) -> FrameBuf {
        let mut fb = FrameBuf::with_size(2, left.len());
        fb.channel_slice_mut(0).copy_from_slice(left);
        fb.channel_slice_mut(1).copy_from_slice(right);
        fb
    }

    #[rstest]
    fn constant_blocks_become_constant_subframes(
        #[values(1, 2, 16, 4096)] len: usize,
        #[values(0, -3, 1000)] dc: i32,
    ) {
        let opts = EncodingOptions::default();
        let signal = vec![dc; len];
        match encode_subframe(&opts, &signal, 16, MAX_RICE_PARAMETER) {
            SubFrame::Constant(c) => {
                assert_eq!(c.dc_offset(), dc);
                assert_eq!(c.block_size(), len);
            }
            other => panic!("expected a constant subframe, got {other:?}"),
        }
    }

    #[test]
    fn wasted_bits_are_removed_before_prediction() {
        let opts = EncodingOptions::default();
        let signal: Vec<i32> = test_helper::sinusoid_plus_noise(256, 32, 1000.0, 40)
            .into_iter()
            .map(|v| v * 8)
            .collect();
        let subframe = encode_subframe(&opts, &signal, 16, MAX_RICE_PARAMETER);
        assert_eq!(subframe.wasted_bits(), 3);
        subframe.verify().expect("encoded subframe must be valid");
    }

    #[test]
    fn noise_falls_back_to_verbatim() {
        let opts = EncodingOptions::default();
        let signal = test_helper::constant_plus_noise(32, 0, 127);
        let subframe = encode_subframe(&opts, &signal, 8, MAX_RICE_PARAMETER);
        let verbatim_bits = Verbatim::count_bits_from_metadata(32, 8, subframe.wasted_bits());
        assert!(subframe.count_bits() <= verbatim_bits);
        if let SubFrame::Verbatim(v) = &subframe {
            assert_eq!(v.samples().len(), 32);
        }
    }

    #[rstest]
    fn predictors_beat_verbatim_on_smooth_signals(#[values(false, true)] exhaustive: bool) {
        let mut opts = EncodingOptions::default();
        opts.exhaustive_model_search = exhaustive;
        let signal = test_helper::sinusoid_plus_noise(4096, 200, 12000.0, 4);
        let subframe = encode_subframe(&opts, &signal, 16, MAX_RICE_PARAMETER);
        assert!(matches!(subframe, SubFrame::FixedLpc(_) | SubFrame::Lpc(_)));
        assert!(subframe.count_bits() < 16 * 4096);
        assert_eq!(subframe.verify_bit_counter(), Ok(subframe.count_bits()));
        subframe.verify().expect("encoded subframe must be valid");
    }

    #[test]
    fn exhaustive_search_is_never_worse() {
        let signal = test_helper::sinusoid_plus_noise(1024, 37, 8000.0, 300);
        let mut opts = EncodingOptions::default();
        let heuristic = encode_subframe(&opts, &signal, 16, MAX_RICE_PARAMETER);
        opts.exhaustive_model_search = true;
        let exhaustive = encode_subframe(&opts, &signal, 16, MAX_RICE_PARAMETER);
        assert!(exhaustive.count_bits() <= heuristic.count_bits());
    }

    #[test]
    fn lpc_can_be_disabled() {
        let mut opts = EncodingOptions::default();
        opts.max_lpc_order = 0;
        let signal = test_helper::sinusoid_plus_noise(1024, 37, 8000.0, 30);
        let subframe = encode_subframe(&opts, &signal, 16, MAX_RICE_PARAMETER);
        assert!(!matches!(subframe, SubFrame::Lpc(_)));
    }

    #[test]
    fn encoding_is_deterministic() {
        let opts = EncodingOptions::default();
        let left = test_helper::sinusoid_plus_noise(1152, 50, 9000.0, 100);
        let right = test_helper::sinusoid_plus_noise(1152, 70, 5000.0, 100);
        let fb = stereo_framebuf(&left, &right);
        let info = StreamInfo::new(44100, 2, 16).unwrap();

        let mut first = ByteSink::new();
        encode_frame(&opts, &fb, 1152, &info, 3)
            .unwrap()
            .write(&mut first)
            .unwrap();
        let mut second = ByteSink::new();
        encode_frame(&opts, &fb, 1152, &info, 3)
            .unwrap()
            .write(&mut second)
            .unwrap();
        assert_eq!(first.as_slice(), second.as_slice());
    }

    #[test]
    fn identical_channels_make_a_constant_side() {
        // left = right = [100; 8]
        let opts = EncodingOptions::default();
        let fb = stereo_framebuf(&[100; 8], &[100; 8]);
        let info = StreamInfo::new(44100, 2, 16).unwrap();
        let frame = encode_frame(&opts, &fb, 8, &info, 0).unwrap();

        let side = encode_subframe(&opts, &[0; 8], 17, MAX_RICE_PARAMETER);
        match &side {
            SubFrame::Constant(c) => assert_eq!(c.dc_offset(), 0),
            other => panic!("expected a constant side channel, got {other:?}"),
        }
        let left = encode_subframe(&opts, &[100; 8], 16, MAX_RICE_PARAMETER);
        let independent_bits = 2 * left.count_bits();
        let side_bits = left.count_bits() + side.count_bits();
        let chosen_bits: usize = (0..2)
            .map(|ch| frame.subframe(ch).unwrap().count_bits())
            .sum();
        assert_eq!(chosen_bits, std::cmp::min(independent_bits, side_bits));
        assert!(matches!(
            frame.header().channel_assignment(),
            ChannelAssignment::Independent(2) | ChannelAssignment::LeftSide
        ));
    }

    #[test]
    fn identical_varying_channels_use_left_side() {
        let opts = EncodingOptions::default();
        let signal = test_helper::sinusoid_plus_noise(512, 40, 9000.0, 500);
        let fb = stereo_framebuf(&signal, &signal);
        let info = StreamInfo::new(44100, 2, 16).unwrap();
        let frame = encode_frame(&opts, &fb, 512, &info, 0).unwrap();
        assert_eq!(
            *frame.header().channel_assignment(),
            ChannelAssignment::LeftSide
        );
        match frame.subframe(1).unwrap() {
            SubFrame::Constant(c) => {
                assert_eq!(c.dc_offset(), 0);
                assert_eq!(c.bits_per_sample(), 17);
            }
            other => panic!("expected a constant side channel, got {other:?}"),
        }
    }

    #[test]
    fn adaptive_mode_only_considers_mid_side() {
        let mut opts = EncodingOptions::default();
        opts.mid_side = false;
        opts.adaptive_mid_side = true;
        let signal = test_helper::sinusoid_plus_noise(512, 40, 9000.0, 500);
        let fb = stereo_framebuf(&signal, &signal);
        let info = StreamInfo::new(44100, 2, 16).unwrap();
        let frame = encode_frame(&opts, &fb, 512, &info, 0).unwrap();
        assert!(matches!(
            frame.header().channel_assignment(),
            ChannelAssignment::Independent(2) | ChannelAssignment::MidSide
        ));

        opts.adaptive_mid_side = false;
        let frame = encode_frame(&opts, &fb, 512, &info, 0).unwrap();
        assert_eq!(
            *frame.header().channel_assignment(),
            ChannelAssignment::Independent(2)
        );
    }

    #[test]
    fn multichannel_frames_are_independent() {
        let opts = EncodingOptions::default();
        let mut fb = FrameBuf::with_size(3, 256);
        for ch in 0..3 {
            let signal = test_helper::sinusoid_plus_noise(256, 20 + ch, 3000.0, 10);
            fb.channel_slice_mut(ch).copy_from_slice(&signal);
        }
        let info = StreamInfo::new(48000, 3, 16).unwrap();
        let frame = encode_frame(&opts, &fb, 200, &info, 1).unwrap();
        assert_eq!(
            *frame.header().channel_assignment(),
            ChannelAssignment::Independent(3)
        );
        assert_eq!(frame.block_size(), 200);
        frame.verify().expect("encoded frame must be valid");
        assert_eq!(frame.verify_bit_counter(), Ok(frame.count_bits()));
    }

    #[rstest]
    fn rice_parameters_respect_bit_depth(#[values(8, 16, 20, 24)] bits_per_sample: usize) {
        let opts = EncodingOptions::default();
        let amplitude = ((1i64 << (bits_per_sample - 1)) - 1) as i32;
        let signal = test_helper::constant_plus_noise(1024, 0, amplitude);
        let max_p = EncodingOptions::max_rice_parameter(bits_per_sample);
        let subframe = encode_subframe(&opts, &signal, bits_per_sample, max_p);
        let residual = match &subframe {
            SubFrame::FixedLpc(f) => f.residual(),
            SubFrame::Lpc(l) => l.residual(),
            _ => return,
        };
        for p in 0..(1 << residual.partition_order()) {
            assert!(residual.rice_parameter(p) <= max_p);
            if bits_per_sample <= 16 {
                assert!(residual.rice_parameter(p) <= MAX_RICE_PARAMETER);
            } else {
                assert!(residual.rice_parameter(p) <= MAX_EXTENDED_RICE_PARAMETER);
            }
        }
    }

    #[rstest]
    fn partition_orders_divide_block(
        #[values(100, 576, 1000, 1152, 4096)] block_size: usize,
        #[values(0, 3)] min_order: usize,
    ) {
        let mut opts = EncodingOptions::default();
        opts.min_residual_partition_order = min_order;
        opts.max_residual_partition_order = 8;
        let signal = test_helper::sinusoid_plus_noise(block_size, 64, 10000.0, 50);
        let subframe = encode_subframe(&opts, &signal, 16, MAX_RICE_PARAMETER);
        let residual = match &subframe {
            SubFrame::FixedLpc(f) => f.residual(),
            SubFrame::Lpc(l) => l.residual(),
            _ => return,
        };
        assert_eq!(block_size % (1 << residual.partition_order()), 0);
    }

    #[test]
    fn lpc_shift_stays_in_range() {
        let mut opts = EncodingOptions::default();
        opts.max_lpc_order = 32;
        opts.exhaustive_model_search = true;
        for seed_period in [3, 17, 64, 300] {
            let signal = test_helper::sinusoid_plus_noise(2048, seed_period, 20000.0, 20);
            if let SubFrame::Lpc(lpc) = encode_subframe(&opts, &signal, 16, MAX_RICE_PARAMETER) {
                let shift = lpc.parameters().shift();
                assert!((-16..=15).contains(&shift));
            }
        }
    }
}
