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

#![allow(clippy::missing_panics_doc)]

use std::collections::BTreeMap;
use std::f64::consts::PI;

use md5::Digest;
use once_cell::sync::Lazy;
use rand::distributions::Distribution;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tempfile::NamedTempFile;

use super::arrayutils::append_i32s_as_le_bytes;
use super::component::ChannelAssignment;
use super::component::Frame;
use super::component::FrameHeader;
use super::component::Residual;
use super::component::StreamInfo;
use super::component::Verbatim;
use super::config::EncodingOptions;
use super::encoder::encode_with_fixed_block_size;
use super::encoder::SeekPoint;
use super::source::MemSource;
use super::source::Source;

#[macro_export]
macro_rules! assert_close {
    ($actual:expr, $expected:expr, rtol = $rtol:expr, atol = $atol:expr) => {{
        let err = ($actual - $expected).abs();
        #[allow(clippy::suboptimal_flops)]
        let tol = $rtol * ($expected).abs() + $atol;
        assert!(err < tol, "{} is not close to {}", $actual, $expected);
    }};
    ($actual:expr, $expected:expr) => {{
        $crate::assert_close!($actual, $expected, rtol = 0.00001, atol = 0.00001);
    }};
}

const NOISE_SEED: u64 = 0x00F1_AC00;

/// Generates a sinusoid with uniform noise, deterministically.
pub fn sinusoid_plus_noise(
    block_size: usize,
    period: usize,
    amplitude: f64,
    noise_width: i32,
) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(NOISE_SEED ^ (block_size as u64) ^ ((period as u64) << 32));
    let noise = Uniform::from(-noise_width..=noise_width);
    (0..block_size)
        .map(|t| {
            let phase = 2.0 * PI * t as f64 / period as f64;
            (amplitude * phase.sin()) as i32 + noise.sample(&mut rng)
        })
        .collect()
}

/// Generates a DC signal with uniform noise, deterministically.
pub fn constant_plus_noise(block_size: usize, dc_offset: i32, noise_width: i32) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(NOISE_SEED ^ (block_size as u64));
    let noise = Uniform::from(-noise_width..=noise_width);
    (0..block_size)
        .map(|_t| dc_offset + noise.sample(&mut rng))
        .collect()
}

/// Interleaves per-channel signals.
fn interleave(channels: &[Vec<i32>]) -> Vec<i32> {
    let len = channels.iter().map(Vec::len).min().unwrap_or(0);
    let mut ret = Vec::with_capacity(len * channels.len());
    for t in 0..len {
        for ch in channels {
            ret.push(ch[t]);
        }
    }
    ret
}

/// Interleaved stereo test signals at 16 bits per sample.
static TEST_SIGNALS: Lazy<BTreeMap<&'static str, Vec<i32>>> = Lazy::new(|| {
    let steady = interleave(&[
        sinusoid_plus_noise(20000, 109, 12000.0, 30),
        sinusoid_plus_noise(20000, 218, 9000.0, 30),
    ]);
    let correlated = {
        let left = sinusoid_plus_noise(20000, 61, 15000.0, 200);
        let right: Vec<i32> = left.iter().map(|v| v - v / 8).collect();
        interleave(&[left, right])
    };
    let noisy = interleave(&[
        constant_plus_noise(20000, 0, 32000),
        constant_plus_noise(20000, -100, 1000),
    ]);
    let bursts = {
        let gate: Vec<i32> = (0..20000).map(|t| i32::from((t / 3000) % 2 == 0)).collect();
        let tone = sinusoid_plus_noise(20000, 22, 20000.0, 5);
        let left: Vec<i32> = tone.iter().zip(&gate).map(|(v, g)| v * g).collect();
        let right: Vec<i32> = tone.iter().zip(&gate).map(|(v, g)| v * (1 - g)).collect();
        interleave(&[left, right])
    };
    BTreeMap::from([
        ("steady", steady),
        ("correlated", correlated),
        ("noisy", noisy),
        ("bursts", bursts),
    ])
});

/// Returns an interleaved stereo test signal by name.
pub fn test_signal(name: &str) -> &'static [i32] {
    TEST_SIGNALS
        .get(name)
        .expect("Specified test signal not found.")
}

/// Computes MD5 of interleaved samples the way STREAMINFO does.
pub fn md5_of_samples(samples: &[i32], bits_per_sample: usize) -> [u8; 16] {
    let mut bytes = vec![];
    append_i32s_as_le_bytes(samples, &mut bytes, (bits_per_sample + 7) / 8);
    md5::Md5::digest(&bytes).into()
}

/// Runs an integrity test of the stream encoder.
///
/// This encodes `src` into a temporary file, decodes it with `claxon`, and
/// compares the waveforms and the STREAMINFO fields with the original.
pub fn integrity_test(options: &EncodingOptions, src: &MemSource) -> Vec<SeekPoint> {
    let mut file = NamedTempFile::new().expect("Failed to create temp file.");
    let seek_points =
        encode_with_fixed_block_size(options, src.clone(), &mut file).expect("Encoding failed.");
    let flac_path = file.into_temp_path();

    let mut reader = claxon::FlacReader::open(&flac_path).expect("Decoder failed to open file.");
    let streaminfo = reader.streaminfo();
    assert_eq!(streaminfo.channels as usize, src.channels());
    assert_eq!(streaminfo.sample_rate as usize, src.sample_rate());
    assert_eq!(streaminfo.bits_per_sample as usize, src.bits_per_sample());
    assert_eq!(streaminfo.samples, Some(src.len() as u64));
    assert_eq!(
        streaminfo.md5sum,
        md5_of_samples(src.as_raw_slice(), src.bits_per_sample())
    );

    let channels = src.channels();
    let loaded = reader
        .samples()
        .collect::<Result<Vec<i32>, _>>()
        .expect("Decoding failed.");
    assert_eq!(loaded.len(), src.as_raw_slice().len());
    for (i, (actual, expected)) in loaded.iter().zip(src.as_raw_slice()).enumerate() {
        let t = i / channels;
        let frame = seek_points.partition_point(|sp| sp.sample_number <= t as u64) - 1;
        assert_eq!(
            actual,
            expected,
            "Failed at t={} of ch={} (frame={}, in-frame-t={})",
            t,
            i % channels,
            frame,
            t as u64 - seek_points[frame].sample_number
        );
    }
    seek_points
}

/// Makes a valid `Residual` with random values and the partition order 2.
pub fn make_random_residual<R: Rng>(mut rng: R, warmup_length: usize) -> Residual {
    // every partition must be longer than the warm-up.
    let min_part_len = std::cmp::max(16, warmup_length + 1);
    let block_size = 4 * Uniform::from(min_part_len..=1024).sample(&mut rng);
    let partition_order: usize = 2;
    let params = [7u8, 8, 6, 7];
    let values = Uniform::from(-300..=300);
    let residuals: Vec<i32> = (0..block_size)
        .map(|t| {
            if t < warmup_length {
                0
            } else {
                values.sample(&mut rng)
            }
        })
        .collect();
    Residual::new(
        partition_order,
        block_size,
        warmup_length,
        &params,
        &residuals,
    )
    .expect("Error in random construction of Residual")
}

/// Makes a frame with verbatim subframes from channel-major `samples`.
pub fn make_verbatim_frame(stream_info: &StreamInfo, samples: &[i32], frame_number: u64) -> Frame {
    let channels = stream_info.channels();
    let block_size = samples.len() / channels;
    let bits_per_sample = stream_info.bits_per_sample();
    let header = FrameHeader::new(
        block_size,
        ChannelAssignment::Independent(channels as u8),
        bits_per_sample,
        stream_info.sample_rate(),
        frame_number,
    )
    .expect("Invalid frame header");
    let subframes = (0..channels)
        .map(|ch| {
            Verbatim::new(
                &samples[block_size * ch..block_size * (ch + 1)],
                bits_per_sample,
                0,
            )
            .expect("Invalid verbatim samples")
            .into()
        })
        .collect();
    Frame::new(header, subframes).expect("Invalid frame")
}
