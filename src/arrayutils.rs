// Copyright 2023 Google LLC
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

//! Module for array processing utility functions.

/// Deinterleaves channel interleaved samples to the channel-major order.
///
/// `dest` holds `channels` planes of `channel_stride` samples each. Samples
/// missing from `interleaved` are filled with zeros.
///
/// # Examples
///
/// ```
/// # use flacore::arrayutils::deinterleave;
/// let mut dest = [9i32; 6];
/// deinterleave(&[1, -1, 2, -2], 2, 3, &mut dest);
/// assert_eq!(dest, [1, 2, 0, -1, -2, 0]);
/// ```
pub fn deinterleave(interleaved: &[i32], channels: usize, channel_stride: usize, dest: &mut [i32]) {
    if channels == 1 {
        let n = std::cmp::min(dest.len(), interleaved.len());
        dest[..n].copy_from_slice(&interleaved[..n]);
        dest[n..].fill(0);
        return;
    }
    let src_samples = interleaved.len() / channels;
    for (ch, plane) in dest.chunks_mut(channel_stride).take(channels).enumerate() {
        for (t, x) in plane.iter_mut().enumerate() {
            *x = if t < src_samples {
                interleaved[channels * t + ch]
            } else {
                0i32
            };
        }
    }
}

/// Implementation for each bytes-per-sample (BPS) setting.
///
/// # Panics
///
/// This function panics when the length of `bytes` is not a multiple of
/// `bytes_per_sample`, or `dest` does not have enough elements to store the
/// results.
fn le_bytes_to_i32s_impl<const BPS: usize>(bytes: &[u8], dest: &mut [i32]) {
    assert!(bytes.len() % BPS == 0, "len={}, BPS={BPS}", bytes.len());
    assert!(dest.len() >= bytes.len() / BPS);
    for (chunk, x) in bytes.chunks_exact(BPS).zip(dest.iter_mut()) {
        *x = i32::from_le_bytes(std::array::from_fn(|i| {
            if i < (4 - BPS) {
                0u8
            } else {
                chunk[i - (4 - BPS)]
            }
        })) >> ((4 - BPS) * 8);
    }
}

/// Converts a byte-sequence of little-endian integers to integers (i32).
///
/// # Panics
///
/// This function panics when `bytes_per_sample` is not in range `1..=4`, or
/// the length of `bytes` is not a multiple of `bytes_per_sample`, or `dest`
/// does not have enough elements to store the results.
pub fn le_bytes_to_i32s(bytes: &[u8], dest: &mut [i32], bytes_per_sample: usize) {
    match bytes_per_sample {
        1 => le_bytes_to_i32s_impl::<1>(bytes, dest),
        2 => le_bytes_to_i32s_impl::<2>(bytes, dest),
        3 => le_bytes_to_i32s_impl::<3>(bytes, dest),
        4 => le_bytes_to_i32s_impl::<4>(bytes, dest),
        _ => panic!("bytes_per_sample must be in 1..=4"),
    }
}

/// Appends the little-endian representation of `ints` to `dest`.
///
/// Each value is truncated to its lowest `bytes_per_sample` bytes.
///
/// # Examples
///
/// ```
/// # use flacore::arrayutils::append_i32s_as_le_bytes;
/// let mut bytes = vec![];
/// append_i32s_as_le_bytes(&[1, -1], &mut bytes, 2);
/// assert_eq!(bytes, [0x01, 0x00, 0xFF, 0xFF]);
/// ```
pub fn append_i32s_as_le_bytes(ints: &[i32], dest: &mut Vec<u8>, bytes_per_sample: usize) {
    dest.reserve(ints.len() * bytes_per_sample);
    for v in ints {
        dest.extend_from_slice(&v.to_le_bytes()[..bytes_per_sample]);
    }
}

/// Returns true if all elements are equal.
pub fn is_constant<T: PartialEq>(samples: &[T]) -> bool {
    samples.windows(2).all(|w| w[0] == w[1])
}

/// Returns the number of trailing zero bits shared by all of `samples`.
///
/// Returns 0 when all samples are zero.
///
/// # Examples
///
/// ```
/// # use flacore::arrayutils::common_trailing_zeros;
/// assert_eq!(common_trailing_zeros(&[4, -8, 12]), 2);
/// assert_eq!(common_trailing_zeros(&[0, 0]), 0);
/// assert_eq!(common_trailing_zeros(&[0, 16]), 4);
/// ```
pub fn common_trailing_zeros(samples: &[i32]) -> u32 {
    let acc = samples.iter().fold(0i32, |acc, x| acc | *x);
    if acc == 0 {
        0
    } else {
        acc.trailing_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn do_deinterleave() {
        let interleaved = [0, 0, -1, -2, 1, 2, -3, 6];
        let mut dest = vec![0i32; interleaved.len()];
        deinterleave(&interleaved, 2, 4, &mut dest);
        assert_eq!(&dest, &[0, -1, 1, -3, 0, -2, 2, 6]);
    }

    #[test]
    fn deinterleave_many_channels() {
        let interleaved: Vec<i32> = (0..24).collect();
        let mut dest = vec![0i32; 8 * 4];
        deinterleave(&interleaved, 8, 4, &mut dest);
        assert_eq!(&dest[0..4], &[0, 8, 16, 0]);
        assert_eq!(&dest[28..32], &[7, 15, 23, 0]);
    }

    #[test]
    fn convert_le_bytes_to_ints() {
        let bytes = [
            0x56, 0x34, 0x12, 0x9B, 0x57, 0x13, 0xFF, 0xFF, 0xFF, 0xAC, 0x68, 0x24,
        ];
        let mut dest = [0i32; 4];
        le_bytes_to_i32s(&bytes, &mut dest, 3);
        assert_eq!(dest, [0x12_3456, 0x13_579B, -1, 0x24_68AC]);

        let mut bytes = vec![];
        append_i32s_as_le_bytes(&dest, &mut bytes, 3);
        assert_eq!(bytes, [
            0x56, 0x34, 0x12, 0x9B, 0x57, 0x13, 0xFF, 0xFF, 0xFF, 0xAC, 0x68, 0x24,
        ]);
    }

    #[test]
    fn one_byte_samples_are_signed() {
        let mut dest = [0i32; 2];
        le_bytes_to_i32s(&[0x80, 0x7F], &mut dest, 1);
        assert_eq!(dest, [-128, 127]);
    }

    #[test]
    fn constant_detector() {
        let signal = vec![5; 64];
        assert!(is_constant(&signal));

        let signal = vec![-3; 192];
        assert!(is_constant(&signal));

        let mut signal = vec![8.2f32; 192];
        signal[191] = f32::NAN;
        assert!(!is_constant(&signal));

        assert!(is_constant::<i32>(&[]));
    }

    #[test]
    fn trailing_zeros_of_mixed_signs() {
        assert_eq!(common_trailing_zeros(&[-256, 512, 0]), 8);
        assert_eq!(common_trailing_zeros(&[i32::MIN]), 31);
        assert_eq!(common_trailing_zeros(&[3, 6]), 0);
    }
}
