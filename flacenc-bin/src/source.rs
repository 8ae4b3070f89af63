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

//! A module for signal sources for "flacenc-bin".

use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;

use flacore::arrayutils::le_bytes_to_i32s;
use flacore::error::SourceError;
use flacore::error::SourceErrorReason;
use flacore::source::FrameBuf;
use flacore::source::Source;

/// `flacore::source::Source` based on `hound::WavReader`.
///
/// hound is only used for parsing the WAV header. After that, the inner
/// `BufReader` is taken via `WavReader::into_inner` and blocks of samples are
/// read from it directly.
#[allow(clippy::module_name_repetitions)]
pub struct HoundSource {
    spec: hound::WavSpec,
    duration: usize,
    reader: BufReader<File>,
    bytes_per_sample: usize,
    bytebuf: Vec<u8>,
    samplebuf: Vec<i32>,
    current_offset: usize,
    file_size: Option<usize>,
}

impl HoundSource {
    /// Constructs `HoundSource` from `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file is not found or has an invalid format. WAVs with
    /// IEEE float samples are rejected with `SourceErrorReason::InvalidFormat`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file_size = path.metadata().ok().map(|x| x.len() as usize);
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| SourceError::from_io_error(e).set_path(path))?;
        let spec = reader.spec();
        let duration = reader.duration() as usize;
        reader
            .seek(0)
            .map_err(|e| SourceError::from_io_error(e).set_path(path))?;
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(SourceError::by_reason(SourceErrorReason::InvalidFormat).set_path(path));
        }
        Ok(Self {
            spec,
            duration,
            reader: reader.into_inner(),
            bytes_per_sample: (spec.bits_per_sample as usize + 7) / 8,
            bytebuf: Vec::new(),
            samplebuf: Vec::new(),
            current_offset: 0,
            file_size,
        })
    }

    pub const fn file_size(&self) -> Option<usize> {
        self.file_size
    }

    pub fn duration_as_secs(&self) -> f32 {
        self.duration as f32 / self.spec.sample_rate as f32
    }
}

impl Source for HoundSource {
    #[inline]
    fn channels(&self) -> usize {
        self.spec.channels as usize
    }

    #[inline]
    fn bits_per_sample(&self) -> usize {
        self.spec.bits_per_sample as usize
    }

    #[inline]
    fn sample_rate(&self) -> usize {
        self.spec.sample_rate as usize
    }

    fn read_samples(&mut self, dest: &mut FrameBuf) -> Result<usize, SourceError> {
        if dest.channels() != self.channels() {
            return Err(SourceError::by_reason(SourceErrorReason::InvalidBuffer));
        }
        let to_read = std::cmp::min(self.duration - self.current_offset, dest.size());
        let to_read_samples = to_read * self.channels();

        self.bytebuf.resize(to_read_samples * self.bytes_per_sample, 0u8);
        self.reader
            .read_exact(&mut self.bytebuf)
            .map_err(SourceError::from_io_error)?;
        if self.bytes_per_sample == 1 {
            // 8-bit wav is not in two's complement, so convert it first
            self.bytebuf.iter_mut().for_each(|p| {
                *p = (i32::from(*p) - 128).to_le_bytes()[0];
            });
        }
        self.samplebuf.resize(to_read_samples, 0i32);
        le_bytes_to_i32s(&self.bytebuf, &mut self.samplebuf, self.bytes_per_sample);
        dest.fill_from_interleaved(&self.samplebuf);

        self.current_offset += to_read;
        Ok(to_read)
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use tempfile::NamedTempFile;

    fn write_wav(samples: &[i32], channels: u16, bits_per_sample: u16) -> NamedTempFile {
        let file = NamedTempFile::new().expect("Failed to create temp file.");
        let spec = hound::WavSpec {
            channels,
            sample_rate: 16000,
            bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(file.path(), spec).expect("WAV open error");
        for v in samples {
            if bits_per_sample == 8 {
                writer.write_sample(*v as i8).expect("WAV write error");
            } else {
                writer.write_sample(*v).expect("WAV write error");
            }
        }
        writer.finalize().expect("WAV finalize error");
        file
    }

    #[rstest]
    fn reads_interleaved_wav(#[values(8, 16, 24)] bits_per_sample: u16) {
        let signal: Vec<i32> = (0..300).map(|t| (t % 37) - 18).collect();
        let file = write_wav(&signal, 2, bits_per_sample);

        let mut src = HoundSource::from_path(file.path()).expect("Failed to open WAV");
        assert_eq!(src.channels(), 2);
        assert_eq!(src.bits_per_sample(), bits_per_sample as usize);
        assert_eq!(src.len_hint(), Some(150));

        let mut fb = FrameBuf::with_size(2, 64);
        let mut left = vec![];
        let mut right = vec![];
        loop {
            let read = src.read_samples(&mut fb).expect("Read error");
            if read == 0 {
                break;
            }
            left.extend_from_slice(&fb.channel_slice(0)[..read]);
            right.extend_from_slice(&fb.channel_slice(1)[..read]);
        }
        let expected_left: Vec<i32> = signal.iter().step_by(2).copied().collect();
        let expected_right: Vec<i32> = signal.iter().skip(1).step_by(2).copied().collect();
        assert_eq!(left, expected_left);
        assert_eq!(right, expected_right);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(HoundSource::from_path("/nonexistent/input.wav").is_err());
    }
}
