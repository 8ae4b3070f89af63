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

//! Terminal status lines for "flacenc-bin".

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use termcolor::Color;
use termcolor::ColorChoice;
use termcolor::ColorSpec;
use termcolor::StandardStream;
use termcolor::WriteColor;

pub const CRATE_VERSION: &str = match option_env!("CARGO_PKG_VERSION") {
    Some(v) => v,
    None => "unknown",
};
const UNKNOWN_NAME: &str = "[unknown]";

/// Where the options came from.
pub enum OptionsOrigin {
    Default,
    Preset(usize),
    File(PathBuf),
}

impl OptionsOrigin {
    fn name(&self) -> String {
        match self {
            Self::Default => "[default]".to_owned(),
            Self::Preset(level) => format!("[preset {level}]"),
            Self::File(p) => file_name(p),
        }
    }
}

fn file_name<P: AsRef<Path>>(path: P) -> String {
    path.as_ref().file_name().map_or_else(
        || UNKNOWN_NAME.to_owned(),
        |s| s.to_string_lossy().to_string(),
    )
}

pub struct IoArgs {
    origin: OptionsOrigin,
    input_path: PathBuf,
    output_path: PathBuf,
}

impl IoArgs {
    pub fn new<Q: AsRef<Path>, R: AsRef<Path>>(
        origin: OptionsOrigin,
        input_path: Q,
        output_path: R,
    ) -> Self {
        Self {
            origin,
            input_path: input_path.as_ref().to_path_buf(),
            output_path: output_path.as_ref().to_path_buf(),
        }
    }
}

pub enum Progress {
    Started,
    Done {
        encode_time: Duration,
        bytes_written: u64,
        frames: usize,
        source_duration_secs: f32,
    },
}

/// Show the initial banner.
pub fn show_banner() -> Result<(), std::io::Error> {
    let mut termout = StandardStream::stderr(ColorChoice::Auto);
    termout.set_color(ColorSpec::new().set_bold(true))?;
    write!(termout, "\n{:>10} ", "flacenc")?;
    termout.reset()?;
    writeln!(
        termout,
        "(engine v{}, CLI v{})",
        flacore::constant::build_info::CRATE_VERSION,
        CRATE_VERSION
    )
}

pub fn show_progress(io: &IoArgs, progress: &Progress) -> Result<(), std::io::Error> {
    let mut termout = StandardStream::stderr(ColorChoice::Auto);
    match *progress {
        Progress::Started => {
            termout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
            write!(termout, "{:>10} ", "Encoding")?;
            termout.reset()?;
            writeln!(
                termout,
                "{} => {} {}",
                file_name(&io.input_path),
                file_name(&io.output_path),
                io.origin.name()
            )
        }
        Progress::Done {
            encode_time,
            bytes_written,
            frames,
            source_duration_secs,
        } => {
            termout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
            write!(termout, "{:>10} ", "Encoded")?;
            termout.reset()?;
            let speed = source_duration_secs / encode_time.as_secs_f32().max(f32::EPSILON);
            writeln!(
                termout,
                "{} [{} bytes, {} frames, {:.1}x realtime]",
                file_name(&io.output_path),
                bytes_written,
                frames,
                speed
            )?;
            writeln!(termout)
        }
    }
}
