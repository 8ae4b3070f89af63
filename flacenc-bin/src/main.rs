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

// Note that clippy attributes should be in sync with those declared in "lib.rs"
#![warn(clippy::all, clippy::nursery, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::multiple_crate_versions,
    clippy::must_use_candidate
)]
// Some from restriction lint-group
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::create_dir,
    clippy::dbg_macro,
    clippy::empty_structs_with_brackets,
    clippy::exit,
    clippy::if_then_some_else_none,
    clippy::impl_trait_in_params,
    clippy::let_underscore_must_use,
    clippy::lossy_float_literal,
    clippy::multiple_inherent_impl,
    clippy::print_stdout,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::separated_literal_suffix,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::try_err,
    clippy::unnecessary_self_imports,
    clippy::wildcard_enum_match_arm
)]

use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use clap::Parser;
use log::info;
use log::warn;

use flacore::config::EncodingOptions;
use flacore::error::EncodeError;
use flacore::error::Verify;
use flacore::SeekPoint;

mod display;
mod source;

use display::OptionsOrigin;
use display::Progress;
use source::HoundSource;

/// FLAC encoder.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path for the output FLAC file.
    #[clap(short, long)]
    output: String,
    /// Path for the input audio file.
    source: String,
    /// If set, load config from the specified file.
    #[clap(short, long, conflicts_with = "preset")]
    config: Option<String>,
    /// If set, start from the options of the compression level (0-8).
    #[clap(short, long)]
    preset: Option<usize>,
    /// If set, dump the config used to the specified path.
    #[clap(long)]
    dump_config: Option<String>,
}

/// Exit codes of the encoder process.
enum ExitCode {
    #[allow(dead_code)]
    Normal = 0,
    InvalidConfig = -1,
    InputError = -2,
    EncoderError = -3,
    OutputError = -4,
}

fn load_options(args: &Args) -> Result<(EncodingOptions, OptionsOrigin), String> {
    if let Some(ref path) = args.config {
        let conf_str = std::fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
        let options = toml::from_str(&conf_str).map_err(|e| format!("{path}: {e}"))?;
        return Ok((options, OptionsOrigin::File(path.into())));
    }
    if let Some(level) = args.preset {
        let options = EncodingOptions::preset(level).map_err(|e| e.within("preset").to_string())?;
        return Ok((options, OptionsOrigin::Preset(level)));
    }
    Ok((EncodingOptions::default(), OptionsOrigin::Default))
}

fn dump_options<P: AsRef<Path>>(options: &EncodingOptions, path: P) -> Result<(), String> {
    let serialized = toml::to_string(options).map_err(|e| e.to_string())?;
    let mut file = File::create(path).map_err(|e| e.to_string())?;
    file.write_all(serialized.as_bytes())
        .map_err(|e| e.to_string())
}

fn write_stream(
    options: &EncodingOptions,
    source: HoundSource,
    file: File,
) -> Result<Vec<SeekPoint>, EncodeError> {
    let mut writer = BufWriter::new(file);
    let seek_points = flacore::encode_with_fixed_block_size(options, source, &mut writer)?;
    writer.flush()?;
    Ok(seek_points)
}

/// Encodes `source` into a new file at `output`.
///
/// On failure, the partially written file is removed before the error is
/// returned.
fn run_encoder<P: AsRef<Path>>(
    options: &EncodingOptions,
    source: HoundSource,
    output: P,
) -> Result<Vec<SeekPoint>, EncodeError> {
    let output = output.as_ref();
    let file = File::create(output)?;
    let result = write_stream(options, source, file);
    if result.is_err() {
        if let Err(e) = std::fs::remove_file(output) {
            warn!("failed to remove {}: {e}", output.display());
        }
    }
    result
}

fn log_build_constants() {
    info!(
        target: "flacenc-bin::build_info::jsonl",
        "{{ version: \"{}\", cli_version: \"{}\" }}",
        flacore::constant::build_info::CRATE_VERSION,
        display::CRATE_VERSION,
    );
}

#[allow(clippy::let_underscore_must_use)]
fn main_body(args: Args) -> Result<(), i32> {
    let _ = display::show_banner();
    log_build_constants();
    let (options, origin) = load_options(&args).map_err(|e| {
        eprintln!("Error: {e}");
        ExitCode::InvalidConfig as i32
    })?;
    if let Err(e) = options.verify() {
        eprintln!("Error: {}", e.within("encoder_config"));
        return Err(ExitCode::InvalidConfig as i32);
    }
    if let Some(ref path) = args.dump_config {
        dump_options(&options, path).map_err(|e| {
            eprintln!("Error: {e}");
            ExitCode::OutputError as i32
        })?;
    }

    let io_info = display::IoArgs::new(origin, &args.source, &args.output);
    let _ = display::show_progress(&io_info, &Progress::Started);

    let source = HoundSource::from_path(&args.source).map_err(|e| {
        eprintln!("Error: {e}");
        ExitCode::InputError as i32
    })?;
    info!(
        "input: {} bytes, {:.2} secs",
        source.file_size().unwrap_or(0),
        source.duration_as_secs()
    );
    let source_duration_secs = source.duration_as_secs();
    let encoder_start = Instant::now();

    let seek_points = run_encoder(&options, source, &args.output).map_err(|e| {
        eprintln!("Error: {e}");
        ExitCode::EncoderError as i32
    })?;

    let encode_time = encoder_start.elapsed();
    let bytes_written = std::fs::metadata(&args.output).map_or(0, |m| m.len());
    info!(
        "encoded {} frames into {} bytes in {:.3} secs",
        seek_points.len(),
        bytes_written,
        encode_time.as_secs_f32()
    );
    let _ = display::show_progress(
        &io_info,
        &Progress::Done {
            encode_time,
            bytes_written,
            frames: seek_points.len(),
            source_duration_secs,
        },
    );
    Ok(())
}

fn main() -> Result<(), i32> {
    env_logger::Builder::from_env("FLACENC_LOG")
        .format_timestamp(None)
        .init();
    main_body(Args::parse())
}
