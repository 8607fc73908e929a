//! Radiomod Core - Streaming modulator pipeline
//!
//! This library converts a live 16-bit PCM audio stream into a digital-radio
//! baseband (or raw bitstream) output while keying a physical push-to-talk
//! line. The pipeline is three concurrent stages joined by bounded blocking
//! channels:
//!
//! ```text
//! stdin/device -> capture -> audio channel -> modulator -> bitstream channel -> framer -> stdout
//! ```
//!
//! Shutdown is cooperative: an interrupt or end-of-input clears a shared
//! run flag, and the [`pipeline`] module unwinds the stages in a strict
//! order so that no partial frame ever reaches the output and no buffered
//! audio is silently lost mid-stage.

pub mod capture;
pub mod channel;
pub mod config;
pub mod framer;
pub mod modulator;
pub mod pipeline;
pub mod ptt;

pub use channel::BoundedChannel;
pub use config::{Config, OutputMode, Verbosity};
pub use framer::Framer;
pub use modulator::{bits_to_symbols, Modulator};
pub use pipeline::{AudioInput, Pipeline, PipelineReport};
pub use ptt::{EventDevicePtt, NullPtt, PttSwitch};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date embedded by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Input sample rate in samples per second (16-bit LE mono PCM)
pub const SAMPLE_RATE: u32 = 8000;

/// Number of encoded bits in one protocol frame
pub const FRAME_BITS: usize = 192;

/// Baseband symbols per frame (one symbol per two bits)
pub const SYMBOLS_PER_FRAME: usize = FRAME_BITS / 2;

/// Amplitude scale applied to the dibit symbol values (+3/+1/-1/-3)
pub const SYMBOL_GAIN: i16 = 8192;

/// Capacity of the audio sample channel (128 ms at 8000 S/s)
pub const AUDIO_CHANNEL_CAPACITY: usize = 1024;

/// Capacity of the bitstream channel (slightly over 21 frames)
pub const BITSTREAM_CHANNEL_CAPACITY: usize = 4096;
