//! Radiomod - Streaming digital-radio modulator
//!
//! This library re-exports the pipeline, channel, and configuration
//! functionality from `radiomod-core`. The binary in `src/main.rs` adds
//! the CLI surface and signal handling.

pub use radiomod_core::{capture, channel, config, framer, modulator, pipeline, ptt};

pub use radiomod_core::{
    bits_to_symbols, AudioInput, BoundedChannel, Config, EventDevicePtt, Framer, Modulator,
    NullPtt, OutputMode, Pipeline, PipelineReport, PttSwitch, Verbosity,
};
pub use radiomod_core::{
    AUDIO_CHANNEL_CAPACITY, BITSTREAM_CHANNEL_CAPACITY, BUILD_DATE, FRAME_BITS, SAMPLE_RATE,
    SYMBOLS_PER_FRAME, SYMBOL_GAIN, VERSION,
};
