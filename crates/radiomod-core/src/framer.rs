//! Frame accumulation and output emission
//!
//! Collects bits from the bitstream channel into fixed-size frames and
//! emits each frame the instant it fills: as raw 0x00/0x01 bytes in
//! bitstream mode, or as 2-byte big-endian baseband symbols in baseband
//! mode. A frame is only ever interpreted when exactly full; whatever is
//! accumulated when the run ends is discarded, never emitted.

use crate::channel::{BoundedChannel, GetError};
use crate::config::OutputMode;
use crate::modulator::bits_to_symbols;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// How long one `get` on the bitstream channel may block
const GET_TIMEOUT: Duration = Duration::from_secs(1);

/// Consecutive open-channel get timeouts tolerated before the output loop
/// gives up on a stalled upstream (30 s of silence)
const STALL_LIMIT: u32 = 30;

/// Errors from the output loop
#[derive(Debug, Error)]
pub enum FramerError {
    /// The bitstream channel stayed open but produced nothing for the
    /// whole stall budget
    #[error("bitstream producer stalled for {stalled_for:?} with channel still open")]
    UpstreamStalled { stalled_for: Duration },

    #[error("output write failed: {0}")]
    Io(#[from] io::Error),
}

/// Counters reported when the output loop finishes
#[derive(Debug, Clone, Copy, Default)]
pub struct FramerStats {
    /// Complete frames emitted
    pub frames_emitted: u64,
    /// Bits consumed from the bitstream channel
    pub bits_consumed: u64,
    /// Bits of the trailing partial frame discarded at shutdown
    pub bits_discarded: u64,
}

/// Fixed-size bit accumulator
pub struct Framer {
    frame: Vec<u8>,
    index: usize,
}

impl Framer {
    /// Create a framer for `frame_bits`-bit frames
    pub fn new(frame_bits: usize) -> Self {
        Self {
            frame: vec![0u8; frame_bits],
            index: 0,
        }
    }

    /// Append one bit. Returns the full frame exactly when it fills; the
    /// write index is reset to the frame start in the same call.
    pub fn push(&mut self, bit: u8) -> Option<&[u8]> {
        self.frame[self.index] = bit & 1;
        self.index += 1;
        if self.index == self.frame.len() {
            self.index = 0;
            Some(&self.frame)
        } else {
            None
        }
    }

    /// Bits accumulated toward the next frame
    pub fn pending(&self) -> usize {
        self.index
    }

    /// Frame size in bits
    pub fn frame_bits(&self) -> usize {
        self.frame.len()
    }
}

/// Write one full frame in the selected mode and flush
pub fn emit_frame<W: Write>(out: &mut W, frame: &[u8], mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Bitstream => out.write_all(frame)?,
        OutputMode::Baseband => {
            for symbol in bits_to_symbols(frame) {
                out.write_all(&symbol.to_be_bytes())?;
            }
        }
    }
    out.flush()
}

/// Run the output stage on the calling thread until the run flag clears,
/// the bitstream channel closes, or the stall budget is exhausted
pub fn run_output_loop<W: Write>(
    bitstream: &BoundedChannel<u8>,
    out: &mut W,
    mode: OutputMode,
    frame_bits: usize,
    running: &AtomicBool,
) -> Result<FramerStats, FramerError> {
    let mut framer = Framer::new(frame_bits);
    let mut stats = FramerStats::default();
    let mut stalls = 0u32;

    while running.load(Ordering::SeqCst) {
        match bitstream.get(GET_TIMEOUT) {
            Ok(bit) => {
                stalls = 0;
                stats.bits_consumed += 1;
                if let Some(frame) = framer.push(bit) {
                    emit_frame(out, frame, mode)?;
                    stats.frames_emitted += 1;
                }
            }
            Err(GetError::Closed) => {
                tracing::info!("bitstream channel closed; done transmitting");
                break;
            }
            Err(GetError::Timeout) => {
                // A timeout does not imply closure; check explicitly.
                if bitstream.is_closed() {
                    tracing::info!("bitstream channel closed; done transmitting");
                    break;
                }
                stalls += 1;
                tracing::warn!(stalls, "no bits from modulator; channel still open");
                if stalls >= STALL_LIMIT {
                    return Err(FramerError::UpstreamStalled {
                        stalled_for: GET_TIMEOUT * STALL_LIMIT,
                    });
                }
            }
        }
    }

    stats.bits_discarded = framer.pending() as u64;
    if stats.bits_discarded > 0 {
        tracing::debug!(
            bits = stats.bits_discarded,
            "discarding partial frame at shutdown"
        );
    }
    Ok(stats)
}
