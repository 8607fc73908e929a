//! Modulator adapter: audio samples in, channel bits out
//!
//! Bridges the audio channel to the bitstream channel on a dedicated encode
//! thread and owns the PTT lifecycle. The voice-encoding stage proper is a
//! black box to the rest of the pipeline; here it is a deterministic sign
//! slicer (one bit per sample, negative sample -> 1), which keeps the
//! framing and shutdown behavior fully exercisable. All-zero audio yields
//! all-zero bits.
//!
//! Symbol mapping follows the 4-level dibit convention used by 4-FSK
//! digital voice modes: 00 -> +1, 01 -> +3, 10 -> -1, 11 -> -3, scaled by
//! [`crate::SYMBOL_GAIN`] to a 16-bit amplitude.

use crate::channel::{BoundedChannel, GetError, PutError};
use crate::ptt::PttSwitch;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// How long the encode thread waits for the next audio sample before
/// declaring itself idle and polling again
const ENCODE_POLL: Duration = Duration::from_millis(100);

/// Per-attempt timeout when pushing a bit downstream
const BIT_PUT_TIMEOUT: Duration = Duration::from_millis(250);

/// Consecutive bit-put timeouts tolerated while running before the encode
/// thread gives up (5 s of stalled downstream)
const BIT_PUT_RETRIES: u32 = 20;

/// Dibit-to-amplitude map: 00, 01, 10, 11
const SYMBOL_MAP: [i16; 4] = [1, 3, -1, -3];

/// Errors surfaced through [`ModulatorHandle::join`]
#[derive(Debug, Error)]
pub enum ModulatorError {
    /// The bitstream channel stayed full past the retry budget while the
    /// pipeline was still running
    #[error("bitstream channel stalled for {stalled_for:?} while running")]
    BitstreamStalled { stalled_for: Duration },

    /// The encode thread could not be joined
    #[error("encode thread panicked")]
    ThreadPanicked,
}

/// Counters reported by the encode thread on completion
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeStats {
    /// Samples consumed from the audio channel
    pub samples_in: u64,
    /// Bits delivered to the bitstream channel
    pub bits_out: u64,
    /// Bits discarded after the run flag cleared (downstream gone)
    pub bits_discarded: u64,
}

/// Quantize one PCM sample to a single channel bit
#[inline]
pub fn slice_bit(sample: i16) -> u8 {
    u8::from(sample < 0)
}

/// Map one full frame of bits to its baseband amplitude symbols
///
/// Consumes the bits two at a time, most-significant bit first. The frame
/// length must be even; [`crate::FRAME_BITS`] frames yield
/// [`crate::SYMBOLS_PER_FRAME`] symbols.
pub fn bits_to_symbols(frame: &[u8]) -> Vec<i16> {
    debug_assert!(frame.len() % 2 == 0, "frame must hold an even bit count");
    frame
        .chunks_exact(2)
        .map(|dibit| {
            let index = ((dibit[0] & 1) << 1 | (dibit[1] & 1)) as usize;
            SYMBOL_MAP[index] * crate::SYMBOL_GAIN
        })
        .collect()
}

/// Idle barrier between the encode thread and the shutdown coordinator
#[derive(Default)]
struct IdleLatch {
    busy: Mutex<bool>,
    cv: Condvar,
}

impl IdleLatch {
    fn set_busy(&self, busy: bool) {
        let mut guard = self.busy.lock().expect("idle latch poisoned");
        if *guard != busy {
            *guard = busy;
            if !busy {
                self.cv.notify_all();
            }
        }
    }

    /// Wait until the encode thread reports idle, with an upper bound.
    /// Returns false if the bound elapsed first.
    fn wait_idle(&self, timeout: Duration) -> bool {
        let guard = self.busy.lock().expect("idle latch poisoned");
        let (guard, result) = self
            .cv
            .wait_timeout_while(guard, timeout, |busy| *busy)
            .expect("idle latch poisoned");
        drop(guard);
        !result.timed_out()
    }
}

/// Handle to the running encode thread; joining it is the completion future
pub struct ModulatorHandle {
    thread: Option<JoinHandle<Result<EncodeStats, ModulatorError>>>,
}

impl ModulatorHandle {
    /// Wait for the encode thread to finish and observe its outcome
    pub fn join(mut self) -> Result<EncodeStats, ModulatorError> {
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| ModulatorError::ThreadPanicked)?,
            None => Ok(EncodeStats::default()),
        }
    }
}

/// Encoder adapter owning the PTT switch and the encode thread
pub struct Modulator {
    ptt: Box<dyn PttSwitch>,
    idle: Arc<IdleLatch>,
}

impl Modulator {
    pub fn new(ptt: Box<dyn PttSwitch>) -> Self {
        Self {
            ptt,
            idle: Arc::new(IdleLatch::default()),
        }
    }

    /// Key the transmitter. Call exactly once, before the first bit is due.
    pub fn ptt_on(&mut self) -> io::Result<()> {
        self.ptt.set(true)
    }

    /// Unkey the transmitter. Call exactly once, after the audio channel
    /// will receive no further samples.
    pub fn ptt_off(&mut self) -> io::Result<()> {
        self.ptt.set(false)
    }

    /// Block until every already-buffered sample has been converted to
    /// bits. Returns false if the bound elapsed with work still pending.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.idle.wait_idle(timeout)
    }

    /// Start the encode thread. It runs until the audio channel is closed
    /// and drained; any internal fault is observed at
    /// [`ModulatorHandle::join`].
    pub fn run(
        &self,
        audio: Arc<BoundedChannel<i16>>,
        bitstream: Arc<BoundedChannel<u8>>,
        running: Arc<AtomicBool>,
    ) -> ModulatorHandle {
        let idle = Arc::clone(&self.idle);

        let thread = std::thread::Builder::new()
            .name("encode".into())
            .spawn(move || encode_loop(&audio, &bitstream, &running, &idle))
            .expect("failed to spawn encode thread");

        ModulatorHandle {
            thread: Some(thread),
        }
    }
}

fn encode_loop(
    audio: &BoundedChannel<i16>,
    bitstream: &BoundedChannel<u8>,
    running: &AtomicBool,
    idle: &IdleLatch,
) -> Result<EncodeStats, ModulatorError> {
    let mut stats = EncodeStats::default();
    let result = loop {
        match audio.get(ENCODE_POLL) {
            Ok(sample) => {
                idle.set_busy(true);
                stats.samples_in += 1;
                match push_bit(bitstream, slice_bit(sample), running) {
                    PushOutcome::Delivered => stats.bits_out += 1,
                    PushOutcome::Discarded => stats.bits_discarded += 1,
                    PushOutcome::Stalled => {
                        break Err(ModulatorError::BitstreamStalled {
                            stalled_for: BIT_PUT_TIMEOUT * BIT_PUT_RETRIES,
                        });
                    }
                }
            }
            Err(GetError::Timeout) => {
                // Nothing buffered; safe point for wait_until_idle.
                idle.set_busy(false);
            }
            Err(GetError::Closed) => {
                tracing::debug!(
                    samples = stats.samples_in,
                    bits = stats.bits_out,
                    "audio channel closed; encoder finished"
                );
                break Ok(stats);
            }
        }
    };
    idle.set_busy(false);
    result
}

enum PushOutcome {
    Delivered,
    Discarded,
    Stalled,
}

fn push_bit(bitstream: &BoundedChannel<u8>, bit: u8, running: &AtomicBool) -> PushOutcome {
    let mut item = bit;
    for attempt in 0..BIT_PUT_RETRIES {
        match bitstream.put(item, BIT_PUT_TIMEOUT) {
            Ok(()) => return PushOutcome::Delivered,
            Err(PutError::Closed(_)) => return PushOutcome::Discarded,
            Err(PutError::Timeout(rejected)) => {
                if !running.load(Ordering::SeqCst) {
                    // Consumer has shut down; keep draining audio but stop
                    // accumulating undeliverable bits.
                    return PushOutcome::Discarded;
                }
                item = rejected;
                if attempt == 0 {
                    tracing::warn!("bitstream channel full; output stage stalled");
                }
            }
        }
    }
    PushOutcome::Stalled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FRAME_BITS, SYMBOLS_PER_FRAME, SYMBOL_GAIN};

    #[test]
    fn test_slice_bit_is_sign() {
        assert_eq!(slice_bit(0), 0);
        assert_eq!(slice_bit(1), 0);
        assert_eq!(slice_bit(i16::MAX), 0);
        assert_eq!(slice_bit(-1), 1);
        assert_eq!(slice_bit(i16::MIN), 1);
    }

    #[test]
    fn test_all_zero_frame_maps_to_plus_one() {
        let frame = vec![0u8; FRAME_BITS];
        let symbols = bits_to_symbols(&frame);
        assert_eq!(symbols.len(), SYMBOLS_PER_FRAME);
        assert!(symbols.iter().all(|&s| s == SYMBOL_GAIN));
    }

    #[test]
    fn test_dibit_map() {
        let symbols = bits_to_symbols(&[0, 0, 0, 1, 1, 0, 1, 1]);
        assert_eq!(
            symbols,
            vec![
                SYMBOL_GAIN,
                3 * SYMBOL_GAIN,
                -SYMBOL_GAIN,
                -3 * SYMBOL_GAIN
            ]
        );
    }

    #[test]
    fn test_encode_thread_converts_and_drains() {
        let audio = Arc::new(BoundedChannel::new(64));
        let bits = Arc::new(BoundedChannel::new(64));
        let running = Arc::new(AtomicBool::new(true));

        let modulator = Modulator::new(Box::new(crate::NullPtt::new()));
        let handle = modulator.run(Arc::clone(&audio), Arc::clone(&bits), Arc::clone(&running));

        for sample in [100i16, -100, 0, -1] {
            audio.put(sample, Duration::from_secs(1)).unwrap();
        }
        audio.close();

        let stats = handle.join().unwrap();
        assert_eq!(stats.samples_in, 4);
        assert_eq!(stats.bits_out, 4);

        let mut out = Vec::new();
        while let Ok(bit) = bits.get(Duration::from_millis(50)) {
            out.push(bit);
        }
        assert_eq!(out, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_wait_until_idle_observes_drained_encoder() {
        let audio = Arc::new(BoundedChannel::new(64));
        let bits = Arc::new(BoundedChannel::new(256));
        let running = Arc::new(AtomicBool::new(true));

        let modulator = Modulator::new(Box::new(crate::NullPtt::new()));
        let handle = modulator.run(Arc::clone(&audio), Arc::clone(&bits), Arc::clone(&running));

        for _ in 0..128 {
            audio.put(-5i16, Duration::from_secs(1)).unwrap();
        }
        assert!(modulator.wait_until_idle(Duration::from_secs(5)));
        assert_eq!(bits.len(), 128);

        audio.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_bits_discarded_once_stopped() {
        let audio = Arc::new(BoundedChannel::new(64));
        // Tiny bitstream channel with no consumer
        let bits = Arc::new(BoundedChannel::new(2));
        let running = Arc::new(AtomicBool::new(false));

        let modulator = Modulator::new(Box::new(crate::NullPtt::new()));
        let handle = modulator.run(Arc::clone(&audio), Arc::clone(&bits), Arc::clone(&running));

        for _ in 0..8 {
            audio.put(1i16, Duration::from_secs(1)).unwrap();
        }
        audio.close();

        let stats = handle.join().unwrap();
        assert_eq!(stats.samples_in, 8);
        assert_eq!(stats.bits_out + stats.bits_discarded, 8);
        assert!(stats.bits_discarded >= 6);
    }
}
