//! Pipeline wiring and shutdown coordination
//!
//! Runs one transmit session: capture on its own thread, the modulator's
//! encode thread, and the framer/output loop on the calling thread. The
//! teardown sequence is strict; each step depends on the one before it:
//!
//! 1. clear the run flag (stops the capture read loop and the framer)
//! 2. PTT off (stop transmitting once no more audio will be encoded)
//! 3. wait for the modulator to drain already-buffered audio
//! 4. join the capture thread
//! 5. close the audio channel
//! 6. join the modulator and observe its result
//! 7. close the bitstream channel
//!
//! The ordering keeps the key line from staying asserted past the last
//! sample and never closes the audio channel while buffered audio could
//! still be converted.

use crate::capture::{self, CaptureTask};
use crate::channel::BoundedChannel;
use crate::config::Config;
use crate::framer;
use crate::modulator::Modulator;
use crate::ptt::PttSwitch;
use anyhow::Context;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on the encoder-idle wait during teardown
const IDLE_WAIT: Duration = Duration::from_secs(30);

/// Where the capture stage pulls audio from
pub enum AudioInput<R> {
    /// Raw 16-bit LE mono samples from a byte stream (stdin)
    Stream(R),
    /// A capture device by name; `None` selects the default input device
    Device(Option<String>),
}

/// Counters from a completed session
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineReport {
    /// Samples forwarded by the capture stage
    pub samples_captured: u64,
    /// Complete frames written to the output
    pub frames_emitted: u64,
    /// Trailing bits discarded rather than emitted as a partial frame
    pub bits_discarded: u64,
}

/// One transmit session and its two channels
///
/// The channels are created with the pipeline so diagnostics and tests can
/// hold handles to them; a pipeline runs exactly one session.
pub struct Pipeline {
    audio: Arc<BoundedChannel<i16>>,
    bitstream: Arc<BoundedChannel<u8>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            audio: Arc::new(BoundedChannel::new(crate::AUDIO_CHANNEL_CAPACITY)),
            bitstream: Arc::new(BoundedChannel::new(crate::BITSTREAM_CHANNEL_CAPACITY)),
        }
    }

    /// Handle to the sample channel between capture and the modulator
    pub fn audio_channel(&self) -> Arc<BoundedChannel<i16>> {
        Arc::clone(&self.audio)
    }

    /// Handle to the bit channel between the modulator and the framer
    pub fn bitstream_channel(&self) -> Arc<BoundedChannel<u8>> {
        Arc::clone(&self.bitstream)
    }

    /// Run the session to completion: end-of-input, interrupt (run flag
    /// cleared externally), or a stage fault
    ///
    /// `running` must be true on entry and is only ever cleared here; the
    /// signal handler clears it too, and a clear that lands before the
    /// session starts simply yields an immediate, orderly teardown. The
    /// framer/output loop runs on the calling thread. All teardown steps
    /// run even when a stage faults, so no thread or channel is leaked;
    /// the first fault observed is returned after teardown completes.
    pub fn run<R, W>(
        self,
        config: &Config,
        ptt: Box<dyn PttSwitch>,
        input: AudioInput<R>,
        output: &mut W,
        running: Arc<AtomicBool>,
    ) -> anyhow::Result<PipelineReport>
    where
        R: Read + Send + 'static,
        W: Write,
    {
        config.validate().context("invalid configuration")?;

        let audio = self.audio;
        let bitstream = self.bitstream;

        let mut modulator = Modulator::new(ptt);
        let encoder = modulator.run(
            Arc::clone(&audio),
            Arc::clone(&bitstream),
            Arc::clone(&running),
        );

        // Key up before the first bit can be produced.
        let ptt_result = modulator.ptt_on();
        if let Err(ref e) = ptt_result {
            tracing::error!(error = %e, "PTT key-on failed");
        }

        let capture: anyhow::Result<CaptureTask> = match input {
            AudioInput::Stream(reader) => Ok(capture::spawn_reader(
                reader,
                Arc::clone(&audio),
                Arc::clone(&running),
            )),
            AudioInput::Device(name) => {
                capture::spawn_device(name.as_deref(), Arc::clone(&audio), Arc::clone(&running))
            }
        };

        tracing::info!(
            source = %config.source,
            mode = ?config.mode,
            "transmitting; interrupt or end of input to stop"
        );

        // Output loop on this thread; skipped if setup already failed so
        // the teardown below still runs.
        let framer_result = match (&capture, &ptt_result) {
            (Ok(_), Ok(())) => Some(framer::run_output_loop(
                &bitstream,
                output,
                config.mode,
                crate::FRAME_BITS,
                &running,
            )),
            _ => None,
        };

        // Ordered teardown; every step runs regardless of earlier faults.
        running.store(false, Ordering::SeqCst);

        if let Err(e) = modulator.ptt_off() {
            tracing::error!(error = %e, "PTT key-off failed");
        }

        if !modulator.wait_until_idle(IDLE_WAIT) {
            tracing::warn!("modulator still busy after {:?}; proceeding", IDLE_WAIT);
        }

        let (samples_captured, capture_error) = match capture {
            Ok(task) => (task.join(), None),
            Err(e) => {
                tracing::error!(error = %e, "capture setup failed");
                (0, Some(e))
            }
        };

        audio.close();

        let encode_result = encoder.join();
        if let Err(ref e) = encode_result {
            tracing::error!(error = %e, "modulator fault");
        }

        bitstream.close();

        tracing::info!(samples = samples_captured, "no longer running");

        // Report the first fault only after the teardown completed.
        ptt_result.context("PTT key-on failed")?;
        if let Some(e) = capture_error {
            return Err(e.context("capture setup failed"));
        }
        let stats = match framer_result {
            Some(result) => result.context("output stage failed")?,
            None => Default::default(),
        };
        let encode_stats = encode_result.context("modulator failed")?;

        tracing::debug!(
            samples = samples_captured,
            bits = encode_stats.bits_out,
            frames = stats.frames_emitted,
            "session complete"
        );

        Ok(PipelineReport {
            samples_captured,
            frames_emitted: stats.frames_emitted,
            bits_discarded: stats.bits_discarded,
        })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one session with freshly-created channels
pub fn run<R, W>(
    config: &Config,
    ptt: Box<dyn PttSwitch>,
    input: AudioInput<R>,
    output: &mut W,
    running: Arc<AtomicBool>,
) -> anyhow::Result<PipelineReport>
where
    R: Read + Send + 'static,
    W: Write,
{
    Pipeline::new().run(config, ptt, input, output, running)
}
