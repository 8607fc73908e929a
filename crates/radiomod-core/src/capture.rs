//! Audio capture stage
//!
//! Feeds the audio channel from either a byte stream (stdin) or a capture
//! device. The stream reader pulls one little-endian `i16` per iteration;
//! the device path runs a cpal input stream whose callback pushes into a
//! lock-free ring buffer drained by a dedicated thread, so the real-time
//! callback never touches a mutex. Either way this stage is pure I/O plus
//! flow control; no encoding logic lives here.

use crate::channel::{BoundedChannel, PutError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use std::io::{BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Generous backpressure bound for puts into the audio channel
const PUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ring buffer size for the device callback (2 s at 8000 S/s)
const RING_BUFFER_SIZE: usize = 16384;

/// How long the device drain thread sleeps when the ring is empty
const DRAIN_IDLE: Duration = Duration::from_millis(5);

/// Handle to a running capture stage
///
/// Holds the cpal stream (if any) alive for the duration of the capture;
/// joining drops the stream first so the callback stops feeding the ring
/// before the drain thread is collected.
pub struct CaptureTask {
    thread: Option<JoinHandle<u64>>,
    stream: Option<cpal::Stream>,
}

impl CaptureTask {
    /// Stop the device stream (if any) and wait for the capture thread.
    /// Returns the number of samples forwarded to the audio channel.
    pub fn join(mut self) -> u64 {
        self.stream.take();
        match self.thread.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                tracing::error!("capture thread panicked");
                0
            }),
            None => 0,
        }
    }
}

/// Spawn the stream reader thread
///
/// Reads signed 16-bit little-endian mono samples until end-of-input, a
/// read error, or the run flag clearing, then stores `running = false` so
/// the rest of the pipeline begins shutdown.
pub fn spawn_reader<R: Read + Send + 'static>(
    input: R,
    audio: Arc<BoundedChannel<i16>>,
    running: Arc<AtomicBool>,
) -> CaptureTask {
    let thread = std::thread::Builder::new()
        .name("capture".into())
        .spawn(move || {
            let mut reader = BufReader::new(input);
            let mut forwarded = 0u64;
            let mut buf = [0u8; 2];

            while running.load(Ordering::SeqCst) {
                match reader.read_exact(&mut buf) {
                    Ok(()) => {
                        let sample = i16::from_le_bytes(buf);
                        match audio.put(sample, PUT_TIMEOUT) {
                            Ok(()) => forwarded += 1,
                            Err(PutError::Timeout(_)) => {
                                tracing::warn!("audio channel full; sample dropped");
                            }
                            Err(PutError::Closed(_)) => break,
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        tracing::info!(samples = forwarded, "end of input");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "input read failed");
                        break;
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            forwarded
        })
        .expect("failed to spawn capture thread");

    CaptureTask {
        thread: Some(thread),
        stream: None,
    }
}

/// Open a capture device and spawn the drain thread
///
/// The stream callback converts `f32` frames to mono `i16` and pushes into
/// a ring buffer; stream errors are forwarded over a bounded event channel
/// and end the capture. `device_name = None` selects the default input
/// device.
pub fn spawn_device(
    device_name: Option<&str>,
    audio: Arc<BoundedChannel<i16>>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<CaptureTask> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow::anyhow!("capture device not found: {name}"))?,
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("no default capture device"))?,
    };
    let resolved_name = device.name().unwrap_or_else(|_| "unknown".into());

    let channels = device
        .default_input_config()
        .map(|c| c.channels())
        .unwrap_or(1) as usize;
    let config = StreamConfig {
        channels: channels as u16,
        sample_rate: crate::SAMPLE_RATE as SampleRate,
        buffer_size: cpal::BufferSize::Default,
    };

    let ring = HeapRb::<i16>::new(RING_BUFFER_SIZE);
    let (mut producer, mut consumer) = ring.split();
    let (error_tx, error_rx) = crossbeam_channel::bounded::<cpal::StreamError>(8);

    let callback_running = Arc::clone(&running);
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if !callback_running.load(Ordering::Relaxed) {
                return;
            }
            for frame in data.chunks(channels) {
                if let Some(&sample) = frame.first() {
                    let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    let _ = producer.try_push(quantized);
                }
            }
        },
        move |err| {
            let _ = error_tx.try_send(err);
        },
        None,
    )?;
    stream.play()?;

    tracing::info!(
        device = %resolved_name,
        rate = crate::SAMPLE_RATE,
        channels,
        "capture device started"
    );

    let thread = std::thread::Builder::new()
        .name("capture".into())
        .spawn(move || {
            let mut forwarded = 0u64;

            while running.load(Ordering::SeqCst) {
                if let Ok(err) = error_rx.try_recv() {
                    tracing::error!(error = %err, "capture stream failed");
                    break;
                }

                let mut drained = false;
                while let Some(sample) = consumer.try_pop() {
                    drained = true;
                    match audio.put(sample, PUT_TIMEOUT) {
                        Ok(()) => forwarded += 1,
                        Err(PutError::Timeout(_)) => {
                            tracing::warn!("audio channel full; sample dropped");
                        }
                        Err(PutError::Closed(_)) => {
                            running.store(false, Ordering::SeqCst);
                            return forwarded;
                        }
                    }
                }
                if !drained {
                    std::thread::sleep(DRAIN_IDLE);
                }
            }

            running.store(false, Ordering::SeqCst);
            forwarded
        })
        .expect("failed to spawn capture thread");

    Ok(CaptureTask {
        thread: Some(thread),
        stream: Some(stream),
    })
}
