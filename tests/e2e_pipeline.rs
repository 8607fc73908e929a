//! E2E tests for the full pipeline and its shutdown sequence
//!
//! Drives complete sessions through `pipeline::run` with in-memory input
//! and output, and verifies the interrupt behavior: PTT keyed exactly once
//! each way, PTT deasserted before the run returns, output in whole frames
//! only, and a successful result.

use radiomod::pipeline;
use radiomod::{AudioInput, BoundedChannel, Config, OutputMode, Pipeline, PttSwitch, FRAME_BITS};
use std::io::{Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// PTT switch that records every transition for later inspection
#[derive(Clone, Default)]
struct RecordingPtt {
    transitions: Arc<Mutex<Vec<bool>>>,
}

impl RecordingPtt {
    fn transitions(&self) -> Vec<bool> {
        self.transitions.lock().unwrap().clone()
    }
}

impl PttSwitch for RecordingPtt {
    fn set(&mut self, keyed: bool) -> std::io::Result<()> {
        self.transitions.lock().unwrap().push(keyed);
        Ok(())
    }
}

/// PTT switch that snapshots the channel close states at each transition
struct ChannelWatchingPtt {
    audio: Arc<BoundedChannel<i16>>,
    bitstream: Arc<BoundedChannel<u8>>,
    seen: Arc<Mutex<Vec<(bool, bool, bool)>>>,
}

impl PttSwitch for ChannelWatchingPtt {
    fn set(&mut self, keyed: bool) -> std::io::Result<()> {
        self.seen.lock().unwrap().push((
            keyed,
            self.audio.is_closed(),
            self.bitstream.is_closed(),
        ));
        Ok(())
    }
}

/// Write sink shareable across the pipeline thread and the test
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Endless silence source, throttled so a test interrupt arrives while
/// capture is mid-stream
struct ThrottledSilence;

impl Read for ThrottledSilence {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        thread::sleep(Duration::from_millis(1));
        let n = buf.len().min(64);
        buf[..n].fill(0);
        Ok(n)
    }
}

fn config(mode: OutputMode) -> Config {
    Config {
        source: "N0CALL".into(),
        mode,
        ..Config::default()
    }
}

fn le_samples(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// A complete end-of-input session succeeds, keys PTT on then off, and
/// emits whole frames only
#[test]
fn test_end_of_input_session() {
    let ptt = RecordingPtt::default();
    let input = le_samples(&vec![-100i16; FRAME_BITS * 4 + 31]);
    let mut out = Vec::new();
    let running = Arc::new(AtomicBool::new(true));

    let report = pipeline::run(
        &config(OutputMode::Bitstream),
        Box::new(ptt.clone()),
        AudioInput::Stream(Cursor::new(input)),
        &mut out,
        running,
    )
    .unwrap();

    assert_eq!(report.samples_captured, (FRAME_BITS * 4 + 31) as u64);
    assert_eq!(ptt.transitions(), vec![true, false]);
    assert_eq!(out.len() % FRAME_BITS, 0);
    assert!(out.iter().all(|&b| b == 0x01));
}

/// Interrupt mid-capture: the run flag is cleared externally, the session
/// winds down with PTT deasserted, no partial frame, and a success result
#[test]
fn test_interrupt_mid_capture() {
    let ptt = RecordingPtt::default();
    let out = SharedBuf::default();
    let running = Arc::new(AtomicBool::new(true));

    let thread_ptt = ptt.clone();
    let mut thread_out = out.clone();
    let thread_running = Arc::clone(&running);
    let session = thread::spawn(move || {
        pipeline::run(
            &config(OutputMode::Bitstream),
            Box::new(thread_ptt),
            AudioInput::Stream(ThrottledSilence),
            &mut thread_out,
            thread_running,
        )
    });

    // Let capture get going, then simulate the interrupt.
    thread::sleep(Duration::from_millis(300));
    running.store(false, Ordering::SeqCst);

    let report = session.join().unwrap().expect("interrupted run succeeds");
    assert!(report.samples_captured > 0);
    assert_eq!(
        ptt.transitions(),
        vec![true, false],
        "PTT keyed exactly once each way"
    );

    let bytes = out.contents();
    assert_eq!(bytes.len() % FRAME_BITS, 0, "no partial frame emitted");
    assert!(
        bytes.iter().all(|&b| b == 0x00),
        "silence slices to zero bits"
    );
}

/// PTT is deasserted by the time the run returns, in both modes
#[test]
fn test_ptt_deasserted_after_run() {
    for mode in [OutputMode::Baseband, OutputMode::Bitstream] {
        let ptt = RecordingPtt::default();
        let input = le_samples(&vec![50i16; FRAME_BITS]);
        let mut out = Vec::new();

        pipeline::run(
            &config(mode),
            Box::new(ptt.clone()),
            AudioInput::Stream(Cursor::new(input)),
            &mut out,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();

        let transitions = ptt.transitions();
        assert_eq!(transitions.first(), Some(&true));
        assert_eq!(transitions.last(), Some(&false));
        assert_eq!(transitions.len(), 2);
    }
}

/// Teardown order: PTT is released while both channels are still open, the
/// audio channel closes before the bitstream channel, and every bit the
/// encoder produced is accounted for downstream
#[test]
fn test_shutdown_closes_channels_after_ptt_release() {
    let session = Pipeline::new();
    let audio = session.audio_channel();
    let bitstream = session.bitstream_channel();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let ptt = ChannelWatchingPtt {
        audio: Arc::clone(&audio),
        bitstream: Arc::clone(&bitstream),
        seen: Arc::clone(&seen),
    };

    // A few frames plus a tail, so some bits are still in flight at the
    // end of input.
    let n = FRAME_BITS * 3 + 5;
    let input = le_samples(&vec![-7i16; n]);
    let mut out = Vec::new();

    let report = session
        .run(
            &config(OutputMode::Bitstream),
            Box::new(ptt),
            AudioInput::Stream(Cursor::new(input)),
            &mut out,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![(true, false, false), (false, false, false)],
        "both PTT transitions happen while both channels are open"
    );

    assert!(audio.is_closed(), "audio channel closed by teardown");
    assert!(bitstream.is_closed(), "bitstream channel closed by teardown");

    // The audio channel closed before the bitstream channel: bits produced
    // after the output stage stopped were still accepted downstream, so
    // output, discards and channel leftovers add up to one bit per sample.
    let mut leftover = 0usize;
    while bitstream.get(Duration::from_millis(10)).is_ok() {
        leftover += 1;
    }
    assert_eq!(out.len() + report.bits_discarded as usize + leftover, n);
}

/// A capture device that cannot be opened fails the run, after PTT has
/// been released and the teardown completed
#[test]
fn test_capture_device_failure_fails_run() {
    let ptt = RecordingPtt::default();
    let mut out = Vec::new();

    let result = pipeline::run(
        &config(OutputMode::Bitstream),
        Box::new(ptt.clone()),
        AudioInput::<Cursor<Vec<u8>>>::Device(Some("no-such-capture-device".into())),
        &mut out,
        Arc::new(AtomicBool::new(true)),
    );

    assert!(result.is_err(), "bad capture device must not report success");
    assert_eq!(ptt.transitions(), vec![true, false], "teardown still runs");
    assert!(out.is_empty());
}

/// Baseband output is always a whole number of 2-byte symbols per frame
#[test]
fn test_baseband_output_granularity() {
    let input = le_samples(&vec![-1i16; FRAME_BITS * 8]);
    let mut out = Vec::new();

    pipeline::run(
        &config(OutputMode::Baseband),
        Box::new(RecordingPtt::default()),
        AudioInput::Stream(Cursor::new(input)),
        &mut out,
        Arc::new(AtomicBool::new(true)),
    )
    .unwrap();

    // Each frame is SYMBOLS_PER_FRAME symbols of 2 bytes
    assert_eq!(out.len() % (radiomod::SYMBOLS_PER_FRAME * 2), 0);
}

/// An oversized identifier is rejected before any stage starts
#[test]
fn test_invalid_config_rejected_up_front() {
    let ptt = RecordingPtt::default();
    let mut out = Vec::new();

    let result = pipeline::run(
        &Config {
            source: "CALLSIGNTOOLONG".into(),
            ..Config::default()
        },
        Box::new(ptt.clone()),
        AudioInput::Stream(Cursor::new(le_samples(&[1i16; 16]))),
        &mut out,
        Arc::new(AtomicBool::new(true)),
    );

    assert!(result.is_err());
    assert!(ptt.transitions().is_empty(), "PTT never touched");
    assert!(out.is_empty());
}
