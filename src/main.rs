//! Radiomod - Streaming digital-radio modulator
//!
//! Reads raw 16-bit LE mono audio (8000 S/s) from stdin or a capture
//! device, writes baseband symbols or a raw bitstream to stdout, and keys
//! PTT through a Linux event device for the duration of the session.

use anyhow::Result;
use radiomod::{AudioInput, Config, EventDevicePtt, NullPtt, OutputMode, PttSwitch, Verbosity};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

fn main() -> Result<()> {
    let config = match parse_args(std::env::args().skip(1).collect()) {
        Ok(Some(config)) => config,
        Ok(None) => return Ok(()),
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!();
            print_help();
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.verbosity.filter_directive().parse().unwrap()),
        )
        .init();

    config.validate()?;

    // Cooperative cancellation: the flag starts true and the handler only
    // ever clears it, so an interrupt delivered before the pipeline starts
    // is not lost. All teardown runs in the pipeline's main control flow.
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
        eprintln!("quitting");
    })?;

    let ptt: Box<dyn PttSwitch> = match EventDevicePtt::open(&config.event_device, config.key) {
        Ok(ptt) => Box::new(ptt),
        Err(e) => {
            warn!(
                device = %config.event_device,
                error = %e,
                "PTT device unavailable; running unkeyed"
            );
            Box::new(NullPtt::new())
        }
    };

    info!(
        version = radiomod::VERSION,
        built = radiomod::BUILD_DATE,
        "radiomod running; ctrl-D to break"
    );

    let input = match &config.audio_device {
        Some(name) => AudioInput::Device(Some(name.clone())),
        None => AudioInput::Stream(std::io::stdin()),
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let report = radiomod::pipeline::run(&config, ptt, input, &mut out, running)?;
    out.flush()?;

    info!(
        samples = report.samples_captured,
        frames = report.frames_emitted,
        "done"
    );
    Ok(())
}

/// Parse the option surface. `Ok(None)` means help/version was printed.
fn parse_args(args: Vec<String>) -> Result<Option<Config>, String> {
    let mut config = Config::default();
    let mut quiet = false;
    let mut verbose = false;
    let mut debug = false;

    let mut i = 0;
    while i < args.len() {
        let take_value = |i: usize| -> Result<String, String> {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} requires a value", args[i]))
        };

        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--version" | "-V" => {
                println!("radiomod {}", radiomod::VERSION);
                return Ok(None);
            }
            "--src" | "-S" => {
                config.source = take_value(i)?;
                i += 2;
                continue;
            }
            "--dest" | "-D" => {
                config.destination = take_value(i)?;
                i += 2;
                continue;
            }
            "--audio" | "-a" => {
                config.audio_device = Some(take_value(i)?);
                i += 2;
                continue;
            }
            "--event" | "-e" => {
                config.event_device = take_value(i)?;
                i += 2;
                continue;
            }
            "--key" | "-k" => {
                let value = take_value(i)?;
                config.key = value
                    .parse()
                    .map_err(|_| format!("invalid event code: {value}"))?;
                i += 2;
                continue;
            }
            "--bitstream" | "-b" => config.mode = OutputMode::Bitstream,
            "--verbose" | "-v" => verbose = true,
            "--debug" | "-d" => debug = true,
            "--quiet" | "-q" => quiet = true,
            arg => return Err(format!("unknown argument: {arg}")),
        }
        i += 1;
    }

    if u8::from(quiet) + u8::from(verbose) + u8::from(debug) > 1 {
        return Err("only one of quiet, verbose or debug may be chosen".into());
    }
    config.verbosity = if quiet {
        Verbosity::Quiet
    } else if debug {
        Verbosity::Debug
    } else if verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };

    if config.source.is_empty() {
        return Err("--src is required".into());
    }

    Ok(Some(config))
}

fn print_help() {
    println!("Read audio from STDIN and write baseband output to STDOUT");
    println!();
    println!("Usage: radiomod -S CALLSIGN [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -S, --src CALL     Transmitter identifier (your callsign), required");
    println!("  -D, --dest CALL    Destination (default is broadcast)");
    println!("  -a, --audio NAME   Capture device (default is STDIN)");
    println!("  -e, --event PATH   PTT event device node");
    println!("  -k, --key CODE     Linux event code for PTT (default 385, RADIO)");
    println!("  -b, --bitstream    Output bitstream (default is baseband)");
    println!("  -v, --verbose      Verbose output");
    println!("  -d, --debug        Debug-level output");
    println!("  -q, --quiet        Silence all output");
    println!("  -h, --help         Print this help message and exit");
    println!("  -V, --version      Print the application version and exit");
    println!();
    println!("Input must be 8000 S/s, 16-bit LE, 1 channel raw audio.");
}
