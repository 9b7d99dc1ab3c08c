//! CLI entry point: `mixbridge <port-name> [-v|-vv]` (spec §6).

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use mixbridge_core::ByteRing;
use mixbridge_host::ShutdownFlag;
use mixbridge_transport::{
    Diagnostics, FeedbackAccumulator,
    constants::{CAPTURE_CHANNELS, IB_FRAME_LENGTH, PLAYBACK_CHANNELS, RB_FRAME_LENGTH, SAMPLE_SIZE},
};
use mixbridge_usb::TransportOrchestrator;
use tracing_subscriber::EnvFilter;

/// Bridges a MultiMix-class USB mixer into the host audio daemon.
#[derive(Parser, Debug)]
#[command(name = "mixbridge")]
struct Cli {
    /// Name under which to register with the host audio daemon.
    port_name: String,

    /// Enable service-level diagnostic logging.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "mixbridge exiting with an error");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "mixbridge=info,mixbridge_host=info,mixbridge_usb=info,mixbridge_transport=info",
        1 => "mixbridge=debug,mixbridge_host=debug,mixbridge_usb=debug,mixbridge_transport=debug",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let raise_usb_log = cli.verbose >= 2;

    tracing::info!(port_name = %cli.port_name, "bringing up target device");
    let device = mixbridge_usb::open(raise_usb_log)?;

    let (ib_producer, ib_consumer) = ByteRing::new(IB_FRAME_LENGTH * CAPTURE_CHANNELS * SAMPLE_SIZE);
    let (rb_producer, rb_consumer) = ByteRing::new(RB_FRAME_LENGTH * PLAYBACK_CHANNELS * SAMPLE_SIZE);

    let feedback = Arc::new(FeedbackAccumulator::new());
    let diagnostics = Arc::new(Diagnostics::new());
    let shutdown = ShutdownFlag::new();

    tracing::info!("registering with host audio daemon");
    let client = mixbridge_host::service::start(&cli.port_name, ib_consumer, rb_producer, Arc::clone(&diagnostics), shutdown.clone())?;

    let orchestrator = TransportOrchestrator::new(device, ib_producer, rb_consumer, feedback, diagnostics);

    // The orchestrator's own done flag and the host daemon's shutdown
    // callback both need to be able to stop the run; wire a watcher
    // thread that forwards one into the other.
    let orchestrator_done = orchestrator.shutdown_handle();
    std::thread::spawn(move || {
        while !shutdown.is_set() {
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        orchestrator_done.store(true, std::sync::atomic::Ordering::Relaxed);
    });

    orchestrator.run();

    tracing::info!("deactivating host daemon client");
    client.deactivate()?;

    Ok(())
}
