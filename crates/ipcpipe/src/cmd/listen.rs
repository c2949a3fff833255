use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use ipcpipe_frame::Payload;
use ipcpipe_pipeline::{PipeAccess, PipelineSettings};
use ipcpipe_transport::CancellationToken;
use tracing::{debug, info};

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{pipeline_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

/// How often the loop re-checks Ctrl-C and the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Messages handed from the receive worker to the printing loop at a time.
/// The worker waits while the slot is full, so it never runs ahead of output.
const HANDOFF_SLOTS: usize = 1;

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;
    let settings = PipelineSettings::default().with_discard_past_messages(args.discard_past);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    // With --count the worker stops itself after the last wanted message, so
    // later frames stay on the channel for the next reader.
    let stop = CancellationToken::new();
    let (tx, rx) = mpsc::sync_channel::<(u64, Payload)>(HANDOFF_SLOTS);
    let accepted = AtomicUsize::new(0);
    let limit = args.count;
    let worker_stop = stop.clone();

    let pipe = args
        .target
        .builder(PipeAccess::READ)
        .settings(settings)
        .stop_on(stop)
        .on_message_blocking(move |seq, payload| {
            let taken = accepted.fetch_add(1, Ordering::SeqCst) + 1;
            if limit.is_some_and(|count| taken >= count) {
                worker_stop.cancel();
            }
            let _ = tx.send((seq, payload));
        })
        .build()
        .map_err(|err| pipeline_error("open failed", err))?;
    info!(channel = %pipe.channel_name(), "listening");

    let started = Instant::now();
    let mut printed = 0usize;
    let mut outcome = Ok(SUCCESS);

    while running.load(Ordering::SeqCst) {
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                if let Some(count) = args.count {
                    outcome = Err(CliError::new(
                        TIMEOUT,
                        format!("timed out after {printed} of {count} messages"),
                    ));
                }
                break;
            }
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok((seq, payload)) => {
                print_message(pipe.channel_name(), seq, &payload, format);
                printed = printed.saturating_add(1);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(printed, frames = pipe.frames_received(), "listen finished");
    // Unblocks a worker waiting on the handoff slot before close joins it.
    drop(rx);
    pipe.close();
    outcome
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
