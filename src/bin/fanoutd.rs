//! Broadcast records read from standard input
//!
//! Usage:
//!   printf 'a\nb\n' | fanoutd tcp:9000 'unix:/tmp/feed.sock;secondary' --cache 10
//!
//! Subscribe with:
//!   nc localhost 9000
//!
//! Logs go to standard error (`RUST_LOG` controls the level) so standard
//! output stays free for `--report-clients` lines.

use bytes::{Bytes, BytesMut};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use fanout_rs::{Broadcaster, BroadcasterConfig, Framing};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How often the accept loop is checked while input is idle
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Records buffered between the stdin reader and the writer
const READ_AHEAD: usize = 64;

#[derive(Debug, Parser)]
#[command(name = "fanoutd", version, about = "Broadcast stdin records to socket subscribers")]
struct Args {
    /// Endpoint specs: `<address>[;primary|;secondary]`, e.g. `tcp:9000`
    #[arg(required = true)]
    endpoints: Vec<String>,

    /// Fixed record size in bytes (0 = newline-terminated records)
    #[arg(short = 's', long, default_value_t = 0)]
    record_size: usize,

    /// Drop records for subscribers that cannot keep up
    #[arg(short, long)]
    discard: bool,

    /// Flush after every record
    #[arg(short, long)]
    flush: bool,

    /// Print a CSV line to stdout whenever client counts change
    #[arg(short = 'r', long)]
    report_clients: bool,

    /// Exit once every subscriber has disconnected
    #[arg(short = 'x', long)]
    exit_on_drain: bool,

    /// Number of recent records replayed to new subscribers
    #[arg(short, long, default_value_t = 0)]
    cache: usize,

    /// Accept loop poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,

    /// Drop a blocking subscriber after this many milliseconds stalled
    #[arg(long, default_value_t = 5000)]
    write_timeout_ms: u64,
}

impl Args {
    fn config(&self) -> BroadcasterConfig {
        BroadcasterConfig::with_endpoints(self.endpoints.iter().cloned())
            .record_size(self.record_size)
            .discard_when_full(self.discard)
            .flush_after_write(self.flush)
            .report_client_counts(self.report_clients)
            .exit_on_drain(self.exit_on_drain)
            .cache_size(self.cache)
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
            .write_timeout(Duration::from_millis(self.write_timeout_ms))
    }
}

/// Why the write loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    EndOfInput,
    Drained,
    Signal,
    AcceptLoopStopped,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fanout_rs=info,fanoutd=info")),
        )
        .with_writer(io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(args));
    // A blocked stdin read cannot be cancelled
    runtime.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fanoutd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), BoxError> {
    let config = args.config();
    let framing = Framing::from_record_size(config.record_size);
    let broadcaster = Arc::new(Broadcaster::new(config)?);

    for (index, endpoint) in broadcaster.endpoints().iter().enumerate() {
        tracing::info!(
            index,
            endpoint = %endpoint.address,
            role = ?endpoint.role,
            local_addr = broadcaster.local_addr(index).unwrap_or_default(),
            "Endpoint configured"
        );
    }

    let (stop, written) = pump(&broadcaster, framing).await?;
    tracing::info!(reason = ?stop, records = written, "Stopping");

    match Arc::try_unwrap(broadcaster) {
        Ok(broadcaster) => broadcaster.shutdown()?,
        Err(_) => tracing::debug!("Broadcaster still shared, closing on last drop"),
    }

    if stop == Stop::AcceptLoopStopped {
        return Err("accept loop stopped".into());
    }
    Ok(())
}

/// Feed records into the broadcaster until something says stop
///
/// Writes run on the blocking pool and are awaited inside the loop body, so
/// no write is in flight once this returns.
async fn pump(broadcaster: &Arc<Broadcaster>, framing: Framing) -> Result<(Stop, u64), BoxError> {
    let mut records = spawn_reader(tokio::io::stdin(), framing);
    let mut health = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    let signal = shutdown_signal();
    tokio::pin!(signal);

    let mut written = 0u64;
    let stop = loop {
        tokio::select! {
            record = records.recv() => {
                let Some(record) = record else {
                    break Stop::EndOfInput;
                };
                let record = record?;

                let writer = Arc::clone(broadcaster);
                let open = tokio::task::spawn_blocking(move || writer.write(record)).await?;
                written += 1;
                if !open {
                    break Stop::Drained;
                }
            }
            _ = health.tick() => {
                if !broadcaster.is_accepting() {
                    break Stop::AcceptLoopStopped;
                }
            }
            result = &mut signal => {
                result?;
                break Stop::Signal;
            }
        }
    };

    Ok((stop, written))
}

/// Read records on a task of their own
///
/// The channel closes at end of input; a read error is sent as the last item.
fn spawn_reader<R>(input: R, framing: Framing) -> mpsc::Receiver<io::Result<Bytes>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(READ_AHEAD);

    tokio::spawn(async move {
        let mut input = BufReader::new(input);
        loop {
            let record = match framing {
                Framing::Line => read_line(&mut input).await,
                Framing::Packet(size) => read_packet(&mut input, size).await,
            };

            let item = match record {
                Ok(Some(record)) => Ok(record),
                Ok(None) => break,
                Err(e) => Err(e),
            };
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });

    rx
}

/// One newline-terminated record, newline included
///
/// A final line without a newline is still a record.
async fn read_line<R: AsyncRead + Unpin>(input: &mut BufReader<R>) -> io::Result<Option<Bytes>> {
    let mut line = Vec::new();
    match input.read_until(b'\n', &mut line).await? {
        0 => Ok(None),
        _ => Ok(Some(Bytes::from(line))),
    }
}

/// One fixed-size record; the last one may be short
async fn read_packet<R: AsyncRead + Unpin>(
    input: &mut BufReader<R>,
    size: usize,
) -> io::Result<Option<Bytes>> {
    let mut packet = BytesMut::zeroed(size);
    let mut filled = 0;
    while filled < size {
        match input.read(&mut packet[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }

    if filled == 0 {
        return Ok(None);
    }
    packet.truncate(filled);
    Ok(Some(packet.freeze()))
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => tracing::info!("Received SIGINT"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
    }
    Ok(())
}
