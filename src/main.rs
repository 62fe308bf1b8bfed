//! Camera-view-bridge host: serves the method channel over stdio.
//!
//! Frames are read from stdin one per line; replies and events are written
//! to stdout one per line. Logs go to stderr.

use std::io;

use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camera_view_bridge::channel::{self, Inbound};
use camera_view_bridge::traits;
use camera_view_bridge::{
    MethodCall, Reply, Services, V4l2Config, V4l2Library, ViewFactory, ViewId, ViewOptions,
};

#[derive(Parser, Debug)]
#[command(name = "camera-view-bridge")]
#[command(about = "Embedded camera views over a line-delimited JSON method channel")]
struct Cli {
    /// Device index of the front camera (/dev/videoN)
    #[arg(long, env = "CAMERA_FRONT_DEVICE", default_value_t = 0)]
    front: usize,

    /// Device index of the back camera
    #[arg(long, env = "CAMERA_BACK_DEVICE")]
    back: Option<usize>,

    /// mmap buffers per capture stream
    #[arg(long, default_value_t = 4)]
    buffers: u32,

    /// Frames dropped before a still is taken
    #[arg(long, default_value_t = 5)]
    warmup_frames: u32,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("camera_view_bridge=info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run(cli: Cli) -> io::Result<()> {
    let config = V4l2Config {
        front: cli.front,
        back: cli.back,
        buffers: cli.buffers,
        warmup_frames: cli.warmup_frames,
    };
    info!(?config, "starting camera view host");

    let builder = move |_view: ViewId, _options: &ViewOptions| -> traits::Result<V4l2Library> {
        Ok(V4l2Library::new(config.clone()))
    };
    let (mut factory, mut events) = ViewFactory::new(builder, Services::default());

    let (out, mut outbound) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = outbound.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !line.trim().is_empty() {
                    handle_frame(&mut factory, &line, &out);
                }
            }
            Some(event) = events.recv() => {
                let _ = out.send(channel::encode_event(&event));
            }
        }
    }

    info!(views = factory.len(), "stdin closed, shutting down");
    factory.dispose_all();
    drop(out);
    writer.await.map_err(io::Error::other)?
}

fn handle_frame<B>(
    factory: &mut ViewFactory<V4l2Library, B>,
    line: &str,
    out: &mpsc::UnboundedSender<String>,
) where
    B: FnMut(ViewId, &ViewOptions) -> traits::Result<V4l2Library>,
{
    let frame = match channel::decode(line) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(%err, "dropping malformed frame");
            let _ = out.send(channel::encode_malformed(&err));
            return;
        }
    };

    let id = frame.id();
    let reply = match frame {
        Inbound::Create { view, params, .. } => {
            Reply::from(factory.create(view, &params).map(|()| Value::Null))
        }
        Inbound::Dispose { view, .. } => Reply::from(factory.dispose(view).map(|()| Value::Null)),
        Inbound::Call {
            view,
            method,
            arguments,
            ..
        } => match factory.call(view, MethodCall::new(method, arguments)) {
            Ok(pending) => {
                let out = out.clone();
                tokio::spawn(async move {
                    let reply = pending.await;
                    let _ = out.send(channel::encode_reply(id, &reply));
                });
                return;
            }
            Err(err) => Reply::from(Err(err)),
        },
    };
    let _ = out.send(channel::encode_reply(id, &reply));
}
