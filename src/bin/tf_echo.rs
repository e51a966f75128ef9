//! TF Echo
//!
//! Subscribes to the given frames through the TF republishing service and
//! logs every transform received until Ctrl+C.

#[cfg(feature = "zenoh-integration")]
use {
    anyhow::Context,
    clap::Parser,
    std::sync::Arc,
    tfclient::{TfClient, TfClientConfig, Transform, TransformCallback, ZenohConnection},
    tracing::info,
};

#[cfg(feature = "zenoh-integration")]
#[derive(Parser)]
#[command(name = "tf_echo")]
#[command(about = "Print transforms of the given frames relative to the fixed frame")]
#[command(version)]
struct Args {
    /// Path to the TF client configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the fixed frame from the configuration
    #[arg(short, long)]
    fixed_frame: Option<String>,

    /// Frames to watch
    #[arg(required = true)]
    frames: Vec<String>,
}

#[cfg(feature = "zenoh-integration")]
impl Args {
    fn load_config(&self) -> anyhow::Result<TfClientConfig> {
        let mut config = match &self.config {
            Some(path) => TfClientConfig::load_from_path(path)
                .with_context(|| format!("Failed to load configuration from {}", path))?,
            None => TfClientConfig::default(),
        };
        if let Some(fixed_frame) = &self.fixed_frame {
            config.fixed_frame = fixed_frame.clone();
        }
        Ok(config)
    }
}

#[cfg(feature = "zenoh-integration")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let config = args.load_config()?;
    info!("Watching {} frame(s) relative to {}", args.frames.len(), config.fixed_frame);

    let connection = Arc::new(ZenohConnection::new().await?);
    let client = TfClient::new(connection, config)?;

    for frame in &args.frames {
        let name = frame.clone();
        let callback: TransformCallback = Arc::new(move |tf: &Transform| {
            info!(
                "{}: translation=[{:.3}, {:.3}, {:.3}] rotation=[{:.3}, {:.3}, {:.3}, {:.3}]",
                name,
                tf.translation.x,
                tf.translation.y,
                tf.translation.z,
                tf.rotation.x,
                tf.rotation.y,
                tf.rotation.z,
                tf.rotation.w
            );
        });
        client.subscribe(frame, callback);
    }

    info!("Listening for transforms... (Ctrl+C to stop)");
    tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl+C")?;

    // Release the stream before exiting; callbacks die with the client
    client.shutdown().await?;
    info!("TF echo stopped");
    Ok(())
}

#[cfg(not(feature = "zenoh-integration"))]
fn main() {
    eprintln!("This tool requires the zenoh-integration feature.");
    eprintln!("Run with: cargo run --bin tf_echo --features zenoh-integration -- <frames>");
    std::process::exit(1);
}
