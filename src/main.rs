//! Make square avatar thumbnails, upload them, or receive them.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};

use avatarscale::{
    api::{self, AppState, DEFAULT_BODY_LIMIT},
    avatars::AvatarStore,
    decode,
    primitive::{anyhow::Context, tracing::instrument, *},
    upload::{HttpTransport, UploadSession},
    CancelToken, EncodedImage, ScaleConfig, ScalePipeline,
};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    scale: ScaleArgs,

    #[command(subcommand)]
    command: Command,
}

/// Pipeline knobs. Flags override the config file.
#[derive(Debug, Args)]
struct ScaleArgs {
    /// JSON file with `max_width`, `quality`, `max_source_pixels`
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Side of the square output, pixels
    #[arg(long, global = true)]
    max_width: Option<u32>,

    /// JPEG quality in [0, 1]
    #[arg(long, global = true)]
    quality: Option<f32>,

    /// Give up on a single image after this many milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
}

impl ScaleArgs {
    fn config(&self) -> anyhow::Result<ScaleConfig> {
        let mut config = match &self.config {
            Some(path) => ScaleConfig::from_json_file(path)?,
            None => ScaleConfig::default(),
        };
        if let Some(w) = self.max_width {
            config.max_width = w;
        }
        if let Some(q) = self.quality {
            config.quality = q;
        }
        config.validate()?;
        Ok(config)
    }

    fn cancel_token(&self) -> CancelToken {
        match self.timeout_ms {
            Some(ms) => CancelToken::with_deadline(Duration::from_millis(ms)),
            None => CancelToken::new(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the thumbnail of an image to a file
    Scale {
        input: PathBuf,
        /// Defaults to `<input stem>_thumb.jpg` next to the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Make the thumbnail and POST it as the `image` form field
    Upload {
        input: PathBuf,
        /// Where the form goes
        #[arg(long)]
        endpoint: String,
        /// Extra form fields, `key=value`
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Receive avatar uploads and serve them back
    Serve {
        /// Avatar directory
        #[arg(long, default_value = "avatars")]
        root: PathBuf,
        #[arg(long, default_value = "0.0.0.0:3000")]
        bind: SocketAddr,
        /// Largest accepted request body, bytes
        #[arg(long, default_value_t = DEFAULT_BODY_LIMIT)]
        body_limit: usize,
    },
}

fn parse_field(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {s:?}"))
}

/// Decode a file and run it through the pipeline off the async threads.
#[instrument(skip(pipeline, cancel))]
async fn thumbnail(
    input: PathBuf,
    pipeline: Arc<ScalePipeline>,
    cancel: CancelToken,
) -> anyhow::Result<EncodedImage> {
    let src = decode::decode_file(&input, pipeline.config()).await?;
    let encoded = tokio::task::spawn_blocking(move || pipeline.run_with_cancel(src, &cancel))
        .await
        .context("thumbnail: join error")??;
    Ok(encoded)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.scale.config().context("configuration")?;
    let pipeline = Arc::new(ScalePipeline::new(config)?);

    match cli.command {
        Command::Scale { input, output } => {
            let output = output.unwrap_or_else(|| {
                let stem = input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "image".to_string());
                input.with_file_name(format!("{stem}_thumb.jpg"))
            });
            let encoded = thumbnail(input, pipeline, cli.scale.cancel_token()).await?;
            tokio::fs::write(&output, &encoded.bytes)
                .await
                .with_context(|| format!("write {output:?}"))?;
            tracing::info!("wrote {output:?}");
        }
        Command::Upload {
            input,
            endpoint,
            fields,
        } => {
            let encoded = thumbnail(input, pipeline, cli.scale.cancel_token()).await?;
            let mut session =
                UploadSession::new(Arc::new(HttpTransport::default()), endpoint);
            for (k, v) in fields {
                session = session.field(k, v);
            }
            session.prepare(encoded);
            if let Some(handle) = session.submit() {
                // Don't exit before the request leaves.
                handle.await.context("upload task")?;
            }
        }
        Command::Serve {
            root,
            bind,
            body_limit,
        } => {
            let store = AvatarStore::open(&root).await?;
            tracing::info!("Serving avatars from {:?}", store.root());
            let app = api::router(AppState { store, pipeline }, body_limit);
            let listener = std::net::TcpListener::bind(bind)
                .with_context(|| format!("bind {bind}"))?;
            api::serve(listener, app).await?;
        }
    }
    Ok(())
}
