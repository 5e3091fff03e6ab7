use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use layerscope::config::{Config, LoggingConfig};
use layerscope::image::{Image, ImageOptions, LayerStack, WithTags};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Inspect the squashed filesystem of a layered container image
#[derive(Parser)]
#[command(name = "layerscope")]
struct Cli {
    /// Layer archives (tar or tar.gz), bottom layer first
    #[arg(required = true)]
    layers: Vec<PathBuf>,

    /// Tag recorded on the image; may be repeated
    #[arg(long)]
    tag: Vec<String>,

    /// Print the squashed content of one path instead of the tree
    #[arg(long, value_name = "PATH")]
    cat: Option<String>,

    /// Print the squashed tree as JSON lines
    #[arg(long, conflicts_with = "cat")]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_tracing(&config.logging);

    let stack = LayerStack::from_files(&cli.layers)?;
    let mut image = Image::new(Arc::new(stack), ImageOptions::from_config(&config))?;
    if !cli.tag.is_empty() {
        image = image.with_override(WithTags(cli.tag.clone()));
    }
    image.read()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Some(path) = cli.cat {
        let mut content = image
            .file_contents_from_squash(&path)?
            .ok_or_else(|| anyhow!("{path}: not found in image"))?;
        io::copy(&mut content, &mut out)?;
        return Ok(());
    }

    let layer_of: HashMap<&str, usize> =
        image.layers().iter().map(|layer| (layer.digest(), layer.index())).collect();

    if !cli.json {
        writeln!(out, "# {}", image.ids().join(" "))?;
    }
    for node in image.squashed_tree()?.nodes() {
        if cli.json {
            serde_json::to_writer(&mut out, node)?;
            writeln!(out)?;
            continue;
        }
        let layer = layer_of
            .get(node.metadata.layer_digest.as_str())
            .map_or_else(|| "-".to_string(), |index| index.to_string());
        match &node.link_target {
            Some(target) => writeln!(out, "{layer}\t{}\t{} -> {target}", node.kind, node.path())?,
            None => writeln!(out, "{layer}\t{}\t{}", node.kind, node.path())?,
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| logging.filter.as_str().into());

    tracing_subscriber::registry()
        .with(filter)
        .with(logging.json.then(|| fmt::layer().json().with_writer(io::stderr)))
        .with((!logging.json).then(|| fmt::layer().with_writer(io::stderr)))
        .init();
}
