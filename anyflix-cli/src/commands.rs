//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyflix_core::AnyflixConfig;
use anyflix_core::tracing_setup::{CliLogLevel, init_tracing};
use anyflix_sim::{SimulatedContent, SimulatedSwarm, SimulatedSwarmConfig};
use anyhow::{Context, anyhow};
use clap::Subcommand;

/// Piece length used for library and demo content.
const DEFAULT_PIECE_LENGTH: u64 = 256 * 1024;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server over a simulated swarm
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory whose top-level entries become one content each
        #[arg(long)]
        library: Option<PathBuf>,
        /// Add generated demo content
        #[arg(long)]
        demo: bool,
        /// Simulated download speed in bytes per second
        #[arg(long)]
        download_speed: Option<u64>,
        /// Piece length for library content
        #[arg(long, default_value_t = DEFAULT_PIECE_LENGTH)]
        piece_length: u64,
        /// Console log level
        #[arg(long, value_enum, default_value = "info")]
        log_level: CliLogLevel,
        /// Directory for the full trace log
        #[arg(long)]
        logs_dir: Option<PathBuf>,
    },
    /// Print info hashes and file indices of a library
    Catalog {
        /// Library directory
        #[arg(long)]
        library: PathBuf,
        /// Piece length for library content
        #[arg(long, default_value_t = DEFAULT_PIECE_LENGTH)]
        piece_length: u64,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve {
            host,
            port,
            library,
            demo,
            download_speed,
            piece_length,
            log_level,
            logs_dir,
        } => {
            init_tracing(log_level.as_tracing_level(), logs_dir.as_deref())
                .map_err(|err| anyhow!(err))
                .context("failed to initialize logging")?;

            let mut config = AnyflixConfig::from_env();
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(speed) = download_speed {
                config.simulation.download_speed = speed;
            }
            serve(config, library.as_deref(), demo, piece_length).await
        }
        Commands::Catalog {
            library,
            piece_length,
        } => {
            let contents = load_library(&library, piece_length)?;
            if contents.is_empty() {
                println!("No content found in {}", library.display());
            }
            for content in &contents {
                print_content(content, None);
            }
            Ok(())
        }
    }
}

/// Runs the HTTP server until Ctrl-C.
///
/// # Errors
/// - Library could not be read
/// - Server failed to bind or serve
pub async fn serve(
    config: AnyflixConfig,
    library: Option<&Path>,
    demo: bool,
    piece_length: u64,
) -> anyhow::Result<()> {
    let swarm = Arc::new(SimulatedSwarm::new(SimulatedSwarmConfig::throttled(
        &config.simulation,
    )));

    if let Some(dir) = library {
        for content in load_library(dir, piece_length)? {
            swarm.insert(content);
        }
    }
    if demo || library.is_none() {
        swarm.insert(demo_content(config.simulation.seed)?);
    }

    let base_url = format!("http://{}:{}", config.server.host, config.server.port);
    for (_, content) in swarm.catalog() {
        print_content(&content, Some(&base_url));
    }

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutdown requested");
    };

    anyflix_web::run_server(&config, swarm, shutdown)
        .await
        .context("streaming server failed")
}

/// One content per top-level entry of `dir`, skipping hidden entries.
///
/// # Errors
/// - Directory could not be listed
pub fn load_library(dir: &Path, piece_length: u64) -> anyhow::Result<Vec<SimulatedContent>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read library {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| !name.to_string_lossy().starts_with('.'))
        })
        .collect();
    entries.sort();

    let mut contents = Vec::with_capacity(entries.len());
    for path in entries {
        match SimulatedContent::from_directory(&path, piece_length) {
            Ok(content) => contents.push(content),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping library entry");
            }
        }
    }
    Ok(contents)
}

fn demo_content(seed: u64) -> anyhow::Result<SimulatedContent> {
    SimulatedContent::generated(
        "Anyflix Demo",
        &[
            ("Anyflix Demo/demo.mp4", 32 * 1024 * 1024),
            ("Anyflix Demo/demo.en.srt", 4 * 1024),
        ],
        DEFAULT_PIECE_LENGTH,
        seed,
    )
    .context("failed to generate demo content")
}

fn print_content(content: &SimulatedContent, base_url: Option<&str>) {
    let info_hash = content.info_hash();
    println!("{info_hash}  {}", content.name());
    for file in content.metadata().files {
        println!(
            "    [{}] {} ({} bytes)",
            file.index,
            file.path.display(),
            file.length
        );
        if let Some(base_url) = base_url {
            println!(
                "        {base_url}/api/torrent/{info_hash}/{}/stream",
                file.index
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_load_library_one_content_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Show")).unwrap();
        fs::write(dir.path().join("Show/e01.mkv"), vec![1u8; 64]).unwrap();
        fs::write(dir.path().join("Show/e02.mkv"), vec![2u8; 64]).unwrap();
        fs::write(dir.path().join("movie.mp4"), vec![3u8; 100]).unwrap();
        fs::write(dir.path().join(".DS_Store"), b"x").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();

        let contents = load_library(dir.path(), 32).unwrap();
        let names: Vec<_> = contents.iter().map(|c| c.name().to_string()).collect();

        assert_eq!(names, vec!["Show", "movie.mp4"]);
        assert_eq!(contents[0].metadata().files.len(), 2);
    }

    #[test]
    fn test_demo_content_is_reproducible() {
        let first = demo_content(42).unwrap();
        let second = demo_content(42).unwrap();
        assert_eq!(first.info_hash(), second.info_hash());
        assert_eq!(first.metadata().files.len(), 2);
    }
}
