//! CLI command implementations

use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Subcommand;
use ferry_core::config::FerryConfig;
use ferry_core::{
    HttpOriginBackend, MediaBackend, MediaInfo, MediaReference, StreamLinks, StreamRelay,
};
use ferry_sim::{DEMO_CONTAINER_ID, DEMO_ITEMS, demo_backend};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the relay server
    Serve {
        /// Interface to bind to (default: HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (default: PORT or 8000)
        #[arg(short, long)]
        port: Option<u16>,
        /// Base URL of an HTTP origin serving `{container}/{item}` objects
        #[arg(long, conflicts_with = "demo")]
        origin: Option<String>,
        /// Serve the built-in in-memory demo catalog
        #[arg(long)]
        demo: bool,
        /// Relay chunk size in bytes (default: FERRY_CHUNK_SIZE or 524288)
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Print the stream, info and player links of a media object
    Links {
        /// Container (chat or channel) id, often negative
        #[arg(allow_negative_numbers = true)]
        container_id: i64,
        /// Item (message) id
        item_id: i64,
        /// Public base URL (default: resolved from the environment)
        #[arg(long)]
        base_url: Option<String>,
        /// Look the object up on this origin and print its file name and size
        #[arg(long, conflicts_with = "demo")]
        origin: Option<String>,
        /// Look the object up in the built-in demo catalog
        #[arg(long)]
        demo: bool,
    },
}

/// Runs a parsed command.
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve {
            host,
            port,
            origin,
            demo,
            chunk_size,
        } => {
            let config = apply_overrides(FerryConfig::from_env(), host, port, origin, chunk_size)?;
            let backend = select_backend(&config, demo).await?;
            ferry_web::run_server(&config, backend)
                .await
                .context("Relay server failed")?;
        }
        Commands::Links {
            container_id,
            item_id,
            base_url,
            origin,
            demo,
        } => {
            let describe = demo || origin.is_some();
            let config = apply_overrides(FerryConfig::from_env(), None, None, origin, None)?;
            let base_url = base_url.unwrap_or_else(|| config.server.base_url.clone());
            let reference = MediaReference::new(container_id, item_id);

            if describe {
                let backend = select_backend(&config, demo).await?;
                let relay = StreamRelay::new(backend, &config.relay);
                let info = relay
                    .info(reference)
                    .await
                    .with_context(|| format!("Failed to look up {reference}"))?;
                println!("{}", format_summary(&info));
            }
            println!("{}", format_links(&StreamLinks::new(&base_url, reference)));
        }
    }

    Ok(())
}

/// Applies command-line overrides on top of environment configuration.
fn apply_overrides(
    mut config: FerryConfig,
    host: Option<String>,
    port: Option<u16>,
    origin: Option<String>,
    chunk_size: Option<usize>,
) -> anyhow::Result<FerryConfig> {
    if let Some(host) = host {
        config.server.host = host;
    }

    if let Some(port) = port {
        // Only the local fallback base URL follows the port.
        let local_base_url = format!("http://localhost:{}", config.server.port);
        if config.server.base_url == local_base_url {
            config.server.base_url = format!("http://localhost:{port}");
        }
        config.server.port = port;
    }

    if let Some(origin) = origin {
        config.backend.origin_url = Some(origin);
    }

    if let Some(chunk_size) = chunk_size {
        if chunk_size == 0 {
            bail!("Chunk size must be greater than zero");
        }
        config.relay.chunk_size = chunk_size;
    }

    Ok(config)
}

async fn select_backend(config: &FerryConfig, demo: bool) -> anyhow::Result<Arc<dyn MediaBackend>> {
    if demo {
        let backend = demo_backend().await;
        for item in DEMO_ITEMS {
            let links = StreamLinks::new(
                &config.server.base_url,
                MediaReference::new(DEMO_CONTAINER_ID, item.item_id),
            );
            tracing::info!("Demo {}: {}", item.description, links.stream_url);
        }
        return Ok(Arc::new(backend));
    }

    let Some(origin) = config.backend.origin_url.as_deref() else {
        bail!("No media backend configured: pass --origin, set FERRY_ORIGIN_URL or use --demo");
    };

    let backend = HttpOriginBackend::new(origin, &config.backend)
        .with_context(|| format!("Failed to create origin backend for {origin}"))?;
    tracing::info!("Relaying media from origin {}", origin);
    Ok(Arc::new(backend))
}

fn format_summary(info: &MediaInfo) -> String {
    format!("File:   {} ({:.2} MB)", info.filename, info.size_mb)
}

fn format_links(links: &StreamLinks) -> String {
    format!(
        "Player: {}\nStream: {}\nInfo:   {}",
        links.player_url, links.stream_url, links.info_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_override_moves_local_base_url() {
        let config = apply_overrides(FerryConfig::default(), None, Some(9000), None, None).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_port_override_keeps_public_base_url() {
        let mut config = FerryConfig::default();
        config.server.base_url = "https://relay.example".to_string();

        let config = apply_overrides(config, None, Some(9000), None, None).unwrap();
        assert_eq!(config.server.base_url, "https://relay.example");
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let result = apply_overrides(FerryConfig::default(), None, None, None, Some(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_origin_and_host_overrides() {
        let config = apply_overrides(
            FerryConfig::default(),
            Some("127.0.0.1".to_string()),
            None,
            Some("http://origin.internal".to_string()),
            Some(4096),
        )
        .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(
            config.backend.origin_url.as_deref(),
            Some("http://origin.internal")
        );
        assert_eq!(config.relay.chunk_size, 4096);
    }

    #[tokio::test]
    async fn test_missing_backend_is_an_error() {
        let result = select_backend(&FerryConfig::default(), false).await;
        assert!(result.is_err());

        let demo = select_backend(&FerryConfig::default(), true).await.unwrap();
        assert_eq!(demo.name(), "in-memory");
    }

    #[test]
    fn test_format_summary() {
        let info = MediaInfo {
            container_id: -1001,
            item_id: 42,
            filename: "clip.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            size: 131_072,
            size_mb: 0.12,
        };
        assert_eq!(format_summary(&info), "File:   clip.mp4 (0.12 MB)");
    }

    #[tokio::test]
    async fn test_demo_lookup_for_links() {
        let config = FerryConfig::default();
        let backend = select_backend(&config, true).await.unwrap();
        let relay = StreamRelay::new(backend, &config.relay);

        let info = relay
            .info(MediaReference::new(DEMO_CONTAINER_ID, 1))
            .await
            .unwrap();
        assert_eq!(format_summary(&info), "File:   sample.mp4 (4.00 MB)");

        let missing = relay.info(MediaReference::new(DEMO_CONTAINER_ID, 99)).await;
        assert!(missing.is_err());
    }

    #[test]
    fn test_format_links() {
        let links = StreamLinks::new("http://localhost:8000", MediaReference::new(-1001, 42));
        assert_eq!(
            format_links(&links),
            "Player: http://localhost:8000/player?stream=http://localhost:8000/stream/-1001/42\n\
             Stream: http://localhost:8000/stream/-1001/42\n\
             Info:   http://localhost:8000/info/-1001/42"
        );
    }
}
