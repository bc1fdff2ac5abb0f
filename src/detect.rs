use std::sync::Arc;

use anyhow::Context as _;
use url::Url;

use crate::browser::BrowserConnector;
use crate::browser::cdp::CdpConnector;
use crate::cli::DetectArgs;
use crate::config::SessionConfig;
use crate::session::{PageStructure, SiteSession};

/// Logs in, inspects one page and prints its layout report as JSON on stdout.
pub async fn run(args: DetectArgs) -> anyhow::Result<()> {
    let config = SessionConfig::from_args(&args.connection)?;
    let url = Url::parse(&args.url).context("parse url")?;
    let connector = Arc::new(CdpConnector::new(config.browser_url.clone(), config.network_timeout));

    let structure = inspect(connector, config, &url).await?;
    let json = serde_json::to_string_pretty(&structure).context("serialize structure report")?;
    println!("{json}");
    Ok(())
}

pub async fn inspect(
    connector: Arc<dyn BrowserConnector>,
    config: SessionConfig,
    url: &Url,
) -> anyhow::Result<PageStructure> {
    let mut session = SiteSession::new(connector, config, "detect");
    let result = async {
        session.start().await.context("start browser session")?;
        session.inspect(url).await.context("inspect page")
    }
    .await;
    session.close().await;

    let structure = result?;
    match structure.variant {
        Some(variant) => tracing::info!(url = %url, variant = variant.name(), "layout detected"),
        None => tracing::warn!(url = %url, "no known layout"),
    }
    Ok(structure)
}
