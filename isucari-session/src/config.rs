//! Endpoints a session talks to.

use isucari_core::{BenchConfig, Error, Result};
use reqwest::Url;

/// Base URLs of the target application and the simulators.
#[derive(Debug, Clone)]
pub struct TargetUrls {
    /// Target application base URL
    pub app_url: Url,
    /// `Host` header value sent to the target
    pub target_host: String,
    /// Payment simulator base URL
    pub payment_url: Url,
    /// Shipment simulator base URL
    pub shipment_url: Url,
}

impl TargetUrls {
    /// Parse and normalize the four endpoints. Paths and queries are dropped.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an unparsable URL or one without host.
    pub fn new(app_url: &str, target_host: &str, payment_url: &str, shipment_url: &str) -> Result<Self> {
        Ok(Self {
            app_url: base_url(app_url)?,
            target_host: target_host.to_string(),
            payment_url: base_url(payment_url)?,
            shipment_url: base_url(shipment_url)?,
        })
    }

    /// Endpoints from the run configuration.
    ///
    /// # Errors
    /// See [`TargetUrls::new`].
    pub fn from_config(config: &BenchConfig) -> Result<Self> {
        Self::new(
            &config.target.app_url,
            &config.target.target_host,
            &config.target.payment_url,
            &config.target.shipment_url,
        )
    }
}

fn base_url(raw: &str) -> Result<Url> {
    if raw.is_empty() {
        return Err(Error::Configuration { message: "client: missing url".into() });
    }
    let mut url = Url::parse(raw)
        .map_err(|e| Error::Configuration { message: format!("failed to parse url {raw}: {e}") })?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::Configuration { message: format!("host is empty: {raw}") });
    }
    url.set_path("");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
