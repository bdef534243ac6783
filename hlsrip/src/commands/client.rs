use anyhow::{Result, bail};
use clap::Args;
use hlsrip::{DEFAULT_ORIGIN, DEFAULT_USER_AGENT, PipelineConfig, Response, Transport};
use reqwest::{
    Proxy, Url,
    blocking::Client,
    header::{self, HeaderName, HeaderValue},
};
use std::time::Duration;

/// Request options shared by every command.
#[derive(Debug, Clone, Args)]
pub struct ClientOptions {
    /// Custom headers for requests.
    /// This option can be used multiple times.
    #[arg(long, help_heading = "Client Options", num_args = 2, value_names = &["KEY", "VALUE"])]
    pub header: Vec<String>, // Vec<(String, String)> not supported

    /// Skip checking and validation of site certificates.
    #[arg(long, help_heading = "Client Options")]
    pub no_certificate_checks: bool,

    /// Site sent as origin and referer header.
    #[arg(long, help_heading = "Client Options", default_value = DEFAULT_ORIGIN)]
    pub origin: String,

    /// Set http(s) proxy address for requests.
    #[arg(long, help_heading = "Client Options", value_parser = proxy_address_parser)]
    pub proxy: Option<Proxy>,

    /// Timeout in seconds for every request.
    #[arg(long, help_heading = "Client Options", default_value_t = 15)]
    pub timeout: u64,

    /// Update and set user agent header for requests.
    #[arg(long, help_heading = "Client Options", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl ClientOptions {
    pub fn client(&self) -> Result<Client> {
        let mut client_builder =
            Client::builder().danger_accept_invalid_certs(self.no_certificate_checks);

        if let Some(proxy) = &self.proxy {
            client_builder = client_builder.proxy(proxy.clone());
        }

        Ok(client_builder.build()?)
    }

    /// Applies timeout and headers on top of `config`.
    pub fn config(&self, config: PipelineConfig) -> Result<PipelineConfig> {
        let mut config = config
            .timeout(Duration::from_secs(self.timeout))
            .origin(&self.origin)?
            .header(header::USER_AGENT, self.user_agent.parse::<HeaderValue>()?);

        for i in (0..self.header.len()).step_by(2) {
            config = config.header(
                self.header[i].parse::<HeaderName>()?,
                self.header[i + 1].parse::<HeaderValue>()?,
            );
        }

        Ok(config)
    }
}

/// Downloads playlist text with the same headers used for keys and segments.
pub fn fetch_playlist(
    transport: &dyn Transport,
    config: &PipelineConfig,
    url: &Url,
) -> Result<Response> {
    let response = transport.get(url, &config.headers, config.timeout)?;

    if !response.status.is_success() {
        bail!(
            "failed to download playlist {} (HTTP {})",
            url,
            response.status
        );
    }

    Ok(response)
}

fn proxy_address_parser(s: &str) -> Result<Proxy, String> {
    Proxy::all(s).map_err(|x| x.to_string())
}
