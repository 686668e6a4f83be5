//! Client configuration: API version, address family, response mode and
//! transport options.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;
use crate::response::MimeSniffer;

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://core.resellerinterface.de/";

/// API version path segment.
///
/// Parses from `stable`, `latest`, a positive integer (`"3"` becomes `v3`)
/// or the normalized `v<N>` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    #[default]
    Stable,
    Latest,
    Numbered(u32),
}

impl Version {
    /// Numbered version; zero is rejected.
    pub fn numbered(n: u32) -> Result<Self, ApiError> {
        if n == 0 {
            return Err(ApiError::InvalidVersion(n.to_string()));
        }
        Ok(Self::Numbered(n))
    }
}

impl FromStr for Version {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stable" => Ok(Self::Stable),
            "latest" => Ok(Self::Latest),
            _ => {
                let digits = s.strip_prefix('v').unwrap_or(s);
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ApiError::InvalidVersion(s.to_owned()));
                }
                digits
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .map(Self::Numbered)
                    .ok_or_else(|| ApiError::InvalidVersion(s.to_owned()))
            }
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => f.write_str("stable"),
            Self::Latest => f.write_str("latest"),
            Self::Numbered(n) => write!(f, "v{n}"),
        }
    }
}

/// Address family preference for outgoing connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpResolve {
    V4,
    V6,
    #[default]
    Any,
}

impl FromStr for IpResolve {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipv4" => Ok(Self::V4),
            "ipv6" => Ok(Self::V6),
            "any" => Ok(Self::Any),
            _ => Err(ApiError::InvalidIpResolve(s.to_owned())),
        }
    }
}

/// How the response body of a request is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// JSON envelope with `state`, `stateName`, `stateParam`, `errors`.
    #[default]
    Response,
    /// Binary file download.
    Download,
}

impl FromStr for ResponseMode {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "response" | "response_response" => Ok(Self::Response),
            "download" | "response_download" => Ok(Self::Download),
            _ => Err(ApiError::InvalidMode(s.to_owned())),
        }
    }
}

/// Optional construction-time settings for [`ApiClient`](crate::ApiClient).
#[derive(Clone, Default)]
pub struct ClientOptions {
    pub ip_resolve: IpResolve,
    /// Overrides [`default_user_agent`].
    pub user_agent: Option<String>,
    /// Per-request timeout; `None` uses 30 seconds.
    pub timeout: Option<Duration>,
    /// Pre-built HTTP client. When set, `ip_resolve` and `timeout` are
    /// ignored.
    pub http_client: Option<reqwest::blocking::Client>,
    /// MIME detection for downloads without a usable content type.
    /// Defaults to magic-number sniffing.
    pub sniffer: Option<Arc<dyn MimeSniffer>>,
}

impl ClientOptions {
    /// Pin outgoing connections to one address family.
    #[must_use]
    pub fn ip_resolve(mut self, ip_resolve: IpResolve) -> Self {
        self.ip_resolve = ip_resolve;
        self
    }

    /// Replace the default `User-Agent`.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Per-request timeout for the built-in HTTP client.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use a pre-built HTTP client instead of building one.
    #[must_use]
    pub fn http_client(mut self, client: reqwest::blocking::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// MIME detection used for downloads without a usable content type.
    #[must_use]
    pub fn sniffer(mut self, sniffer: Arc<dyn MimeSniffer>) -> Self {
        self.sniffer = Some(sniffer);
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("ip_resolve", &self.ip_resolve)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .field("http_client", &self.http_client.is_some())
            .field("sniffer", &self.sniffer.is_some())
            .finish()
    }
}

/// `reseller-api/<version> (<os>; <arch>)`.
pub fn default_user_agent() -> String {
    format!(
        "{}/{} ({}; {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
    )
}
