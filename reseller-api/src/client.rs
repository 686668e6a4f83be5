//! HTTP client for the ResellerInterface core API.
//!
//! Every call is a `POST` to `<base_url><version>/<action>` with the
//! flattened parameters as a `multipart/form-data` body:
//!
//! 1. Validate the action (`segment/segment[/...]`)
//! 2. Flatten the parameter tree into bracket-notation fields
//! 3. Attach `User-Agent` and, when logged in, `Cookie: coreSID=...`
//! 4. Send, then pick up a rotated `coreSID` from `Set-Cookie`
//! 5. Decode the body as a JSON envelope or a file download
//!
//! There is no retry, rate limiting or response caching. A failed call
//! fails once with [`ApiError::Fetch`].

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::multipart::Form;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};

use crate::config::{
    ClientOptions, DEFAULT_BASE_URL, IpResolve, ResponseMode, Version, default_user_agent,
};
use crate::error::{ApiError, FetchError, Result};
use crate::params::{FlatParams, flatten};
use crate::response::{self, ApiResponse, MagicSniffer, MimeSniffer};
use crate::session::SessionStore;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking client for the ResellerInterface API.
///
/// Configuration is fixed at construction. The only mutable state is the
/// session token, so one client can be shared across threads; concurrent
/// calls see whichever `coreSID` was stored last.
pub struct ApiClient {
    http: Client,
    base_url: String,
    version: Version,
    user_agent: String,
    user_agent_header: HeaderValue,
    session: SessionStore,
    sniffer: Arc<dyn MimeSniffer>,
}

impl ApiClient {
    /// Create a client with default options.
    ///
    /// `base_url` gains a trailing `/` if it lacks one. `version` is
    /// `stable`, `latest` or a positive integer (`"3"` selects `v3`).
    pub fn new(base_url: &str, version: &str) -> Result<Self> {
        Self::with_options(base_url, version, ClientOptions::default())
    }

    /// Client for the public endpoint on the `stable` version.
    pub fn default_endpoint() -> Result<Self> {
        Self::new(DEFAULT_BASE_URL, "stable")
    }

    /// Create a client with explicit [`ClientOptions`].
    ///
    /// Fails with [`ApiError::InvalidVersion`] or
    /// [`ApiError::InvalidUserAgent`] for bad settings, and with
    /// [`ApiError::Build`] if the HTTP client cannot be constructed.
    pub fn with_options(base_url: &str, version: &str, options: ClientOptions) -> Result<Self> {
        let version: Version = version.parse()?;
        let user_agent = options.user_agent.clone().unwrap_or_else(default_user_agent);
        let user_agent_header = HeaderValue::from_str(&user_agent)
            .map_err(|_| ApiError::InvalidUserAgent(user_agent.clone()))?;
        let http = build_http(&options)?;

        let mut base_url = base_url.to_owned();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            http,
            base_url,
            version,
            user_agent,
            user_agent_header,
            session: SessionStore::new(),
            sniffer: options
                .sniffer
                .unwrap_or_else(|| Arc::new(MagicSniffer)),
        })
    }

    /// Base URL, always ending in `/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Effective API version path segment.
    pub fn version(&self) -> Version {
        self.version
    }

    /// `User-Agent` sent with every request.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Current `coreSID` token, if one has been issued or set.
    pub fn session(&self) -> Option<String> {
        self.session.get()
    }

    /// Restore a token obtained earlier, e.g. from a previous process.
    pub fn set_session(&self, session: impl Into<String>) {
        self.session.set(Some(session.into()));
    }

    /// Drop the current token; later requests carry no session cookie.
    pub fn clear_session(&self) {
        self.session.set(None);
    }

    /// Full URL for `action`, after validating it.
    pub fn endpoint(&self, action: &str) -> Result<String> {
        let action = normalize_action(action)?;
        Ok(format!("{}{}/{action}", self.base_url, self.version))
    }

    /// Log in and start a session.
    ///
    /// Shorthand for `request("reseller/login", ...)`; the returned
    /// response must still be checked with [`ApiResponse::is_error`].
    pub fn login(
        &self,
        username: &str,
        password: &str,
        reseller_id: Option<u64>,
    ) -> Result<ApiResponse> {
        let mut params = json!({
            "username": username,
            "password": password,
        });
        if let Some(id) = reseller_id {
            params["resellerId"] = json!(id);
        }
        self.request("reseller/login", &params, ResponseMode::Response)
    }

    /// Call `action` with `params`, decoding the answer according to `mode`.
    ///
    /// # Errors
    ///
    /// - [`ApiError::InvalidAction`] before any I/O if `action` has fewer
    ///   than two non-empty segments
    /// - [`ApiError::Fetch`] for transport failures and non-2xx responses
    ///   without a JSON body
    ///
    /// An envelope with `state >= 2000` is returned as `Ok`.
    pub fn request(&self, action: &str, params: &Value, mode: ResponseMode) -> Result<ApiResponse> {
        let url = self.endpoint(action)?;
        let fields = flatten(params);
        tracing::debug!(%url, ?mode, fields = fields.len(), "api request");
        Ok(self.round_trip(&url, fields, mode)?)
    }

    fn round_trip(
        &self,
        url: &str,
        fields: FlatParams,
        mode: ResponseMode,
    ) -> std::result::Result<ApiResponse, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, self.user_agent_header.clone());
        self.session.apply(&mut headers)?;

        // Field names go out verbatim; brackets must not be percent-encoded.
        let form = fields
            .into_iter()
            .fold(Form::new().percent_encode_noop(), |form, (name, value)| {
                form.text(name, value)
            });

        let response = self.http.post(url).headers(headers).multipart(form).send()?;
        tracing::debug!(status = response.status().as_u16(), "api response");
        self.session.observe(response.headers());
        response::decode(response, mode, self.sniffer.as_ref())
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .field("user_agent", &self.user_agent)
            .field("logged_in", &self.session.get().is_some())
            .finish_non_exhaustive()
    }
}

fn build_http(options: &ClientOptions) -> Result<Client> {
    if let Some(client) = &options.http_client {
        return Ok(client.clone());
    }
    let builder = Client::builder().timeout(options.timeout.unwrap_or(DEFAULT_TIMEOUT));
    let builder = match options.ip_resolve {
        IpResolve::V4 => builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        IpResolve::V6 => builder.local_address(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
        IpResolve::Any => builder,
    };
    builder.build().map_err(ApiError::Build)
}

/// Strip surrounding slashes and require at least two non-empty segments.
fn normalize_action(action: &str) -> Result<&str> {
    let trimmed = action.trim_matches('/');
    let non_empty = trimmed.split('/').filter(|s| !s.is_empty()).count();
    if non_empty >= 2 {
        Ok(trimmed)
    } else {
        Err(ApiError::InvalidAction(action.to_owned()))
    }
}
