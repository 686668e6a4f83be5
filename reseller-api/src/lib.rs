//! ResellerInterface core API client library.
//!
//! Provides session-aware access to the reseller management API: nested
//! parameters are flattened into a multipart form, the `coreSID` session
//! cookie is round-tripped on every call, and answers are decoded either as
//! a JSON envelope or as a downloaded file.
//!
//! ```no_run
//! use reseller_api::{ApiClient, ResponseMode};
//! use serde_json::json;
//!
//! let client = ApiClient::new("https://core.resellerinterface.de/", "stable")?;
//! let login = client.login("alice", "secret", None)?;
//! if login.is_error() {
//!     eprintln!("login failed: {:?}", login.errors());
//! }
//!
//! let domains = client.request(
//!     "domain/list",
//!     &json!({ "filter": { "status": "active" }, "limit": 50 }),
//!     ResponseMode::Response,
//! )?;
//! println!("{:?}", domains.data());
//! # Ok::<(), reseller_api::ApiError>(())
//! ```
//!
//! # Errors versus failed states
//!
//! | Situation                              | Surfaces as                         |
//! |----------------------------------------|-------------------------------------|
//! | Bad version / user agent at construction | [`ApiError`] from [`ApiClient::new`] |
//! | Malformed action                       | [`ApiError::InvalidAction`], no I/O |
//! | Unknown response mode name             | [`ApiError::InvalidMode`] from `parse` |
//! | Network / TLS / non-2xx without JSON   | [`ApiError::Fetch`]                 |
//! | `state >= 2000` in the JSON envelope   | `Ok(response)` with `is_error()`    |

pub mod client;
pub mod config;
pub mod error;
pub mod params;
pub mod response;
pub mod session;

pub use client::ApiClient;
pub use config::{ClientOptions, IpResolve, ResponseMode, Version};
pub use error::{ApiError, FetchError, Result};
pub use params::{FlatParams, flatten};
pub use response::{ApiResponse, FileDownload, MagicSniffer, MimeSniffer};
pub use session::SessionStore;
