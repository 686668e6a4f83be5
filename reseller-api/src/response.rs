//! Response decoding.
//!
//! # Response mode
//!
//! The API answers with a JSON envelope:
//!
//! ```json
//! {
//!   "state": 1000,
//!   "stateName": "OK",
//!   "stateParam": "",
//!   "errors": [],
//!   ...action-specific fields...
//! }
//! ```
//!
//! `state >= 2000` signals an application-level failure. This is not an
//! [`ApiError`](crate::ApiError): the decoded response is returned and
//! [`ApiResponse::is_error`] reports it.
//!
//! # Download mode
//!
//! The body is the raw file. Name, size and type come from the
//! `content-disposition`, `content-length` and `content-type` headers; when
//! the content type is missing or generic it is sniffed from the bytes.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::blocking::Response;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ResponseMode;
use crate::error::FetchError;

/// State code reported for successful downloads.
pub const STATE_OK: i64 = 1000;
/// Lowest state code that signals an application-level error.
pub const STATE_ERROR_THRESHOLD: i64 = 2000;

const OCTET_STREAM: &str = "application/octet-stream";

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bfilename\s*=\s*["']?([^"';]+)"#).expect("static regex is valid")
});

static FILENAME_EXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfilename\*\s*=\s*[\w-]*'[\w-]*'([^;\s]+)").expect("static regex is valid")
});

/// Detects a MIME type from file content.
pub trait MimeSniffer: Send + Sync {
    /// MIME type of `bytes`, or `None` when unrecognized.
    fn sniff(&self, bytes: &[u8]) -> Option<String>;
}

impl<F> MimeSniffer for F
where
    F: Fn(&[u8]) -> Option<String> + Send + Sync,
{
    fn sniff(&self, bytes: &[u8]) -> Option<String> {
        self(bytes)
    }
}

/// Magic-number detection via the `infer` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicSniffer;

impl MimeSniffer for MagicSniffer {
    fn sniff(&self, bytes: &[u8]) -> Option<String> {
        infer::get(bytes).map(|k| k.mime_type().to_owned())
    }
}

/// A file returned by a download-mode request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDownload {
    file: Vec<u8>,
    file_name: Option<String>,
    file_size: Option<u64>,
    file_type: Option<String>,
}

impl FileDownload {
    /// Wrap downloaded bytes with their metadata.
    pub fn new(
        file: Vec<u8>,
        file_name: Option<String>,
        file_size: Option<u64>,
        file_type: Option<String>,
    ) -> Self {
        Self {
            file,
            file_name,
            file_size,
            file_type,
        }
    }

    /// Raw file content.
    pub fn file(&self) -> &[u8] {
        &self.file
    }

    /// Name from `content-disposition`, if the server sent one.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Size announced by `content-length`; `None` if absent or malformed.
    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    /// MIME type from the header or sniffed from the bytes.
    pub fn file_type(&self) -> Option<&str> {
        self.file_type.as_deref()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.file
    }

    /// Write the content to `dest`, returning the number of bytes written.
    pub fn save(&self, dest: &Path) -> std::io::Result<u64> {
        let mut file = File::create(dest)?;
        file.write_all(&self.file)?;
        Ok(self.file.len() as u64)
    }
}

/// Decoded result of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// JSON envelope; `None` when the body was empty or not JSON.
    Structured(Option<Value>),
    /// Successful download. Always reports state 1000 / `OK`.
    File(FileDownload),
}

impl ApiResponse {
    /// `true` when there is no decoded envelope, or its `state` is missing,
    /// non-numeric or `>= 2000`.
    pub fn is_error(&self) -> bool {
        match self {
            Self::Structured(None) => true,
            Self::Structured(Some(_)) => self
                .state()
                .is_none_or(|state| state >= STATE_ERROR_THRESHOLD),
            Self::File(_) => false,
        }
    }

    /// Numeric `state`. Integral numbers and numeric strings are accepted.
    pub fn state(&self) -> Option<i64> {
        match self {
            Self::Structured(data) => data.as_ref()?.get("state").and_then(coerce_state),
            Self::File(_) => Some(STATE_OK),
        }
    }

    /// `stateName` of a structured response.
    pub fn state_name(&self) -> Option<&str> {
        match self {
            Self::Structured(_) => self.field_str("stateName"),
            Self::File(_) => Some("OK"),
        }
    }

    /// `stateParam` of a structured response.
    pub fn state_param(&self) -> Option<&str> {
        match self {
            Self::Structured(_) => self.field_str("stateParam"),
            Self::File(_) => Some(""),
        }
    }

    /// Entries of the `errors` array; empty when absent.
    pub fn errors(&self) -> &[Value] {
        match self {
            Self::Structured(Some(data)) => data
                .get("errors")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            _ => &[],
        }
    }

    /// The full decoded envelope (structured responses only).
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Structured(data) => data.as_ref(),
            Self::File(_) => None,
        }
    }

    /// Deserialize the decoded envelope into `T`. A missing envelope is
    /// presented to `T` as JSON `null`.
    pub fn data_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        <T as serde::Deserialize>::deserialize(self.data().unwrap_or(&Value::Null))
    }

    /// The download, if this is a file response.
    pub fn as_file(&self) -> Option<&FileDownload> {
        match self {
            Self::File(file) => Some(file),
            Self::Structured(_) => None,
        }
    }

    pub fn into_file(self) -> Option<FileDownload> {
        match self {
            Self::File(file) => Some(file),
            Self::Structured(_) => None,
        }
    }

    fn field_str(&self, key: &str) -> Option<&str> {
        self.data()?.get(key)?.as_str()
    }
}

fn coerce_state(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read the whole body of `response` and decode it according to `mode`.
pub fn decode(
    response: Response,
    mode: ResponseMode,
    sniffer: &dyn MimeSniffer,
) -> Result<ApiResponse, FetchError> {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes()?;
    match mode {
        ResponseMode::Response => decode_json(status, &body),
        ResponseMode::Download => decode_download(status, &headers, body.to_vec(), sniffer),
    }
}

/// Decode a JSON envelope.
///
/// A parseable body is returned whatever the status. An unparseable,
/// empty or `null` body yields `Structured(None)` on 2xx and
/// [`FetchError::Status`] otherwise.
pub fn decode_json(status: u16, body: &[u8]) -> Result<ApiResponse, FetchError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Null) if !is_success(status) => Err(FetchError::Status { status }),
        Ok(Value::Null) => Ok(ApiResponse::Structured(None)),
        Ok(data) => {
            let response = ApiResponse::Structured(Some(data));
            tracing::debug!(status, state = ?response.state(), "decoded api response");
            Ok(response)
        }
        Err(_) if !is_success(status) => Err(FetchError::Status { status }),
        Err(e) => {
            tracing::warn!(status, len = body.len(), "response body is not JSON: {e}");
            Ok(ApiResponse::Structured(None))
        }
    }
}

/// Decode a file download. Non-2xx statuses are [`FetchError::Status`].
pub fn decode_download(
    status: u16,
    headers: &HeaderMap,
    body: Vec<u8>,
    sniffer: &dyn MimeSniffer,
) -> Result<ApiResponse, FetchError> {
    if !is_success(status) {
        return Err(FetchError::Status { status });
    }
    let file_name = header_str(headers, CONTENT_DISPOSITION.as_str()).and_then(parse_file_name);
    let file_size = header_str(headers, CONTENT_LENGTH.as_str()).and_then(|v| v.trim().parse().ok());
    let file_type = resolve_file_type(header_str(headers, CONTENT_TYPE.as_str()), &body, sniffer);
    tracing::debug!(?file_name, ?file_size, ?file_type, "decoded download");
    Ok(ApiResponse::File(FileDownload::new(
        body, file_name, file_size, file_type,
    )))
}

/// Extract the file name from a `content-disposition` value, preferring the
/// RFC 5987 `filename*` form.
pub fn parse_file_name(disposition: &str) -> Option<String> {
    let extended = FILENAME_EXT_RE
        .captures(disposition)
        .and_then(|c| urlencoding::decode(&c[1]).ok().map(|s| s.into_owned()));
    extended
        .or_else(|| {
            FILENAME_RE
                .captures(disposition)
                .map(|c| c[1].trim().to_owned())
        })
        .filter(|name| !name.is_empty())
}

fn resolve_file_type(
    header: Option<&str>,
    body: &[u8],
    sniffer: &dyn MimeSniffer,
) -> Option<String> {
    let header = header.map(str::trim).filter(|ct| !ct.is_empty());
    let generic = header.is_none_or(|ct| {
        ct.split(';')
            .next()
            .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(OCTET_STREAM))
    });
    if generic {
        if let Some(sniffed) = sniffer.sniff(body) {
            return Some(sniffed);
        }
    }
    header.map(str::to_owned)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(*v));
        }
        map
    }

    #[test]
    fn ok_state_is_not_error() {
        let r = decode_json(200, br#"{"state": 1000, "stateName": "OK"}"#).unwrap();
        assert!(!r.is_error());
        assert_eq!(r.state(), Some(1000));
        assert_eq!(r.state_name(), Some("OK"));
        assert!(r.errors().is_empty());
    }

    #[test]
    fn error_state_exposes_errors() {
        let r = decode_json(200, br#"{"state": 2001, "errors": ["bad"]}"#).unwrap();
        assert!(r.is_error());
        assert_eq!(r.errors(), &[json!("bad")]);
    }

    #[test]
    fn empty_or_garbage_body_is_error_result() {
        for body in [&b""[..], b"<html>oops</html>", b"null"] {
            let r = decode_json(200, body).unwrap();
            assert!(r.is_error());
            assert_eq!(r.data(), None);
            assert_eq!(r.state(), None);
        }
    }

    #[test]
    fn non_numeric_or_missing_state_is_error() {
        assert!(decode_json(200, br#"{"state": "OK"}"#).unwrap().is_error());
        assert!(decode_json(200, br#"{"stateName": "OK"}"#).unwrap().is_error());
        let numeric_string = decode_json(200, br#"{"state": "1000"}"#).unwrap();
        assert!(!numeric_string.is_error());
        assert_eq!(numeric_string.state(), Some(1000));
    }

    #[test]
    fn non_success_status_with_json_is_returned() {
        let r = decode_json(500, br#"{"state": 2500, "stateName": "ERROR"}"#).unwrap();
        assert!(r.is_error());
        assert_eq!(r.state(), Some(2500));
    }

    #[test]
    fn non_success_status_without_json_fails() {
        assert!(matches!(
            decode_json(502, b"Bad Gateway"),
            Err(FetchError::Status { status: 502 })
        ));
    }

    #[test]
    fn non_success_status_with_null_body_fails() {
        assert!(matches!(
            decode_json(500, b"null"),
            Err(FetchError::Status { status: 500 })
        ));
    }

    #[test]
    fn data_as_deserializes_envelope() {
        #[derive(serde::Deserialize)]
        struct Login {
            state: i64,
            #[serde(rename = "stateName")]
            state_name: String,
        }
        let r = decode_json(200, br#"{"state": 1000, "stateName": "OK"}"#).unwrap();
        let login: Login = r.data_as().unwrap();
        assert_eq!(login.state, 1000);
        assert_eq!(login.state_name, "OK");
    }

    #[test]
    fn download_reads_headers() {
        let h = headers(&[
            ("content-disposition", "attachment; filename=\"report.csv\""),
            ("content-length", "42"),
            ("content-type", "text/csv"),
        ]);
        let r = decode_download(200, &h, b"a,b\n".to_vec(), &MagicSniffer).unwrap();
        assert!(!r.is_error());
        assert_eq!(r.state(), Some(1000));
        assert_eq!(r.state_name(), Some("OK"));
        assert_eq!(r.state_param(), Some(""));
        let file = r.as_file().unwrap();
        assert_eq!(file.file_name(), Some("report.csv"));
        assert_eq!(file.file_size(), Some(42));
        assert_eq!(file.file_type(), Some("text/csv"));
        assert_eq!(file.file(), b"a,b\n");
    }

    #[test]
    fn download_without_headers() {
        let r = decode_download(200, &HeaderMap::new(), b"plain".to_vec(), &MagicSniffer).unwrap();
        let file = r.into_file().unwrap();
        assert_eq!(file.file_name(), None);
        assert_eq!(file.file_size(), None);
        assert_eq!(file.file_type(), None);
    }

    #[test]
    fn download_malformed_length_is_none() {
        let h = headers(&[("content-length", "lots")]);
        let r = decode_download(200, &h, Vec::new(), &MagicSniffer).unwrap();
        assert_eq!(r.as_file().unwrap().file_size(), None);
    }

    #[test]
    fn download_sniffs_generic_content_type() {
        let h = headers(&[("content-type", "application/octet-stream")]);
        let r = decode_download(200, &h, PNG_MAGIC.to_vec(), &MagicSniffer).unwrap();
        assert_eq!(r.as_file().unwrap().file_type(), Some("image/png"));

        let r = decode_download(200, &HeaderMap::new(), PNG_MAGIC.to_vec(), &MagicSniffer).unwrap();
        assert_eq!(r.as_file().unwrap().file_type(), Some("image/png"));
    }

    #[test]
    fn download_keeps_generic_type_when_sniff_fails() {
        let h = headers(&[("content-type", "application/octet-stream")]);
        let r = decode_download(200, &h, b"???".to_vec(), &MagicSniffer).unwrap();
        assert_eq!(r.as_file().unwrap().file_type(), Some("application/octet-stream"));
    }

    #[test]
    fn download_trusts_specific_content_type() {
        let h = headers(&[("content-type", "application/pdf")]);
        let never = |_: &[u8]| -> Option<String> { panic!("sniffer must not run") };
        let r = decode_download(200, &h, PNG_MAGIC.to_vec(), &never).unwrap();
        assert_eq!(r.as_file().unwrap().file_type(), Some("application/pdf"));
    }

    #[test]
    fn download_error_status_fails() {
        assert!(matches!(
            decode_download(404, &HeaderMap::new(), Vec::new(), &MagicSniffer),
            Err(FetchError::Status { status: 404 })
        ));
    }

    #[test]
    fn file_name_variants() {
        assert_eq!(parse_file_name("attachment; filename=report.csv").as_deref(), Some("report.csv"));
        assert_eq!(
            parse_file_name("attachment; filename='invoice 7.pdf'").as_deref(),
            Some("invoice 7.pdf")
        );
        assert_eq!(
            parse_file_name("attachment; filename=\"a.txt\"; filename*=UTF-8''Rechnung%20%C3%BC.pdf")
                .as_deref(),
            Some("Rechnung ü.pdf")
        );
        assert_eq!(parse_file_name("inline"), None);
        assert_eq!(parse_file_name("attachment; filename=\"\""), None);
    }

    #[test]
    fn file_save_writes_bytes() {
        let file = FileDownload::new(b"hello".to_vec(), None, Some(5), None);
        let dest = std::env::temp_dir().join(format!("reseller-api-save-{}.bin", std::process::id()));
        assert_eq!(file.save(&dest).unwrap(), 5);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
        std::fs::remove_file(&dest).unwrap();
    }

    #[test]
    fn structured_response_is_not_a_file() {
        let r = decode_json(200, br#"{"state": 1000}"#).unwrap();
        assert!(r.as_file().is_none());
    }
}
