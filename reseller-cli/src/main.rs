mod session_file;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use reseller_api::config::DEFAULT_BASE_URL;
use reseller_api::{ApiClient, ApiResponse, ClientOptions, IpResolve, ResponseMode};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use crate::session_file::SavedSession;

#[derive(Parser)]
#[command(
    name = "reseller",
    version,
    about = "ResellerInterface API command-line client"
)]
struct Cli {
    #[command(flatten)]
    conn: Connection,
    /// Log requests and session handling to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Connection {
    /// API base URL
    #[arg(long, env = "RESELLER_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,
    /// API version: stable, latest or a number
    #[arg(long, env = "RESELLER_API_VERSION", default_value = "stable", global = true)]
    api_version: String,
    /// Address family: ipv4, ipv6 or any
    #[arg(long, env = "RESELLER_IP_RESOLVE", global = true)]
    ip_resolve: Option<IpResolve>,
    /// Custom User-Agent header
    #[arg(long, env = "RESELLER_USER_AGENT", global = true)]
    user_agent: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and save the session
    Login {
        #[arg(env = "RESELLER_USERNAME")]
        username: String,
        #[arg(long, env = "RESELLER_PASSWORD", hide_env_values = true)]
        password: String,
        /// Act as this sub-reseller
        #[arg(long)]
        reseller_id: Option<u64>,
    },
    /// Forget the saved session
    Logout,
    /// Show the saved session
    Session,
    /// Call an API action, e.g. `domain/list`
    Request {
        /// Action path (`segment/segment[/...]`)
        action: String,
        /// Top-level parameter; repeatable, bracket keys allowed
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Nested parameters as a JSON object
        #[arg(long, value_name = "JSON")]
        json: Option<String>,
        /// Response mode: response or download
        #[arg(short, long, default_value = "response")]
        mode: ResponseMode,
        /// Where to save a download (file or directory)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Login {
            username,
            password,
            reseller_id,
        } => cmd_login(&cli.conn, &username, &password, reseller_id),
        Command::Logout => cmd_logout(),
        Command::Session => cmd_session(),
        Command::Request {
            action,
            params,
            json,
            mode,
            output,
        } => {
            let params = build_params(json.as_deref(), &params)?;
            cmd_request(&cli.conn, &action, &params, mode, output.as_deref())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "reseller_api=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build a client from the connection flags, restoring a saved session.
fn connect(conn: &Connection) -> Result<ApiClient> {
    let mut options = ClientOptions::default();
    if let Some(ip) = conn.ip_resolve {
        options = options.ip_resolve(ip);
    }
    if let Some(ua) = &conn.user_agent {
        options = options.user_agent(ua);
    }
    let client = ApiClient::with_options(&conn.base_url, &conn.api_version, options)?;
    if let Some(sid) = SavedSession::load()?.token_for(client.base_url()) {
        client.set_session(sid);
    }
    Ok(client)
}

/// Merge `--json` and `-p KEY=VALUE` into one parameter object.
fn build_params(json: Option<&str>, pairs: &[String]) -> Result<Value> {
    let mut map = match json {
        Some(raw) => match serde_json::from_str(raw).context("--json is not valid JSON")? {
            Value::Object(map) => map,
            _ => bail!("--json must be a JSON object"),
        },
        None => Map::new(),
    };
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("parameter {pair:?} is not KEY=VALUE"))?;
        if key.is_empty() {
            bail!("parameter {pair:?} has an empty key");
        }
        map.insert(key.to_owned(), Value::String(value.to_owned()));
    }
    Ok(Value::Object(map))
}

// ── login / logout / session ──

fn cmd_login(conn: &Connection, username: &str, password: &str, reseller_id: Option<u64>) -> Result<()> {
    let client = connect(conn)?;
    let resp = client.login(username, password, reseller_id)?;
    fail_on_api_error(&resp)?;
    SavedSession::from_client(&client).save()?;
    match client.session() {
        Some(_) => println!("Logged in as {username}. Session saved."),
        None => println!("Logged in as {username}, but the server issued no session cookie."),
    }
    Ok(())
}

fn cmd_logout() -> Result<()> {
    SavedSession::clear()?;
    println!("Session cleared.");
    Ok(())
}

fn cmd_session() -> Result<()> {
    let saved = SavedSession::load()?;
    match (&saved.base_url, &saved.sid) {
        (Some(url), Some(_)) => println!("Session saved for {url}"),
        _ => println!("Not logged in."),
    }
    println!("File: {}", SavedSession::path()?.display());
    Ok(())
}

// ── request ──

fn cmd_request(
    conn: &Connection,
    action: &str,
    params: &Value,
    mode: ResponseMode,
    output: Option<&Path>,
) -> Result<()> {
    let client = connect(conn)?;
    let before = client.session();
    let resp = client.request(action, params, mode)?;
    if client.session() != before {
        SavedSession::from_client(&client).save()?;
    }

    if let Some(file) = resp.as_file() {
        let dest = download_path(output, file.file_name(), action);
        let size = file
            .save(&dest)
            .with_context(|| format!("failed to write {}", dest.display()))?;
        println!(
            "Downloaded {} ({} bytes, {})",
            dest.display(),
            size,
            file.file_type().unwrap_or("unknown type")
        );
        return Ok(());
    }

    if let Some(data) = resp.data() {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    fail_on_api_error(&resp)
}

/// Resolve where a download goes: an explicit file, a directory joined with
/// the server's file name, or the file name (falling back to the action's
/// last segment) in the working directory.
fn download_path(output: Option<&Path>, file_name: Option<&str>, action: &str) -> PathBuf {
    let name = file_name
        .and_then(|n| Path::new(n).file_name())
        .map_or_else(
            || PathBuf::from(action.trim_matches('/').rsplit('/').next().unwrap_or("download")),
            PathBuf::from,
        );
    match output {
        Some(dir) if dir.is_dir() => dir.join(name),
        Some(path) => path.to_path_buf(),
        None => name,
    }
}

fn fail_on_api_error(resp: &ApiResponse) -> Result<()> {
    if !resp.is_error() {
        return Ok(());
    }
    let state = resp
        .state()
        .map_or_else(|| "no state".to_owned(), |s| s.to_string());
    let name = resp.state_name().unwrap_or("unparseable response");
    let errors: Vec<String> = resp.errors().iter().map(Value::to_string).collect();
    if errors.is_empty() {
        bail!("API error {state} ({name})");
    }
    bail!("API error {state} ({name}): {}", errors.join(", "))
}
