//! shiphub-auth - manage the ShipHub accounts stored in the OS keychain.
//!
//! Lists, adds, inspects, verifies and logs out accounts using the same
//! credential store the desktop client reads at startup.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header;
use shiphub_core::auth::{Auth, AuthAccount, CredentialStore, DEFAULT_GH_HOST, DEFAULT_SHIP_HOST};
use shiphub_core::config::ConfigStore;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout for `verify`, in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// User agent sent to GitHub, which rejects requests without one
const USER_AGENT: &str = concat!("shiphub-auth/", env!("CARGO_PKG_VERSION"));

const USAGE: &str = "\
Usage: shiphub-auth <command> [args]

Commands:
  logins                         List stored logins
  last                           Print the last used login
  add <login> [--name NAME] [--gh-host HOST] [--ship-host HOST]
                                 Store tokens for a login (prompts for both)
  show <login>                   Print the stored account
  verify <login>                 Check the GitHub token against the API
  logout <login>                 Remove stored credentials

Environment:
  SHIPHUB_CONFIG   config file path (default: ~/.config/shiphub/config.json)
  SHIPHUB_GH_API   GitHub API base URL (default: https://<gh host>)
  RUST_LOG         log filter (default: warn)";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn open_store() -> Result<CredentialStore> {
    match std::env::var_os("SHIPHUB_CONFIG") {
        Some(path) => {
            let config = ConfigStore::open_at(PathBuf::from(path))?;
            Ok(CredentialStore::open_with_config(config))
        }
        None => CredentialStore::open().context("Failed to open credential store"),
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: &[String]) -> Result<()> {
    let Some(command) = args.first() else {
        println!("{USAGE}");
        return Ok(());
    };
    let rest = &args[1..];

    match command.as_str() {
        "logins" => list_logins(&open_store()?),
        "last" => {
            match open_store()?.last_used_login() {
                Some(login) => println!("{login}"),
                None => println!("(none)"),
            }
            Ok(())
        }
        "add" => add_account(&open_store()?, rest),
        "show" => show_account(&open_store()?, required_login(rest)?),
        "verify" => verify_account(&open_store()?, required_login(rest)?).await,
        "logout" => {
            let login = required_login(rest)?;
            open_store()?.logout(login)?;
            println!("Logged out {login}");
            Ok(())
        }
        "-h" | "--help" | "help" => {
            println!("{USAGE}");
            Ok(())
        }
        other => bail!("unknown command '{other}'\n\n{USAGE}"),
    }
}

fn required_login(rest: &[String]) -> Result<&str> {
    rest.first()
        .map(String::as_str)
        .context("missing <login> argument")
}

fn list_logins(store: &CredentialStore) -> Result<()> {
    let last = store.last_used_login();
    let logins = store.all_logins()?;
    if logins.is_empty() {
        println!("No stored accounts");
    }
    for login in logins {
        let marker = if last.as_deref() == Some(login.as_str()) { "*" } else { " " };
        println!("{marker} {login}");
    }
    Ok(())
}

/// Options accepted by `add` after the login
#[derive(Debug, Default, PartialEq)]
struct AddOptions {
    name: Option<String>,
    gh_host: Option<String>,
    ship_host: Option<String>,
}

fn parse_add_options(args: &[String]) -> Result<AddOptions> {
    let mut options = AddOptions::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let slot = match flag.as_str() {
            "--name" => &mut options.name,
            "--gh-host" => &mut options.gh_host,
            "--ship-host" => &mut options.ship_host,
            other => bail!("unknown option '{other}'"),
        };
        let value = iter
            .next()
            .with_context(|| format!("{flag} needs a value"))?;
        *slot = Some(value.clone());
    }
    Ok(options)
}

fn prompt_token(label: &str) -> Result<String> {
    let token = rpassword::prompt_password(format!("{label}: "))?;
    let token = token.trim().to_string();
    if token.is_empty() {
        bail!("{label} must not be empty");
    }
    Ok(token)
}

fn add_account(store: &CredentialStore, rest: &[String]) -> Result<()> {
    let login = required_login(rest)?;
    let options = parse_add_options(&rest[1..])?;

    if store.has_credentials(login) {
        print!("Replace stored credentials for {login}? [y/N]: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if input.trim().to_lowercase() != "y" {
            println!("Unchanged");
            return Ok(());
        }
    }

    let mut account = AuthAccount::new(login).with_hosts(
        options.gh_host.unwrap_or_else(|| DEFAULT_GH_HOST.to_string()),
        options.ship_host.unwrap_or_else(|| DEFAULT_SHIP_HOST.to_string()),
    );
    account.name = options.name;

    let ship_token = prompt_token("ShipHub token")?;
    let gh_token = prompt_token("GitHub token")?;

    let auth = store.create(account, ship_token, gh_token)?;
    info!(login = %auth.login(), "Account added");
    println!("Stored credentials for {}", auth.account().display_name());
    Ok(())
}

fn show_account(store: &CredentialStore, login: &str) -> Result<()> {
    let auth = store.load(login)?;
    let rendered = serde_json::to_string_pretty(auth.account())?;
    println!("{rendered}");
    Ok(())
}

/// Base URL of the GitHub REST API for an account.
///
/// github.com serves the API from its own host; Enterprise installs serve it
/// under `/api/v3`.
fn github_api_base(account: &AuthAccount) -> String {
    if let Ok(base) = std::env::var("SHIPHUB_GH_API") {
        return base.trim_end_matches('/').to_string();
    }
    if account.is_public_github() {
        format!("https://{}", account.gh_host)
    } else {
        format!("https://{}/api/v3", account.gh_host)
    }
}

async fn verify_account(store: &CredentialStore, login: &str) -> Result<()> {
    let auth = store.load(login)?;
    let _sub = store.subscribe(|change| {
        eprintln!(
            "{}: session {} (was {})",
            change.login, change.state, change.previous
        );
    });

    let url = format!("{}/user", github_api_base(auth.account()));
    let response = send_user_request(&auth, &url).await?;
    debug!(status = %response.status(), %url, "Verify response");

    if auth.check_response(&response) {
        if response.status().is_success() {
            println!("{login}: token accepted");
        } else {
            println!("{login}: token not rejected (HTTP {})", response.status());
        }
    } else {
        println!("{login}: token rejected, sign in again with `shiphub-auth add {login}`");
    }
    Ok(())
}

async fn send_user_request(auth: &Auth, url: &str) -> Result<reqwest::Response> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;

    client
        .get(url)
        .header(header::AUTHORIZATION, auth.gh_bearer_header()?)
        .header(header::ACCEPT, "application/vnd.github+json")
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_add_options() {
        let options =
            parse_add_options(&args(&["--name", "Alice", "--gh-host", "ghe.example.com"])).unwrap();
        assert_eq!(
            options,
            AddOptions {
                name: Some("Alice".to_string()),
                gh_host: Some("ghe.example.com".to_string()),
                ship_host: None,
            }
        );
    }

    #[test]
    fn test_parse_add_options_errors() {
        assert!(parse_add_options(&args(&["--name"])).is_err());
        assert!(parse_add_options(&args(&["--bogus", "x"])).is_err());
        assert_eq!(parse_add_options(&[]).unwrap(), AddOptions::default());
    }

    #[test]
    fn test_required_login() {
        assert_eq!(required_login(&args(&["alice"])).unwrap(), "alice");
        assert!(required_login(&[]).is_err());
    }

    #[test]
    fn test_github_api_base_for_enterprise() {
        // An override from the environment wins over the account hosts
        if std::env::var_os("SHIPHUB_GH_API").is_some() {
            return;
        }
        let public = AuthAccount::new("alice");
        assert_eq!(github_api_base(&public), "https://api.github.com");

        let enterprise = AuthAccount::new("bob").with_hosts("ghe.example.com", DEFAULT_SHIP_HOST);
        assert_eq!(github_api_base(&enterprise), "https://ghe.example.com/api/v3");
    }
}
