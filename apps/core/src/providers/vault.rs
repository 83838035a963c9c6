use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::run_command;
use crate::clipboard::backend::command_exists;
use crate::model::{Action, Candidate, ProviderId};
use crate::registry::{CancelToken, Latency, Provider, ProviderError, QueryContext};

const BW_TIMEOUT: Duration = Duration::from_secs(10);
const TOTP_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_TOTP_LOOKUPS: usize = 3;
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;
// `bw generate` rejects anything shorter than 5.
const MIN_PASSWORD_LENGTH: usize = 5;
const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub login: Option<VaultLogin>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultLogin {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub uris: Vec<VaultUri>,
    #[serde(default)]
    pub totp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultUri {
    #[serde(default)]
    pub uri: Option<String>,
}

/// `generate [length]` asks for a fresh password; anything else searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultQuery<'a> {
    Generate(usize),
    Search(&'a str),
}

impl<'a> VaultQuery<'a> {
    pub fn parse(residual: &'a str) -> Self {
        let residual = residual.trim();
        let mut words = residual.split_whitespace();
        if words.next() != Some("generate") {
            return Self::Search(residual);
        }
        match (words.next(), words.next()) {
            (None, _) => Self::Generate(DEFAULT_PASSWORD_LENGTH),
            (Some(length), None) => match length.parse::<usize>() {
                Ok(length) => {
                    Self::Generate(length.clamp(MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH))
                }
                Err(_) => Self::Search(residual),
            },
            _ => Self::Search(residual),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultProblem {
    Locked,
    Unauthenticated,
}

/// Bitwarden logins, TOTP codes and password generation through the `bw`
/// CLI. Lookups need an unlocked session
/// (`BW_SESSION` in the environment).
pub struct VaultLookup;

impl Provider for VaultLookup {
    fn id(&self) -> ProviderId {
        ProviderId::Vault
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let needle = match VaultQuery::parse(&query.residual) {
            VaultQuery::Generate(length) => return generate(length, &query.cancel),
            VaultQuery::Search(needle) => needle,
        };
        if needle.is_empty() {
            return Ok(vec![Candidate::info(
                "vault:hint",
                "Search your Bitwarden vault",
                "Type part of an item name, or `generate [length]`",
            )]);
        }
        if !command_exists("bw") {
            return Ok(vec![Candidate::info(
                "vault:missing",
                "Bitwarden CLI not found",
                "Install `bw` and log in to search the vault",
            )]);
        }

        let output = run_command(
            "bw",
            &["list", "items", "--search", needle, "--nointeraction"],
            BW_TIMEOUT,
            Some(&query.cancel),
        )?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(stderr = %stderr.trim(), "bw list failed");
            return match classify_failure(&stderr) {
                Some(VaultProblem::Locked) => Ok(vec![Candidate::info(
                    "vault:locked",
                    "Vault is locked",
                    "Run `bw unlock` and export BW_SESSION",
                )]),
                Some(VaultProblem::Unauthenticated) => Ok(vec![Candidate::info(
                    "vault:login",
                    "Not logged in to Bitwarden",
                    "Run `bw login` first",
                )]),
                None => Err(ProviderError::new(format!("bw failed: {}", stderr.trim()))),
            };
        }

        let items = parse_items(&output.stdout)?;
        let mut rows = Vec::new();
        let mut lookups = 0;
        for item in &items {
            rows.extend(item_candidate(item));
            if lookups < MAX_TOTP_LOOKUPS && has_totp(item) {
                lookups += 1;
                if let Some(code) = fetch_totp(&item.id, &query.cancel)? {
                    rows.push(totp_candidate(item, code));
                }
            }
        }
        Ok(rows)
    }

    fn latency(&self) -> Latency {
        Latency::Blocking
    }
}

fn generate(length: usize, cancel: &CancelToken) -> Result<Vec<Candidate>, ProviderError> {
    if !command_exists("bw") {
        return Ok(vec![Candidate::info(
            "vault:missing",
            "Bitwarden CLI not found",
            "Install `bw` to generate passwords",
        )]);
    }
    let args = generate_args(length);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let output = run_command("bw", &args, BW_TIMEOUT, Some(cancel))?;
    let password = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || password.is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProviderError::new(format!("bw generate failed: {}", stderr.trim())));
    }
    Ok(vec![generated_candidate(password)])
}

pub fn generate_args(length: usize) -> Vec<String> {
    [
        "generate",
        "--uppercase",
        "--lowercase",
        "--number",
        "--special",
        "--length",
    ]
    .into_iter()
    .map(str::to_string)
    .chain([length.to_string()])
    .collect()
}

fn generated_candidate(password: String) -> Candidate {
    let length = password.chars().count();
    Candidate::new(
        "vault:generated",
        "Generated password",
        Action::CopyText { text: password },
    )
    .with_subtitle(format!("{length} characters · Copy to clipboard"))
    .with_icon("dialog-password")
    .pinned()
}

fn has_totp(item: &VaultItem) -> bool {
    item.login
        .as_ref()
        .and_then(|login| login.totp.as_deref())
        .is_some_and(|seed| !seed.trim().is_empty())
}

/// `Ok(None)` when bw has no code for the item (no seed or locked).
fn fetch_totp(id: &str, cancel: &CancelToken) -> Result<Option<String>, ProviderError> {
    let output = run_command(
        "bw",
        &["get", "totp", id, "--nointeraction"],
        TOTP_TIMEOUT,
        Some(cancel),
    )?;
    let code = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || code.is_empty() {
        debug!(id, "no totp code");
        return Ok(None);
    }
    Ok(Some(code))
}

fn totp_candidate(item: &VaultItem, code: String) -> Candidate {
    Candidate::new(
        format!("vault:totp:{}", item.id),
        format!("{} · one-time code", item.name),
        Action::CopyText { text: code },
    )
    .with_subtitle("Copy TOTP code")
    .with_icon("dialog-password")
    .pinned()
}

pub fn parse_items(raw: &[u8]) -> Result<Vec<VaultItem>, ProviderError> {
    serde_json::from_slice(raw).map_err(|e| ProviderError::new(format!("bad bw output: {e}")))
}

pub fn classify_failure(stderr: &str) -> Option<VaultProblem> {
    let lower = stderr.to_lowercase();
    if lower.contains("not logged in") || lower.contains("unauthenticated") {
        Some(VaultProblem::Unauthenticated)
    } else if lower.contains("locked") || lower.contains("master password") {
        Some(VaultProblem::Locked)
    } else {
        None
    }
}

/// Logins with a password become copy rows; everything else is skipped.
fn item_candidate(item: &VaultItem) -> Option<Candidate> {
    let login = item.login.as_ref()?;
    let password = login.password.clone().filter(|p| !p.is_empty())?;
    let username = login.username.clone().unwrap_or_default();
    let url = login
        .uris
        .first()
        .and_then(|u| u.uri.clone())
        .unwrap_or_default();
    let subtitle = match (username.is_empty(), url.is_empty()) {
        (false, false) => format!("{username} · {url}"),
        (false, true) => username,
        (true, false) => url,
        (true, true) => "Copy password".to_string(),
    };
    Some(
        Candidate::new(
            format!("vault:{}", item.id),
            item.name.clone(),
            Action::CopyText { text: password },
        )
        .with_subtitle(subtitle)
        .with_icon("dialog-password")
        .pinned(),
    )
}
