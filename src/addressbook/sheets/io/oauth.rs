//! Installed-application OAuth for the Sheets API: client secrets from
//! `credentials.json`, a cached refresh token in `token.json`.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::addressbook::sheets::error::{ExportError, Result};

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const LOOPBACK_REDIRECT: &str = "http://localhost";
/// Tokens this close to expiry are refreshed rather than used.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

/// Parses a client secrets document as downloaded from the cloud console.
pub fn parse_client_secrets(text: &str) -> Result<ClientSecrets> {
    let file: ClientSecretsFile = serde_json::from_str(text)
        .map_err(|error| ExportError::Credentials(error.to_string()))?;
    file.installed.or(file.web).ok_or_else(|| {
        ExportError::Credentials("expected an \"installed\" or \"web\" client section".into())
    })
}

pub fn load_client_secrets(path: &Path) -> Result<ClientSecrets> {
    if !path.exists() {
        return Err(ExportError::Credentials(format!(
            "{} not found. Create an OAuth client (Desktop app) with the Google Sheets API \
             enabled and download its JSON to this path.",
            path.display()
        )));
    }
    parse_client_secrets(&fs::read_to_string(path)?)
}

/// The cached grant. Only the refresh token is required; the access token is
/// reused while it is still valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(default)]
    pub access_token: Option<String>,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Returns the access token if it stays valid past the expiry margin.
    pub fn usable_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let expires_at = self.expires_at?;
        if expires_at <= now + Duration::seconds(EXPIRY_MARGIN_SECS) {
            return None;
        }
        self.access_token.as_deref()
    }
}

pub fn load_token(path: &Path) -> Result<Option<StoredToken>> {
    if !path.exists() {
        return Ok(None);
    }
    let token = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(Some(token))
}

pub fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(token)?)?;
    Ok(())
}

/// URL the user opens to grant spreadsheet access. After consenting the
/// browser is redirected to `http://localhost/?code=...`; that code is what
/// [`exchange_code`] expects.
pub fn consent_url(secrets: &ClientSecrets) -> Result<Url> {
    let mut url = Url::parse(&secrets.auth_uri)
        .map_err(|error| ExportError::Credentials(format!("auth_uri: {error}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", secrets.client_id.as_str())
        .append_pair("redirect_uri", LOOPBACK_REDIRECT)
        .append_pair("response_type", "code")
        .append_pair("scope", SHEETS_SCOPE)
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent");
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn request_token(
    client: &Client,
    secrets: &ClientSecrets,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    let response = client.post(&secrets.token_uri).form(form).send()?;
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        let reason = serde_json::from_str::<TokenErrorResponse>(&body)
            .map(|failure| match failure.error_description {
                Some(description) => format!("{}: {description}", failure.error),
                None => failure.error,
            })
            .unwrap_or(body);
        return Err(ExportError::Auth(format!(
            "token endpoint returned {status}: {reason}"
        )));
    }
    Ok(serde_json::from_str(&body)?)
}

fn into_stored(
    response: TokenResponse,
    previous_refresh: Option<&str>,
    now: DateTime<Utc>,
) -> Result<StoredToken> {
    let refresh_token = response
        .refresh_token
        .or_else(|| previous_refresh.map(str::to_string))
        .ok_or_else(|| {
            ExportError::Auth("token endpoint did not return a refresh token".into())
        })?;
    Ok(StoredToken {
        access_token: Some(response.access_token),
        refresh_token,
        expires_at: response
            .expires_in
            .map(|seconds| now + Duration::seconds(seconds)),
    })
}

/// Trades a one-time authorization code for a stored grant.
#[instrument(level = "info", skip_all)]
pub fn exchange_code(
    client: &Client,
    secrets: &ClientSecrets,
    code: &str,
) -> Result<StoredToken> {
    let response = request_token(
        client,
        secrets,
        &[
            ("code", code.trim()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", LOOPBACK_REDIRECT),
            ("grant_type", "authorization_code"),
        ],
    )?;
    into_stored(response, None, Utc::now())
}

/// Obtains a fresh access token from the refresh token.
#[instrument(level = "debug", skip_all)]
pub fn refresh(
    client: &Client,
    secrets: &ClientSecrets,
    token: &StoredToken,
) -> Result<StoredToken> {
    let response = request_token(
        client,
        secrets,
        &[
            ("refresh_token", token.refresh_token.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ],
    )?;
    into_stored(response, Some(&token.refresh_token), Utc::now())
}

/// Returns a valid access token, refreshing and re-saving the cached grant
/// when needed. Fails if no grant has been stored yet.
#[instrument(level = "info", skip_all, fields(token = %token_path.display()))]
pub fn authorize(credentials_path: &Path, token_path: &Path) -> Result<String> {
    let secrets = load_client_secrets(credentials_path)?;
    let stored = load_token(token_path)?.ok_or_else(|| {
        ExportError::Auth(format!(
            "no cached token at {}; run the setup command first",
            token_path.display()
        ))
    })?;

    if let Some(access_token) = stored.usable_access_token(Utc::now()) {
        debug!("reusing cached access token");
        return Ok(access_token.to_string());
    }

    let client = Client::builder().build()?;
    let refreshed = refresh(&client, &secrets, &stored)?;
    save_token(token_path, &refreshed)?;
    info!("access token refreshed");
    refreshed
        .access_token
        .ok_or_else(|| ExportError::Auth("refresh returned no access token".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const INSTALLED: &str = r#"{
        "installed": {
            "client_id": "123.apps.googleusercontent.com",
            "client_secret": "shh",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    #[test]
    fn installed_section_is_read() {
        let secrets = parse_client_secrets(INSTALLED).expect("secrets");
        assert_eq!(secrets.client_id, "123.apps.googleusercontent.com");
        assert_eq!(secrets.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn web_section_falls_back_to_default_endpoints() {
        let secrets =
            parse_client_secrets(r#"{"web": {"client_id": "id", "client_secret": "secret"}}"#)
                .expect("secrets");
        assert_eq!(secrets.auth_uri, DEFAULT_AUTH_URI);
    }

    #[test]
    fn secrets_without_client_section_are_rejected() {
        let error = parse_client_secrets(r#"{"other": {}}"#).expect_err("no section");
        assert!(matches!(error, ExportError::Credentials(_)));
    }

    #[test]
    fn missing_credentials_file_explains_setup() {
        let dir = tempdir().expect("temp dir");
        let error =
            load_client_secrets(&dir.path().join("credentials.json")).expect_err("missing");
        assert!(error.to_string().contains("credentials.json not found"));
    }

    #[test]
    fn consent_url_requests_offline_spreadsheet_access() {
        let secrets = parse_client_secrets(INSTALLED).expect("secrets");
        let url = consent_url(&secrets).expect("url");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        assert!(pairs.contains(&("scope".into(), SHEETS_SCOPE.into())));
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
    }

    #[test]
    fn expiring_tokens_are_not_reused() {
        let now = Utc::now();
        let mut token = StoredToken {
            access_token: Some("ya29.token".into()),
            refresh_token: "1//refresh".into(),
            expires_at: Some(now + Duration::seconds(30)),
        };
        assert_eq!(token.usable_access_token(now), None);
        token.expires_at = Some(now + Duration::minutes(30));
        assert_eq!(token.usable_access_token(now), Some("ya29.token"));
        token.expires_at = None;
        assert_eq!(token.usable_access_token(now), None);
    }

    #[test]
    fn refresh_keeps_previous_refresh_token() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: "new".into(),
            expires_in: Some(3599),
            refresh_token: None,
        };
        let stored = into_stored(response, Some("1//old"), now).expect("stored");
        assert_eq!(stored.refresh_token, "1//old");
        assert_eq!(stored.expires_at, Some(now + Duration::seconds(3599)));
    }

    #[test]
    fn token_file_round_trips() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("token.json");
        assert_eq!(load_token(&path).expect("load"), None);
        let token = StoredToken {
            access_token: None,
            refresh_token: "1//refresh".into(),
            expires_at: None,
        };
        save_token(&path, &token).expect("save");
        assert_eq!(load_token(&path).expect("load"), Some(token));
    }

    #[test]
    fn missing_token_asks_for_setup() {
        let dir = tempdir().expect("temp dir");
        let credentials = dir.path().join("credentials.json");
        fs::write(&credentials, INSTALLED).expect("write secrets");
        let error = authorize(&credentials, &dir.path().join("token.json")).expect_err("no token");
        assert!(error.to_string().contains("run the setup command"));
    }
}
