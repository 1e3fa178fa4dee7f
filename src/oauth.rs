//! Google OAuth 2.0 for installed applications: token refresh and
//! loopback-redirect consent.

use chrono::{Duration, Utc};
use colored::Colorize;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::credentials::{Authorizer, Credential, DEFAULT_TOKEN_URI};
use crate::error::{ReportError, Result};

pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Browsers open speculative connections that never send a request.
const REQUEST_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

const SUCCESS_PAGE: &str =
    "The authentication flow has completed. You may close this window.";

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// OAuth client registration as downloaded from the Google Cloud console.
#[derive(Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecret")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ReportError::Credential(format!(
                "cannot read client secret file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content).map_err(|e| match e {
            ReportError::Credential(msg) => {
                ReportError::Credential(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: ClientSecretFile = serde_json::from_str(content)?;
        file.installed.or(file.web).ok_or_else(|| {
            ReportError::Credential(
                "client secret has neither an \"installed\" nor a \"web\" section".to_string(),
            )
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Authorizer backed by Google's OAuth endpoints.
///
/// The client secret file is only read when a consent flow is needed;
/// refreshes use the client identity stored in the credential.
pub struct GoogleAuthorizer {
    client_secret_path: PathBuf,
    http: reqwest::blocking::Client,
    open_browser: bool,
}

impl GoogleAuthorizer {
    pub fn new(client_secret_path: impl Into<PathBuf>) -> Self {
        Self {
            client_secret_path: client_secret_path.into(),
            http: crate::api::http_client(),
            open_browser: true,
        }
    }

    /// Print the consent URL without trying to launch a browser.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    fn token_request(&self, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        tracing::debug!(%token_uri, grant = form[0].1, "token request");
        let resp = self.http.post(token_uri).form(form).send()?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<TokenResponse>()?);
        }

        let body = resp.text().unwrap_or_default();
        if status.as_u16() == 400 || status.as_u16() == 401 {
            let parsed: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
            let reason = match parsed.error_description {
                Some(desc) if !parsed.error.is_empty() => format!("{}: {}", parsed.error, desc),
                _ if !parsed.error.is_empty() => parsed.error,
                _ => body,
            };
            return Err(ReportError::RefreshRejected(reason));
        }

        Err(ReportError::Api {
            status: status.as_u16(),
            body,
        })
    }

    fn exchange_code(
        &self,
        secret: &ClientSecret,
        code: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<Credential> {
        let response = self
            .token_request(
                &secret.token_uri,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", redirect_uri),
                    ("client_id", secret.client_id.as_str()),
                    ("client_secret", secret.client_secret.as_str()),
                ],
            )
            .map_err(|e| match e {
                ReportError::RefreshRejected(reason) => {
                    ReportError::Credential(format!("code exchange rejected: {}", reason))
                }
                other => other,
            })?;

        Ok(Credential {
            token: response.access_token,
            refresh_token: response.refresh_token,
            token_uri: secret.token_uri.clone(),
            client_id: secret.client_id.clone(),
            client_secret: secret.client_secret.clone(),
            scopes: scopes.to_vec(),
            expiry: response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }
}

impl Authorizer for GoogleAuthorizer {
    fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| ReportError::RefreshRejected("no refresh token".to_string()))?;

        let response = self.token_request(
            &credential.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", credential.client_id.as_str()),
                ("client_secret", credential.client_secret.as_str()),
            ],
        )?;

        let scopes = match response.scope {
            Some(granted) => granted.split_whitespace().map(str::to_string).collect(),
            None => credential.scopes.clone(),
        };

        Ok(Credential {
            token: response.access_token,
            refresh_token: response
                .refresh_token
                .or_else(|| credential.refresh_token.clone()),
            scopes,
            expiry: response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
            ..credential.clone()
        })
    }

    fn consent(&self, scopes: &[String]) -> Result<Credential> {
        let secret = ClientSecret::from_file(&self.client_secret_path)?;
        let receiver = LoopbackReceiver::bind()?;
        let redirect_uri = receiver.redirect_uri();
        let state = generate_state();
        let url = authorization_url(&secret, scopes, &redirect_uri, &state);

        println!(
            "{} Please visit this URL to authorize this application:\n  {}",
            ">>".yellow(),
            url.cyan()
        );
        if self.open_browser {
            launch_browser(&url);
        }

        let code = receiver.receive_code(&state)?;
        println!("  {} Authorization received", "+".green());
        self.exchange_code(&secret, &code, &redirect_uri, scopes)
    }
}

/// Consent URL for the installed-app flow.
pub fn authorization_url(
    secret: &ClientSecret,
    scopes: &[String],
    redirect_uri: &str,
    state: &str,
) -> String {
    let scope = scopes.join(" ");
    let params = [
        ("response_type", "code"),
        ("client_id", secret.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("scope", scope.as_str()),
        ("state", state),
        ("access_type", "offline"),
        ("prompt", "consent"),
    ];
    let query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    format!("{}?{}", secret.auth_uri, query.join("&"))
}

/// One-shot HTTP listener on the loopback interface that captures the
/// authorization redirect.
pub struct LoopbackReceiver {
    listener: TcpListener,
    port: u16,
}

impl LoopbackReceiver {
    pub fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    /// Block until the browser delivers a code (or an error) for `state`.
    /// Requests without either, such as favicon fetches, are answered and skipped.
    pub fn receive_code(&self, state: &str) -> Result<String> {
        for stream in self.listener.incoming() {
            let mut stream = stream?;
            stream.set_read_timeout(Some(REQUEST_READ_TIMEOUT))?;
            let params = match read_request_params(&stream) {
                Ok(params) => params,
                Err(e) => {
                    tracing::debug!(error = %e, "ignoring malformed loopback request");
                    continue;
                }
            };

            if let Some(error) = params.get("error") {
                respond(&mut stream, "Authorization was declined. You may close this window.");
                return Err(ReportError::Credential(format!("consent declined: {}", error)));
            }

            let Some(code) = params.get("code") else {
                respond(&mut stream, "");
                continue;
            };

            if params.get("state").map(String::as_str) != Some(state) {
                respond(&mut stream, "State mismatch. You may close this window.");
                return Err(ReportError::Credential(
                    "state mismatch in authorization response".to_string(),
                ));
            }

            respond(&mut stream, SUCCESS_PAGE);
            return Ok(code.clone());
        }

        Err(ReportError::Credential(
            "loopback listener closed before authorization completed".to_string(),
        ))
    }
}

fn read_request_params(stream: &TcpStream) -> std::io::Result<HashMap<String, String>> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    // Drain headers so the browser sees a clean response.
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header)? == 0 || header.trim().is_empty() {
            break;
        }
    }

    let target = request_line.split_whitespace().nth(1).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "missing request target")
    })?;
    Ok(parse_query(target))
}

/// Decode the query string of a request target such as `/?code=x&state=y`.
pub fn parse_query(target: &str) -> HashMap<String, String> {
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let k = urlencoding::decode(&k.replace('+', " ")).ok()?.into_owned();
            let v = urlencoding::decode(&v.replace('+', " ")).ok()?.into_owned();
            Some((k, v))
        })
        .collect()
}

fn respond(stream: &mut TcpStream, body: &str) {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()) {
        tracing::debug!(error = %e, "failed to answer loopback request");
    }
}

fn launch_browser(url: &str) {
    if let Err(e) = open::that(url) {
        tracing::debug!(error = %e, "could not launch a browser");
        println!("  {} Could not open a browser; open the URL above manually", "!".yellow());
    }
}

/// Unguessable `state` value for the consent round trip.
fn generate_state() -> String {
    Uuid::new_v4().simple().to_string()
}
