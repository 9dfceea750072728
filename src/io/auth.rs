use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::types::{SkytraceError, SkytraceResult};

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

// Refresh slightly before the reported expiry so in-flight requests never
// carry a token that dies mid-call
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Where the bearer token comes from, decided once at startup.
///
/// The chain mirrors the usual Google default-credential lookup: an explicit
/// token env var, then the credential file named by
/// `GOOGLE_APPLICATION_CREDENTIALS`, then the gcloud application-default
/// file, then the GCE metadata server.
#[derive(Debug, Clone)]
enum CredentialSource {
    /// Pre-minted token from `EE_ACCESS_TOKEN` (dev and test use)
    StaticToken(String),
    /// gcloud authorized-user credentials, exchanged via refresh grant
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
    /// GCE/Cloud Run metadata server token endpoint
    MetadataServer,
    /// Nothing usable found; requests will fail at query time
    Unavailable(String),
}

#[derive(Debug, Deserialize)]
struct CredentialFile {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Process-wide credential holder with an internally cached access token.
///
/// Shared read-only across requests; the cache mutex is the only interior
/// state and is held only for the duration of a lookup or store.
pub struct Credentials {
    source: CredentialSource,
    http: reqwest::blocking::Client,
    cached: Mutex<Option<CachedToken>>,
}

/// Resolve credentials once at process startup.
///
/// Never fails: an empty chain is logged and the service starts anyway, with
/// every catalog query failing until credentials appear in the environment.
pub fn bootstrap() -> Credentials {
    let source = resolve_source();
    let http = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new());
    let credentials = Credentials {
        source,
        http,
        cached: Mutex::new(None),
    };

    match &credentials.source {
        CredentialSource::Unavailable(reason) => {
            log::warn!(
                "catalog authentication unavailable ({}); requests will fail at query time",
                reason
            );
        }
        source => match credentials.bearer_token() {
            Ok(_) => log::info!("catalog authentication ready ({})", source_name(source)),
            Err(e) => log::warn!(
                "catalog authentication failed at startup ({}): {}",
                source_name(source),
                e
            ),
        },
    }
    credentials
}

fn source_name(source: &CredentialSource) -> &'static str {
    match source {
        CredentialSource::StaticToken(_) => "static token",
        CredentialSource::AuthorizedUser { .. } => "authorized user",
        CredentialSource::MetadataServer => "metadata server",
        CredentialSource::Unavailable(_) => "unavailable",
    }
}

fn resolve_source() -> CredentialSource {
    if let Ok(token) = std::env::var("EE_ACCESS_TOKEN") {
        if !token.is_empty() {
            return CredentialSource::StaticToken(token);
        }
    }

    if let Ok(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
        return match read_credential_file(Path::new(&path)) {
            Ok(source) => source,
            Err(e) => CredentialSource::Unavailable(format!("{}: {}", path, e)),
        };
    }

    if let Some(path) = gcloud_default_path() {
        if path.exists() {
            if let Ok(source) = read_credential_file(&path) {
                return source;
            }
        }
    }

    // Last resort; only answers inside Google Cloud
    if std::env::var("EE_USE_METADATA_SERVER").is_ok() {
        return CredentialSource::MetadataServer;
    }

    CredentialSource::Unavailable(
        "no EE_ACCESS_TOKEN, GOOGLE_APPLICATION_CREDENTIALS or gcloud default credentials"
            .to_string(),
    )
}

fn gcloud_default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gcloud/application_default_credentials.json"))
}

fn read_credential_file(path: &Path) -> SkytraceResult<CredentialSource> {
    let raw = std::fs::read_to_string(path)?;
    let file: CredentialFile = serde_json::from_str(&raw)?;
    match file.kind.as_str() {
        "authorized_user" => match (file.client_id, file.client_secret, file.refresh_token) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => {
                Ok(CredentialSource::AuthorizedUser {
                    client_id,
                    client_secret,
                    refresh_token,
                })
            }
            _ => Err(SkytraceError::Auth(
                "authorized_user credentials missing client or refresh token fields".to_string(),
            )),
        },
        // Self-signed JWT exchange is out of scope; point at the flows we do
        // support instead of silently producing bad tokens
        "service_account" => Err(SkytraceError::Auth(
            "service_account key files are not supported; run 'gcloud auth application-default \
             login' or provide EE_ACCESS_TOKEN"
                .to_string(),
        )),
        other => Err(SkytraceError::Auth(format!(
            "unrecognized credential type '{}'",
            other
        ))),
    }
}

impl Credentials {
    /// Current bearer token, fetching or refreshing as needed.
    ///
    /// Blocking; callers reach this from the blocking pool only.
    pub fn bearer_token(&self) -> SkytraceResult<String> {
        if let CredentialSource::StaticToken(token) = &self.source {
            return Ok(token.clone());
        }

        if let Ok(guard) = self.cached.lock() {
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.token.clone());
                }
            }
        }

        let fresh = self.fetch_token()?;
        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some(CachedToken {
                token: fresh.token.clone(),
                expires_at: fresh.expires_at,
            });
        }
        Ok(fresh.token)
    }

    fn fetch_token(&self) -> SkytraceResult<CachedToken> {
        let response: TokenResponse = match &self.source {
            CredentialSource::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
            } => {
                let params = [
                    ("grant_type", "refresh_token"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("refresh_token", refresh_token.as_str()),
                ];
                let resp = self.http.post(TOKEN_ENDPOINT).form(&params).send()?;
                if !resp.status().is_success() {
                    return Err(SkytraceError::Auth(format!(
                        "token exchange failed with status {}",
                        resp.status()
                    )));
                }
                resp.json()?
            }
            CredentialSource::MetadataServer => {
                let resp = self
                    .http
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()?;
                if !resp.status().is_success() {
                    return Err(SkytraceError::Auth(format!(
                        "metadata server returned status {}",
                        resp.status()
                    )));
                }
                resp.json()?
            }
            CredentialSource::StaticToken(token) => TokenResponse {
                access_token: token.clone(),
                expires_in: None,
            },
            CredentialSource::Unavailable(reason) => {
                return Err(SkytraceError::Auth(reason.clone()));
            }
        };

        let lifetime = response
            .expires_in
            .unwrap_or(3600)
            .saturating_sub(EXPIRY_MARGIN_SECS);
        Ok(CachedToken {
            token: response.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        })
    }

    /// Credentials that always fail, for tests exercising the error path
    #[doc(hidden)]
    pub fn unavailable(reason: &str) -> Credentials {
        Credentials {
            source: CredentialSource::Unavailable(reason.to_string()),
            http: reqwest::blocking::Client::new(),
            cached: Mutex::new(None),
        }
    }

    /// Credentials backed by a fixed token, for tests and dev setups
    pub fn from_static_token(token: &str) -> Credentials {
        Credentials {
            source: CredentialSource::StaticToken(token.to_string()),
            http: reqwest::blocking::Client::new(),
            cached: Mutex::new(None),
        }
    }
}
