//! Microsoft Graph drive client: token exchange, paged listing, downloads.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;

use super::RemoteDrive;
use crate::config::DriveConfig;
use crate::schema::RemoteFile;
use crate::{Error, Result};

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Bearer token with its expiry, held explicitly by the client.
///
/// Refreshed when absent or within a minute of expiring; there is no
/// caching beyond this struct.
#[derive(Debug, Clone)]
struct AuthContext {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AuthContext {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > Duration::seconds(60)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DriveItem {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default, rename = "lastModifiedDateTime")]
    last_modified: Option<String>,
    #[serde(default, rename = "@microsoft.graph.downloadUrl")]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(default, rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// Client for the drive holding the press export folder.
pub struct GraphClient {
    http: Client,
    settings: DriveConfig,
    auth: Option<AuthContext>,
}

impl GraphClient {
    pub fn new(settings: DriveConfig) -> Self {
        Self {
            http: Client::new(),
            settings,
            auth: None,
        }
    }

    /// Exchange client credentials for a bearer token.
    ///
    /// A response without a token is fatal for the run - nothing
    /// downstream can proceed without one.
    fn ensure_token(&mut self) -> Result<String> {
        if let Some(auth) = &self.auth {
            if auth.is_fresh(Utc::now()) {
                return Ok(auth.token.clone());
            }
        }

        let url = format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.settings.tenant_id
        );
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
        ];
        let response: TokenResponse = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .map_err(|e| Error::Auth(format!("token exchange failed: {}", e)))?
            .json()
            .map_err(|e| Error::Auth(format!("token response unreadable: {}", e)))?;

        let token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth("token endpoint returned no access token".to_string()))?;
        let expires_in = response.expires_in.unwrap_or(3600);
        self.auth = Some(AuthContext {
            token: token.clone(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        });
        Ok(token)
    }

    fn fetch_page(&self, url: &str, token: &str) -> Result<ListPage> {
        let response = self.http.get(url).bearer_auth(token).send()?;
        if !response.status().is_success() {
            return Err(Error::Drive(format!("listing returned {}", response.status())));
        }
        Ok(response.json()?)
    }
}

impl RemoteDrive for GraphClient {
    fn list_folder(&mut self) -> Result<Vec<RemoteFile>> {
        let token = self.ensure_token()?;
        let first = format!(
            "{}/users/{}/drive/root:/{}:/children",
            GRAPH_BASE, self.settings.user, self.settings.folder
        );

        let mut files = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next {
            let page = self.fetch_page(&url, &token)?;
            for item in page.value {
                if !item.name.trim().to_lowercase().ends_with(".csv") {
                    continue;
                }
                let (Some(size), Some(modified), Some(download_url)) =
                    (item.size, item.last_modified, item.download_url)
                else {
                    // folders and pending uploads carry no download URL
                    debug!("listing entry without file metadata: {}", item.name);
                    continue;
                };
                let last_modified = DateTime::parse_from_rfc3339(&modified)
                    .map_err(|e| {
                        Error::Drive(format!("bad lastModifiedDateTime for {}: {}", item.name, e))
                    })?
                    .with_timezone(&Utc);
                files.push(RemoteFile {
                    name: item.name,
                    size,
                    last_modified,
                    download_url,
                });
            }
            next = page.next_link;
        }
        debug!("listing returned {} csv files", files.len());
        Ok(files)
    }

    fn download(&mut self, file: &RemoteFile) -> Result<Vec<u8>> {
        // Download URLs from the listing are pre-authenticated.
        let response = self.http.get(&file.download_url).send()?;
        if !response.status().is_success() {
            return Err(Error::Drive(format!(
                "download of {} returned {}",
                file.display_name(),
                response.status()
            )));
        }
        Ok(response.bytes()?.to_vec())
    }
}
