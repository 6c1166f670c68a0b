use std::{collections::HashMap, path::Path, str::FromStr};

use reqwest::Url;

use crate::error::Error;

pub const DEFAULT_FILENAME: &str = "blob-storage-conn-str";
pub const CONNECTION_STRING_ENV: &str = "AZURE_STORAGE_CONNECTION_STRING";

// Well-known Azurite/emulator account.
const DEV_ACCOUNT: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Read a connection string from `path`, trimming surrounding whitespace.
pub async fn read_file(path: &Path) -> Result<String, Error> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::CredentialsUnavailable {
            path: path.to_owned(),
            source,
        })?;
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::EmptyCredentials);
    }
    Ok(content.to_owned())
}

/// Resolve the connection string, preferring an explicit value (usually from the
/// environment) over the credential file.
pub async fn load(explicit: Option<&str>, path: &Path) -> Result<ConnectionString, Error> {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => {
            log::info!("using connection string from {}", CONNECTION_STRING_ENV);
            value.parse()
        }
        None => read_file(path).await?.parse(),
    }
}

#[derive(Clone)]
pub enum Credential {
    SharedKey(Vec<u8>),
    Sas(String),
}

#[derive(Clone)]
pub struct ConnectionString {
    pub account: String,
    pub credential: Credential,
    pub blob_endpoint: Url,
}

impl FromStr for ConnectionString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pairs = s
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.split_once('=')
                    .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_owned()))
                    .ok_or(Error::InvalidConnectionString("expected key=value pairs"))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        if pairs.is_empty() {
            return Err(Error::EmptyCredentials);
        }

        if pairs
            .get("usedevelopmentstorage")
            .map_or(false, |v| v.eq_ignore_ascii_case("true"))
        {
            return Ok(Self {
                account: DEV_ACCOUNT.to_owned(),
                credential: Credential::SharedKey(
                    base64::decode(DEV_ACCOUNT_KEY)
                        .map_err(|_| Error::InvalidConnectionString("invalid AccountKey"))?,
                ),
                blob_endpoint: parse_endpoint(DEV_BLOB_ENDPOINT)?,
            });
        }

        let credential = match (pairs.get("accountkey"), pairs.get("sharedaccesssignature")) {
            (Some(key), _) => Credential::SharedKey(
                base64::decode(key)
                    .map_err(|_| Error::InvalidConnectionString("invalid AccountKey"))?,
            ),
            (None, Some(sas)) => Credential::Sas(sas.trim_start_matches('?').to_owned()),
            (None, None) => {
                return Err(Error::InvalidConnectionString(
                    "missing AccountKey or SharedAccessSignature",
                ))
            }
        };

        let blob_endpoint = match pairs.get("blobendpoint") {
            Some(endpoint) => parse_endpoint(endpoint)?,
            None => {
                let account = pairs
                    .get("accountname")
                    .ok_or(Error::InvalidConnectionString("missing AccountName"))?;
                let protocol = pairs
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                let suffix = pairs
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or("core.windows.net");
                parse_endpoint(&format!("{}://{}.blob.{}", protocol, account, suffix))?
            }
        };

        let account = match pairs.get("accountname") {
            Some(account) => account.clone(),
            None => blob_endpoint
                .host_str()
                .and_then(|h| h.split('.').next())
                .map(str::to_owned)
                .ok_or(Error::InvalidConnectionString("missing AccountName"))?,
        };
        if matches!(credential, Credential::SharedKey(_)) && !pairs.contains_key("accountname") {
            return Err(Error::InvalidConnectionString("missing AccountName"));
        }

        Ok(Self {
            account,
            credential,
            blob_endpoint,
        })
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, Error> {
    let url = Url::parse(endpoint.trim_end_matches('/'))
        .map_err(|_| Error::InvalidConnectionString("invalid blob endpoint"))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidConnectionString("invalid blob endpoint"));
    }
    Ok(url)
}
