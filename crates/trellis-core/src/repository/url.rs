use std::fs::{self, File};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::{Body, Client};
use reqwest::header::{CONTENT_LENGTH, LAST_MODIFIED};
use tracing::debug;
use trellis_schema::Artifact;

use super::{Repository, RepositoryError, Resource};

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*href\s*=\s*["']([^"'#?]+)["']"#).expect("static regex")
});

/// Repository served over HTTP(S) with a blocking client.
#[derive(Debug, Clone)]
pub struct UrlRepository {
    client: Client,
}

impl UrlRepository {
    /// Client with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, RepositoryError> {
        Self::with_timeouts(None, None)
    }

    /// Client with explicit connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn with_timeouts(
        connect: Option<Duration>,
        read: Option<Duration>,
    ) -> Result<Self, RepositoryError> {
        let mut builder = Client::builder().user_agent(crate::USER_AGENT);
        if let Some(connect) = connect {
            builder = builder.connect_timeout(connect);
        }
        if let Some(read) = read {
            builder = builder.timeout(read);
        }
        let client = builder.build().map_err(|e| http_error("client", &e))?;
        Ok(Self { client })
    }
}

fn http_error(url: &str, e: &reqwest::Error) -> RepositoryError {
    RepositoryError::Http {
        url: url.to_string(),
        message: e.to_string(),
    }
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Child entry names found in an HTML directory index.
fn parse_listing(parent: &str, html: &str) -> Vec<String> {
    let parent_path = parent
        .split_once("://")
        .and_then(|(_, rest)| rest.find('/').map(|i| &rest[i..]))
        .unwrap_or("/");

    let mut names: Vec<String> = HREF
        .captures_iter(html)
        .filter_map(|cap| {
            let href = cap.get(1)?.as_str();
            let relative = if let Some(rest) = href.strip_prefix(parent) {
                rest
            } else if let Some(rest) = href.strip_prefix(parent_path).filter(|_| href.starts_with('/')) {
                rest
            } else if href.contains("://") || href.starts_with('/') || href.starts_with("..") {
                return None;
            } else {
                href.strip_prefix("./").unwrap_or(href)
            };
            let name = relative.trim_end_matches('/');
            (!name.is_empty() && !name.contains('/')).then(|| name.to_string())
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

impl Repository for UrlRepository {
    fn name(&self) -> &str {
        "url"
    }

    fn resource(&self, url: &str) -> Result<Resource, RepositoryError> {
        let response = self
            .client
            .head(url)
            .send()
            .map_err(|e| http_error(url, &e))?;
        if !response.status().is_success() {
            debug!("HEAD {url}: {}", response.status());
            return Ok(Resource::missing(url, false));
        }
        let headers = response.headers();
        let last_modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok(Resource {
            name: url.to_string(),
            exists: true,
            last_modified,
            content_length,
            local: false,
        })
    }

    fn get(&self, url: &str, destination: &Path) -> Result<(), RepositoryError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| http_error(url, &e))?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(RepositoryError::NotFound(url.to_string())),
            status if !status.is_success() => {
                return Err(RepositoryError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            _ => {}
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| RepositoryError::io("create", parent, e))?;
        }
        let mut file =
            File::create(destination).map_err(|e| RepositoryError::io("create", destination, e))?;
        response
            .copy_to(&mut file)
            .map_err(|e| http_error(url, &e))?;
        Ok(())
    }

    fn put(
        &self,
        artifact: &Artifact,
        source: &Path,
        url: &str,
        overwrite: bool,
    ) -> Result<(), RepositoryError> {
        if !overwrite && self.exists(url)? {
            return Err(RepositoryError::AlreadyExists(url.to_string()));
        }
        let file = File::open(source).map_err(|e| RepositoryError::io("open", source, e))?;
        let response = self
            .client
            .put(url)
            .body(Body::from(file))
            .send()
            .map_err(|e| http_error(url, &e))?;
        if !response.status().is_success() {
            return Err(RepositoryError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        debug!("put {artifact} to {url}");
        Ok(())
    }

    fn list(&self, parent: &str) -> Result<Option<Vec<String>>, RepositoryError> {
        let parent = if parent.ends_with('/') {
            parent.to_string()
        } else {
            format!("{parent}/")
        };
        let response = self
            .client
            .get(&parent)
            .send()
            .map_err(|e| http_error(&parent, &e))?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let html = response.text().map_err(|e| http_error(&parent, &e))?;
        Ok(Some(parse_listing(&parent, &html)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing_relative_and_absolute() {
        let html = r#"<html><body>
            <a href="../">Parent Directory</a>
            <a href="1.0/">1.0/</a>
            <a href="./1.1/">1.1/</a>
            <a href="/repo/acme/lib/2.0/">2.0/</a>
            <a href="http://elsewhere/x/">x</a>
            <a href="?C=M;O=A">Last modified</a>
        </body></html>"#;
        let names = parse_listing("http://host/repo/acme/lib/", html);
        assert_eq!(names, vec!["1.0", "1.1", "2.0"]);
    }

    #[test]
    fn test_resource_and_get_via_http() {
        let mut server = mockito::Server::new();
        let head = server
            .mock("HEAD", "/repo/lib-1.0.jar")
            .with_status(200)
            .with_header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")
            .create();
        let get = server
            .mock("GET", "/repo/lib-1.0.jar")
            .with_status(200)
            .with_body("payload")
            .create();
        let missing = server.mock("HEAD", "/repo/none.jar").with_status(404).create();

        let repo = UrlRepository::new().unwrap();
        let url = format!("{}/repo/lib-1.0.jar", server.url());
        let res = repo.resource(&url).unwrap();
        assert!(res.exists);
        assert!(!res.local);
        assert_eq!(
            res.last_modified.map(|d| d.timestamp()),
            Some(1_445_412_480)
        );

        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("lib.jar");
        repo.get(&url, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"payload");

        let none = repo
            .resource(&format!("{}/repo/none.jar", server.url()))
            .unwrap();
        assert!(!none.exists);

        head.assert();
        get.assert();
        missing.assert();
    }

    #[test]
    fn test_list_via_http() {
        let mut server = mockito::Server::new();
        let index = server
            .mock("GET", "/repo/acme/lib/")
            .with_status(200)
            .with_body(r#"<a href="1.0/">1.0/</a> <a href="1.5/">1.5/</a>"#)
            .create();

        let repo = UrlRepository::new().unwrap();
        let names = repo
            .list(&format!("{}/repo/acme/lib", server.url()))
            .unwrap();
        assert_eq!(names, Some(vec!["1.0".to_string(), "1.5".to_string()]));
        index.assert();
    }
}
