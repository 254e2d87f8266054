use crate::error::{AppResult, CatalogError, UserError};
use crate::toolchain::{Toolchain, version_key};
use anyhow::Context;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Builds the HTTP client shared by the catalog and the downloader.
pub fn build_client() -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("govm/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build reqwest client")
}

/// The provider's listing of published release archives.
pub struct Catalog {
    client: reqwest::Client,
    toolchain: Arc<dyn Toolchain>,
    base_url: String,
    platform: String,
}

impl Catalog {
    /// `base_url` serves both the listing page and the archives beneath it.
    pub fn new(
        client: reqwest::Client,
        toolchain: Arc<dyn Toolchain>,
        base_url: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client,
            toolchain,
            base_url,
            platform: platform.into(),
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn toolchain(&self) -> Arc<dyn Toolchain> {
        Arc::clone(&self.toolchain)
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn archive_file_name(&self, version: &str) -> String {
        self.toolchain.archive_file_name(version, &self.platform)
    }

    pub fn archive_url(&self, version: &str) -> String {
        format!("{}{}", self.base_url, self.archive_file_name(version))
    }

    #[tracing::instrument(skip(self), fields(url = %self.base_url))]
    pub async fn fetch_listing(&self) -> Result<String, CatalogError> {
        let network = |source: reqwest::Error| CatalogError::Network {
            url: self.base_url.clone(),
            source,
        };
        tracing::debug!("Fetching release listing");
        let body = self
            .client
            .get(&self.base_url)
            .send()
            .await
            .map_err(network)?
            .error_for_status()
            .map_err(network)?
            .text()
            .await
            .map_err(network)?;
        tracing::trace!(bytes = body.len(), "Fetched release listing");
        Ok(body)
    }

    /// The newest version with an archive for our platform.
    pub async fn latest(&self) -> Result<String, CatalogError> {
        let listing = self.fetch_listing().await?;
        self.latest_in(&listing)
    }

    /// Whether an archive for `version` on our platform is listed.
    pub async fn exists(&self, version: &str) -> Result<bool, CatalogError> {
        let listing = self.fetch_listing().await?;
        Ok(listing_contains(&listing, &self.archive_file_name(version)))
    }

    /// Fails with `VersionNotAvailable` unless `version` is listed.
    pub async fn ensure_available(&self, version: &str) -> AppResult<()> {
        if self.exists(version).await? {
            return Ok(());
        }
        let latest = self.latest().await?;
        Err(UserError::VersionNotAvailable {
            version: version.to_string(),
            latest,
        }
        .into())
    }

    /// `None` means the latest version; an explicit version must be listed.
    pub async fn resolve(&self, requested: Option<&str>) -> AppResult<String> {
        match requested {
            None => Ok(self.latest().await?),
            Some(version) => {
                self.ensure_available(version).await?;
                Ok(version.to_string())
            }
        }
    }

    fn latest_in(&self, listing: &str) -> Result<String, CatalogError> {
        let pattern = self.toolchain.archive_file_pattern(&self.platform);
        let version = find_latest_version(listing, &pattern).ok_or_else(|| {
            CatalogError::NoVersionFound {
                platform: self.platform.clone(),
            }
        })?;
        tracing::info!(%version, "Latest version found");
        Ok(version)
    }
}

/// Scans `listing` for archive names matching `pattern` and returns the highest version.
pub fn find_latest_version(listing: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    re.captures_iter(listing)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .max_by_key(|version| version_key(version))
}

pub fn listing_contains(listing: &str, file_name: &str) -> bool {
    listing.contains(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::listing_html;
    use crate::toolchain::go::Go;

    fn catalog_for(uri: &str) -> Catalog {
        Catalog::new(
            reqwest::Client::new(),
            Arc::new(Go),
            format!("{uri}/dl/"),
            "linux-amd64",
        )
    }

    #[test]
    fn test_find_latest_version_picks_highest() {
        let html = listing_html(&["1.22.0", "1.21.13", "1.9.7"]);
        let pattern = Go.archive_file_pattern("linux-amd64");
        assert_eq!(find_latest_version(&html, &pattern).as_deref(), Some("1.22.0"));

        let reordered = listing_html(&["1.9.7", "1.10.0"]);
        assert_eq!(find_latest_version(&reordered, &pattern).as_deref(), Some("1.10.0"));
    }

    #[test]
    fn test_find_latest_version_ignores_other_platforms() {
        let html = "go1.23.0.darwin-arm64.tar.gz go1.22.0.linux-amd64.tar.gz go1.23.0.windows-amd64.zip";
        let pattern = Go.archive_file_pattern("linux-amd64");
        assert_eq!(find_latest_version(html, &pattern).as_deref(), Some("1.22.0"));
        assert_eq!(find_latest_version("<html></html>", &pattern), None);
    }

    #[test]
    fn test_archive_url_joins_base_and_file_name() {
        let catalog = Catalog::new(reqwest::Client::new(), Arc::new(Go), "https://go.dev/dl", "linux-amd64");
        assert_eq!(
            catalog.archive_url("1.22.0"),
            "https://go.dev/dl/go1.22.0.linux-amd64.tar.gz"
        );
    }

    #[tokio::test]
    async fn test_latest_and_exists_against_listing() -> AppResult<()> {
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/dl/"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(listing_html(&["1.22.0", "1.21.5", "1.20.0"])),
            )
            .mount(&mock_server)
            .await;

        let catalog = catalog_for(&mock_server.uri());

        assert_eq!(catalog.latest().await?, "1.22.0");
        assert!(catalog.exists("1.20.0").await?);
        assert!(!catalog.exists("1.19.0").await?);
        catalog.ensure_available("1.21.5").await?;
        assert_eq!(catalog.resolve(None).await?, "1.22.0");
        assert_eq!(catalog.resolve(Some("1.20.0")).await?, "1.20.0");

        let err = catalog.resolve(Some("1.19.0")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UserError>(),
            Some(UserError::VersionNotAvailable { latest, .. }) if latest == "1.22.0"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_without_archives_has_no_version() -> AppResult<()> {
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/dl/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&mock_server)
            .await;

        let err = catalog_for(&mock_server.uri()).latest().await.unwrap_err();
        assert!(matches!(err, CatalogError::NoVersionFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error_is_a_network_error() -> AppResult<()> {
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let err = catalog_for(&mock_server.uri()).latest().await.unwrap_err();
        assert!(matches!(err, CatalogError::Network { .. }));
        Ok(())
    }
}
