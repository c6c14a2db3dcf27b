//! Google Compute Engine metadata server client
//!
//! https://cloud.google.com/compute/docs/metadata/querying-metadata

const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";
const METADATA_HOST_DEFAULT: &str = "metadata.google.internal";
const METADATA_IP: &str = "169.254.169.254";
const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";

const CLIENT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);
const PROBE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

#[cfg(target_os = "linux")]
const DMI_PRODUCT_NAME: &str = "/sys/class/dmi/id/product_name";

/// Source of platform metadata. [`MetadataClient`] talks to the real metadata server; tests may
/// substitute their own.
#[async_trait::async_trait]
pub trait MetadataSource: Send + Sync {
    /// Whether this process runs on Google Compute. Fails only when the context is done.
    async fn on_platform(&self, ctx: &crate::context::Context) -> Result<bool, crate::error::Error>;

    async fn project_id(&self, ctx: &crate::context::Context)
        -> Result<String, crate::error::Error>;

    async fn hostname(&self, ctx: &crate::context::Context) -> Result<String, crate::error::Error>;

    /// Signed identity token of the default service account, scoped to `audience`
    async fn identity_token(
        &self,
        ctx: &crate::context::Context,
        audience: &str,
    ) -> Result<String, crate::error::Error>;
}

pub struct MetadataClient {
    http_client: reqwest::Client,
    base_url: url::Url,
    host_overridden: bool,
}

impl MetadataClient {
    /// Client for the metadata server named by `$GCE_METADATA_HOST`, or the well-known host
    pub fn new() -> Result<Self, crate::error::Error> {
        match crate::config::env_nonempty(METADATA_HOST_ENV) {
            Some(host) => Self::with_host(&host),
            None => {
                let mut client = Self::with_host(METADATA_HOST_DEFAULT)?;
                client.host_overridden = false;
                Ok(client)
            }
        }
    }

    /// Client for a metadata server at `host` (`host[:port]`)
    pub fn with_host(host: &str) -> Result<Self, crate::error::Error> {
        let http_client = reqwest::ClientBuilder::new()
            .timeout(CLIENT_TIMEOUT)
            .build()?;
        let base_url = url::Url::parse(&format!("http://{host}/computeMetadata/v1/"))?;
        Ok(Self {
            http_client,
            base_url,
            host_overridden: true,
        })
    }

    async fn get(
        &self,
        ctx: &crate::context::Context,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<String, crate::error::Error> {
        let url = self.base_url.join(path)?;
        tracing::trace!(message = "metadata request", url = %url);

        ctx.run(async {
            let resp = self
                .http_client
                .get(url)
                .query(query)
                .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
                .send()
                .await?;

            let status = resp.status();
            let body = resp.text().await?;
            if status.is_success() {
                Ok(body.trim().to_owned())
            } else {
                Err(crate::error::Error::ApiError(status, body))
            }
        })
        .await
    }

    async fn probe(&self, timeout: std::time::Duration) -> bool {
        let resp = self
            .http_client
            .get(format!("http://{METADATA_IP}"))
            .timeout(timeout)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .send()
            .await;
        match resp {
            Ok(r) => r
                .headers()
                .get(METADATA_FLAVOR_HEADER)
                .map(|v| v == METADATA_FLAVOR)
                .unwrap_or(false),
            Err(e) => {
                tracing::trace!(message = "metadata server probe failed", error = ?e);
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl MetadataSource for MetadataClient {
    async fn on_platform(&self, ctx: &crate::context::Context) -> Result<bool, crate::error::Error> {
        ctx.check()?;
        if self.host_overridden {
            return Ok(true);
        }
        // give a slow metadata server more time when DMI already says we're on Google hardware
        let timeout = if system_info_suggests_gce() {
            CLIENT_TIMEOUT
        } else {
            PROBE_TIMEOUT
        };
        ctx.run(async { Ok(self.probe(timeout).await) }).await
    }

    async fn project_id(
        &self,
        ctx: &crate::context::Context,
    ) -> Result<String, crate::error::Error> {
        self.get(ctx, "project/project-id", &[]).await
    }

    async fn hostname(&self, ctx: &crate::context::Context) -> Result<String, crate::error::Error> {
        self.get(ctx, "instance/hostname", &[]).await
    }

    async fn identity_token(
        &self,
        ctx: &crate::context::Context,
        audience: &str,
    ) -> Result<String, crate::error::Error> {
        self.get(
            ctx,
            "instance/service-accounts/default/identity",
            &[("audience", audience), ("format", "full")],
        )
        .await
    }
}

#[cfg(target_os = "linux")]
fn system_info_suggests_gce() -> bool {
    std::fs::read_to_string(DMI_PRODUCT_NAME)
        .map(|name| name.trim().contains("Google"))
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn system_info_suggests_gce() -> bool {
    false
}
