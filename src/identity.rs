//! Google identity token acquisition
//!
//! Tries, in order: the metadata server when running on Google Compute, then application default
//! credentials (refresh token exchange for user credentials, a self-signed assertion for service
//! account keys).

/// Audience requested from the metadata server and put into self-signed assertions
pub const DEFAULT_AUDIENCE: &str = "gcp";
/// gcloud's OAuth client id; the audience Google issues ID tokens for on refresh token exchange
pub const GOOGLE_CLOUD_SDK_AUDIENCE: &str = "32555940559.apps.googleusercontent.com";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// A signed identity token (JWT). Never persisted; only printed via [`crate::config::Config::should_print_id_token`].
pub struct IdentityAssertion(secrecy::SecretString);

impl IdentityAssertion {
    pub fn new(token: String) -> Self {
        Self(secrecy::SecretString::new(token))
    }

    pub fn expose(&self) -> &str {
        use secrecy::ExposeSecret;
        self.0.expose_secret()
    }

    /// `exp` claim of the token, if it is a JWT carrying one
    pub fn expires_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        use base64ct::Encoding as _;

        #[derive(serde::Deserialize)]
        struct Exp {
            exp: Option<i64>,
        }

        let payload = self.expose().split('.').nth(1)?;
        let json = base64ct::Base64UrlUnpadded::decode_vec(payload.trim_end_matches('=')).ok()?;
        let exp = serde_json::from_slice::<Exp>(&json).ok()?.exp?;
        chrono::DateTime::from_timestamp(exp, 0)
    }
}

impl std::fmt::Debug for IdentityAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityAssertion")
            .field("expires_at", &self.expires_at())
            .finish_non_exhaustive()
    }
}

/// Produces one identity assertion on demand.
///
/// The federation client calls this at request time instead of taking a pre-fetched token.
#[async_trait::async_trait]
pub trait WebIdentityTokenSource: Send + Sync {
    async fn web_identity_token(
        &self,
        ctx: &crate::context::Context,
    ) -> Result<IdentityAssertion, crate::error::Error>;
}

#[derive(Debug, serde::Deserialize)]
struct TokenEndpointResponse {
    id_token: String,
}

pub struct IdentityTokenProvider<'a> {
    config: crate::config::Config,
    metadata: &'a dyn crate::metadata::MetadataSource,
    http_client: reqwest::Client,
    token_url: url::Url,
    audience_override: Option<String>,
    credentials_path: Option<std::path::PathBuf>,
}

impl<'a> IdentityTokenProvider<'a> {
    pub fn new(
        config: crate::config::Config,
        metadata: &'a dyn crate::metadata::MetadataSource,
    ) -> Result<Self, crate::error::Error> {
        Ok(Self {
            config,
            metadata,
            http_client: reqwest::Client::new(),
            token_url: url::Url::parse(GOOGLE_TOKEN_URL)?,
            audience_override: crate::config::env_nonempty(
                crate::config::ENV_IDENTITY_TOKEN_AUDIENCE,
            ),
            credentials_path: None,
        })
    }

    pub fn with_audience_override(mut self, audience: Option<String>) -> Self {
        self.audience_override = audience.filter(|v| !v.is_empty());
        self
    }

    pub fn with_token_url(mut self, url: url::Url) -> Self {
        self.token_url = url;
        self
    }

    /// Load credentials from `path` instead of searching for application default credentials
    pub fn with_credentials_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    fn audience<'s>(&'s self, default: &'s str) -> &'s str {
        self.audience_override.as_deref().unwrap_or(default)
    }

    pub async fn get_token(
        &self,
        ctx: &crate::context::Context,
    ) -> Result<IdentityAssertion, crate::error::Error> {
        let token = self.acquire(ctx).await?;
        tracing::debug!(message = "Obtained Google identity token", expires_at = ?token.expires_at());
        if self.config.should_print_id_token() {
            tracing::debug!(message = "Google identity token", id_token = %token.expose());
        }
        Ok(token)
    }

    async fn acquire(
        &self,
        ctx: &crate::context::Context,
    ) -> Result<IdentityAssertion, crate::error::Error> {
        use crate::error::ResultExt as _;
        ctx.check()?;

        if self.metadata.on_platform(ctx).await? {
            match self
                .metadata
                .identity_token(ctx, self.audience(DEFAULT_AUDIENCE))
                .await
            {
                Ok(token) => return Ok(IdentityAssertion::new(token)),
                Err(e) => {
                    if let Some(ce) = e.context_error() {
                        return Err(ce.into());
                    }
                    tracing::debug!(message = "Failed to get GCE instance token", error = %e);
                }
            }
        } else {
            tracing::debug!("Not running on Google Compute, using local credentials");
        }

        self.from_local_credentials(ctx)
            .await
            .stage("failed to get identity token")
    }

    async fn from_local_credentials(
        &self,
        ctx: &crate::context::Context,
    ) -> Result<IdentityAssertion, crate::error::Error> {
        use crate::error::ResultExt as _;

        let creds = match self.credentials_path {
            Some(ref path) => crate::credentials::CredentialsFile::from_file(path).await,
            None => crate::credentials::CredentialsFile::find_default().await,
        }
        .stage("failed to get default credentials")?;
        tracing::debug!(message = "Loaded local credentials", credentials = ?creds);

        match creds {
            crate::credentials::CredentialsFile::AuthorizedUser(user) => {
                self.exchange_refresh_token(ctx, &user).await
            }
            crate::credentials::CredentialsFile::ServiceAccount(sa) => self.self_signed(&sa),
            crate::credentials::CredentialsFile::Unsupported(kind) => {
                Err(crate::error::Error::UnsupportedCredentialType(kind))
            }
        }
    }

    async fn exchange_refresh_token(
        &self,
        ctx: &crate::context::Context,
        user: &crate::credentials::AuthorizedUser,
    ) -> Result<IdentityAssertion, crate::error::Error> {
        use secrecy::ExposeSecret;

        let audience = self.audience(GOOGLE_CLOUD_SDK_AUDIENCE);
        tracing::debug!(message = "Exchanging refresh token for identity token", client_id = %user.client_id, audience = %audience);

        let form = [
            ("client_id", user.client_id.as_str()),
            ("client_secret", user.client_secret.expose_secret().as_str()),
            ("refresh_token", user.refresh_token.expose_secret().as_str()),
            ("grant_type", "refresh_token"),
            ("audience", audience),
        ];

        ctx.run(async {
            let resp = self
                .http_client
                .post(self.token_url.clone())
                .form(&form)
                .send()
                .await?;

            let status = resp.status();
            let body = resp.text().await?;
            if status != reqwest::StatusCode::OK {
                return Err(crate::error::Error::ApiError(status, body));
            }

            let parsed: TokenEndpointResponse = serde_json::from_str(&body).map_err(|e| {
                crate::error::Error::Unknown(format!(
                    "failed to parse token response: {e}: {body}"
                ))
            })?;
            if parsed.id_token.is_empty() {
                return Err(crate::error::Error::Unknown(format!(
                    "token response has no id_token: {body}"
                )));
            }
            Ok(IdentityAssertion::new(parsed.id_token))
        })
        .await
    }

    fn self_signed(
        &self,
        sa: &crate::credentials::ServiceAccount,
    ) -> Result<IdentityAssertion, crate::error::Error> {
        use crate::error::ResultExt as _;
        use secrecy::ExposeSecret;

        let key = crate::sign::SigningKey::from_private_key_pem(sa.private_key.expose_secret())
            .stage("failed to parse private key")?;
        let claims = crate::sign::Claims::for_service_account(
            &sa.client_email,
            self.audience(DEFAULT_AUDIENCE),
            chrono::Utc::now(),
        );
        tracing::debug!(message = "Signing identity assertion with service account key", client_email = %sa.client_email, private_key_id = ?sa.private_key_id);

        let token = crate::sign::sign_jwt(&key, sa.private_key_id.as_deref(), &claims)
            .stage("failed to sign token")?;
        Ok(IdentityAssertion::new(token))
    }
}

#[async_trait::async_trait]
impl<'a> WebIdentityTokenSource for IdentityTokenProvider<'a> {
    async fn web_identity_token(
        &self,
        ctx: &crate::context::Context,
    ) -> Result<IdentityAssertion, crate::error::Error> {
        self.get_token(ctx).await
    }
}
