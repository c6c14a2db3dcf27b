//! sts:AssumeRoleWithWebIdentity API client

const STS_API_VERSION: &str = "2011-06-15";
const ACTION_ASSUME_ROLE_WITH_WEB_IDENTITY: &str = "AssumeRoleWithWebIdentity";

/// Schema version of the credential_process output
pub const CREDENTIAL_VERSION: i64 = 1;

/// https://docs.aws.amazon.com/STS/latest/APIReference/API_AssumeRoleWithWebIdentity.html
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssumeRoleWithWebIdentityResponse {
    pub assume_role_with_web_identity_result: AssumeRoleWithWebIdentityResult,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssumeRoleWithWebIdentityResult {
    pub assumed_role_user: Option<AssumedRoleUser>,
    pub credentials: Credentials,
    pub subject_from_web_identity_token: Option<String>,
    pub audience: Option<String>,
    pub provider: Option<String>,
    pub source_identity: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssumedRoleUser {
    pub arn: String,
    pub assumed_role_id: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: SensitiveString,
    pub session_token: SensitiveString,
    pub expiration: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorResponse {
    error: ErrorDetail,
    request_id: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorDetail {
    code: String,
    #[serde(default)]
    message: String,
}

/// STS error codes callers are likely to act on; anything else is kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StsErrorCode {
    MalformedPolicyDocument,
    PackedPolicyTooLarge,
    IdpRejectedClaim,
    IdpCommunicationError,
    InvalidIdentityToken,
    ExpiredToken,
    RegionDisabled,
    Other(String),
}

impl StsErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::MalformedPolicyDocument => "MalformedPolicyDocument",
            Self::PackedPolicyTooLarge => "PackedPolicyTooLarge",
            Self::IdpRejectedClaim => "IDPRejectedClaim",
            Self::IdpCommunicationError => "IDPCommunicationError",
            Self::InvalidIdentityToken => "InvalidIdentityToken",
            Self::ExpiredToken => "ExpiredTokenException",
            Self::RegionDisabled => "RegionDisabledException",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for StsErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "MalformedPolicyDocument" | "MalformedPolicyDocumentException" => {
                Self::MalformedPolicyDocument
            }
            "PackedPolicyTooLarge" | "PackedPolicyTooLargeException" => Self::PackedPolicyTooLarge,
            "IDPRejectedClaim" | "IDPRejectedClaimException" => Self::IdpRejectedClaim,
            "IDPCommunicationError" | "IDPCommunicationErrorException" => {
                Self::IdpCommunicationError
            }
            "InvalidIdentityToken" | "InvalidIdentityTokenException" => Self::InvalidIdentityToken,
            "ExpiredTokenException" | "ExpiredToken" => Self::ExpiredToken,
            "RegionDisabledException" | "RegionDisabled" => Self::RegionDisabled,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl std::fmt::Display for StsErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string that must not show up in logs. Serializes as its plain value.
pub struct SensitiveString(secrecy::SecretString);

impl SensitiveString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(secrecy::SecretString::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        use secrecy::ExposeSecret;
        self.0.expose_secret()
    }
}

impl Clone for SensitiveString {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SensitiveString {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for SensitiveString {}

impl serde::Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> serde::Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <String as serde::Deserialize>::deserialize(deserializer).map(Self::new)
    }
}

/// Temporary credentials in the shape `credential_process` consumers expect
///
/// https://docs.aws.amazon.com/sdkref/latest/guide/feature-process-credentials.html
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemporaryCredential {
    pub version: i64,
    pub access_key_id: String,
    pub secret_access_key: SensitiveString,
    pub session_token: SensitiveString,
    pub expiration: chrono::DateTime<chrono::Utc>,
}

impl From<Credentials> for TemporaryCredential {
    fn from(c: Credentials) -> Self {
        Self {
            version: CREDENTIAL_VERSION,
            access_key_id: c.access_key_id,
            secret_access_key: c.secret_access_key,
            session_token: c.session_token,
            expiration: c.expiration,
        }
    }
}

pub struct Client {
    http_client: reqwest::Client,
    endpoint: url::Url,
    region: crate::validation::Region,
}

fn regional_endpoint(region: &crate::validation::Region) -> String {
    if region.is_china() {
        format!("https://sts.{region}.amazonaws.com.cn/")
    } else {
        format!("https://sts.{region}.amazonaws.com/")
    }
}

impl Client {
    pub fn new(region: crate::validation::Region) -> Result<Self, crate::error::Error> {
        let endpoint = url::Url::parse(&regional_endpoint(&region))?;
        Self::with_endpoint(region, endpoint)
    }

    /// Client sending requests to `endpoint` instead of the regional STS endpoint
    pub fn with_endpoint(
        region: crate::validation::Region,
        endpoint: url::Url,
    ) -> Result<Self, crate::error::Error> {
        let http_client = reqwest::ClientBuilder::new().build()?;
        Ok(Self {
            http_client,
            endpoint,
            region,
        })
    }

    pub fn region(&self) -> &crate::validation::Region {
        &self.region
    }

    /// Call AssumeRoleWithWebIdentity once. The token is requested from `token_source` just
    /// before the request is sent.
    pub async fn assume_role_with_web_identity(
        &self,
        ctx: &crate::context::Context,
        role_arn: &crate::validation::RoleArn,
        session_name: &crate::session::SessionIdentifier,
        duration_seconds: Option<u32>,
        token_source: &dyn crate::identity::WebIdentityTokenSource,
    ) -> Result<AssumeRoleWithWebIdentityResult, crate::error::Error> {
        use crate::error::ResultExt as _;

        ctx.check()?;
        let token = token_source
            .web_identity_token(ctx)
            .await
            .stage("couldn't retrieve identity token")?;

        let duration = duration_seconds.map(|v| v.to_string());
        let mut form = vec![
            ("Action", ACTION_ASSUME_ROLE_WITH_WEB_IDENTITY),
            ("Version", STS_API_VERSION),
            ("RoleArn", role_arn.as_str()),
            ("RoleSessionName", session_name.as_str()),
            ("WebIdentityToken", token.expose()),
        ];
        if let Some(ref d) = duration {
            form.push(("DurationSeconds", d.as_str()));
        }

        tracing::debug!(message = "Calling AssumeRoleWithWebIdentity", endpoint = %self.endpoint, role_arn = %role_arn, session_name = %session_name, duration_seconds = ?duration_seconds);

        ctx.run(async {
            let resp = self
                .http_client
                .post(self.endpoint.clone())
                .form(&form)
                .send()
                .await?;

            let status = resp.status();
            let body = resp.text().await?;
            if status.is_success() {
                let parsed: AssumeRoleWithWebIdentityResponse = quick_xml::de::from_str(&body)?;
                Ok(parsed.assume_role_with_web_identity_result)
            } else {
                Err(parse_error_response(status, body))
            }
        })
        .await
    }
}

fn parse_error_response(status: reqwest::StatusCode, body: String) -> crate::error::Error {
    match quick_xml::de::from_str::<ErrorResponse>(&body) {
        Ok(e) => {
            tracing::trace!(message = "STS error response", request_id = ?e.request_id);
            crate::error::Error::Federation {
                status,
                code: StsErrorCode::from(e.error.code.as_str()),
                message: e.error.message,
            }
        }
        Err(_) => crate::error::Error::ApiError(status, body),
    }
}

/// Validate inputs, then trade an identity token for temporary credentials.
///
/// Role ARN and region are checked before anything touches the network.
pub async fn exchange(
    ctx: &crate::context::Context,
    region: &str,
    role_arn: &str,
    session_name: &crate::session::SessionIdentifier,
    token_source: &dyn crate::identity::WebIdentityTokenSource,
) -> Result<TemporaryCredential, crate::error::Error> {
    let (client, role_arn) = validated_client(region, role_arn)?;
    exchange_with(ctx, &client, &role_arn, session_name, None, token_source).await
}

/// Validate `region` and `role_arn` and build the regional client. No network I/O happens here.
pub fn validated_client(
    region: &str,
    role_arn: &str,
) -> Result<(Client, crate::validation::RoleArn), crate::error::Error> {
    let role_arn = crate::validation::RoleArn::parse(role_arn)?;
    let region = crate::validation::Region::parse(region)?;
    Ok((Client::new(region)?, role_arn))
}

pub async fn exchange_with(
    ctx: &crate::context::Context,
    client: &Client,
    role_arn: &crate::validation::RoleArn,
    session_name: &crate::session::SessionIdentifier,
    duration_seconds: Option<u32>,
    token_source: &dyn crate::identity::WebIdentityTokenSource,
) -> Result<TemporaryCredential, crate::error::Error> {
    use crate::error::ResultExt as _;

    let result = client
        .assume_role_with_web_identity(ctx, role_arn, session_name, duration_seconds, token_source)
        .await
        .stage("failed to retrieve AWS credentials")?;

    tracing::info!(message = "Obtained AWS credentials", access_key_id = %result.credentials.access_key_id, expiration = %result.credentials.expiration, assumed_role_user_arn = ?result.assumed_role_user.as_ref().map(|u| &u.arn), region = %client.region());

    Ok(result.credentials.into())
}
