//! Application default credentials: locate and parse the local Google credentials file

const ENV_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
const ENV_CLOUDSDK_CONFIG: &str = "CLOUDSDK_CONFIG";
const WELL_KNOWN_FILE: &str = "application_default_credentials.json";

const TYPE_AUTHORIZED_USER: &str = "authorized_user";
const TYPE_SERVICE_ACCOUNT: &str = "service_account";

/// On-disk representation. Every field but `type` is optional here; [`CredentialsFile`] decides
/// which ones are required for each type.
#[derive(serde::Deserialize, zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
struct RawCredentialsFile {
    #[serde(rename = "type", default)]
    #[zeroize(skip)]
    kind: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    #[zeroize(skip)]
    project_id: Option<String>,
    #[zeroize(skip)]
    private_key_id: Option<String>,
    private_key: Option<String>,
    #[zeroize(skip)]
    client_email: Option<String>,
}

pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: secrecy::SecretString,
    pub refresh_token: secrecy::SecretString,
}

pub struct ServiceAccount {
    pub client_email: String,
    pub private_key_id: Option<String>,
    pub private_key: secrecy::SecretString,
    pub project_id: Option<String>,
}

pub enum CredentialsFile {
    AuthorizedUser(AuthorizedUser),
    ServiceAccount(ServiceAccount),
    Unsupported(String),
}

impl std::fmt::Debug for CredentialsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthorizedUser(u) => f
                .debug_struct("AuthorizedUser")
                .field("client_id", &u.client_id)
                .finish_non_exhaustive(),
            Self::ServiceAccount(s) => f
                .debug_struct("ServiceAccount")
                .field("client_email", &s.client_email)
                .field("private_key_id", &s.private_key_id)
                .field("project_id", &s.project_id)
                .finish_non_exhaustive(),
            Self::Unsupported(t) => f.debug_tuple("Unsupported").field(t).finish(),
        }
    }
}

fn required(
    kind: &str,
    name: &str,
    value: &mut Option<String>,
) -> Result<String, crate::error::Error> {
    value.take().filter(|v| !v.is_empty()).ok_or_else(|| {
        crate::error::Error::ConfigError(format!("{kind} credentials is missing `{name}`"))
    })
}

impl CredentialsFile {
    pub fn from_json(input: &[u8]) -> Result<Self, crate::error::Error> {
        let mut raw: RawCredentialsFile = serde_json::from_slice(input)?;

        let creds = match raw.kind.as_str() {
            TYPE_AUTHORIZED_USER => Self::AuthorizedUser(AuthorizedUser {
                client_id: required(TYPE_AUTHORIZED_USER, "client_id", &mut raw.client_id)?,
                client_secret: secrecy::SecretString::new(required(
                    TYPE_AUTHORIZED_USER,
                    "client_secret",
                    &mut raw.client_secret,
                )?),
                refresh_token: secrecy::SecretString::new(required(
                    TYPE_AUTHORIZED_USER,
                    "refresh_token",
                    &mut raw.refresh_token,
                )?),
            }),
            TYPE_SERVICE_ACCOUNT => Self::ServiceAccount(ServiceAccount {
                client_email: required(TYPE_SERVICE_ACCOUNT, "client_email", &mut raw.client_email)?,
                private_key: secrecy::SecretString::new(required(
                    TYPE_SERVICE_ACCOUNT,
                    "private_key",
                    &mut raw.private_key,
                )?),
                private_key_id: raw.private_key_id.take(),
                project_id: raw.project_id.take(),
            }),
            other => Self::Unsupported(other.to_owned()),
        };
        Ok(creds)
    }

    pub async fn from_file(path: &std::path::Path) -> Result<Self, crate::error::Error> {
        tracing::trace!(message = "loading credentials file", path = ?path);
        let mut content = match tokio::fs::read(path).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(message = "failed to read credentials file", path = ?path, error = ?e);
                return Err(e.into());
            }
        };
        let creds = Self::from_json(&content);
        zeroize::Zeroize::zeroize(&mut content);
        creds
    }

    /// Find and load application default credentials.
    ///
    /// `$GOOGLE_APPLICATION_CREDENTIALS` takes precedence; otherwise the gcloud well-known file is
    /// used if it exists.
    pub async fn find_default() -> Result<Self, crate::error::Error> {
        if let Some(path) = crate::config::env_nonempty(ENV_APPLICATION_CREDENTIALS) {
            tracing::debug!(message = "using credentials from environment", variable = ENV_APPLICATION_CREDENTIALS, path = %path);
            return Self::from_file(std::path::Path::new(&path)).await;
        }

        let path = well_known_file().ok_or(crate::error::Error::CredentialsNotFound)?;
        match tokio::fs::metadata(&path).await {
            Ok(_) => {
                tracing::debug!(message = "using gcloud application default credentials", path = ?path);
                Self::from_file(&path).await
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(crate::error::Error::CredentialsNotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::AuthorizedUser(_) => TYPE_AUTHORIZED_USER,
            Self::ServiceAccount(_) => TYPE_SERVICE_ACCOUNT,
            Self::Unsupported(t) => t,
        }
    }
}

fn well_known_file() -> Option<std::path::PathBuf> {
    if let Some(dir) = crate::config::env_nonempty(ENV_CLOUDSDK_CONFIG) {
        return Some(std::path::PathBuf::from(dir).join(WELL_KNOWN_FILE));
    }
    gcloud_config_dir().map(|d| d.join(WELL_KNOWN_FILE))
}

#[cfg(windows)]
fn gcloud_config_dir() -> Option<std::path::PathBuf> {
    crate::config::env_nonempty("APPDATA").map(|d| std::path::PathBuf::from(d).join("gcloud"))
}

#[cfg(not(windows))]
fn gcloud_config_dir() -> Option<std::path::PathBuf> {
    crate::config::env_nonempty("HOME")
        .map(|d| std::path::PathBuf::from(d).join(".config").join("gcloud"))
}
