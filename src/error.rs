#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Unknown(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("role ARN cannot be empty")]
    EmptyRoleArn,

    #[error("invalid AWS role ARN format: {0} (expected format: arn:aws:iam::123456789012:role/RoleName)")]
    InvalidRoleArn(String),

    #[error("STS region cannot be empty")]
    EmptyRegion,

    #[error("invalid AWS region: {0} (see https://docs.aws.amazon.com/general/latest/gr/rande.html for valid regions)")]
    InvalidRegion(String),

    #[error(transparent)]
    Context(#[from] crate::context::ContextError),

    #[error("unsupported credential type: {0}")]
    UnsupportedCredentialType(String),

    #[error("Unsupported key pem label: {0}")]
    UnsupportedKeyError(String),

    #[error("no application default credentials found; set $GOOGLE_APPLICATION_CREDENTIALS or run `gcloud auth application-default login`")]
    CredentialsNotFound,

    #[error("couldn't determine session identifier: metadata: {metadata}; hostname: {hostname}")]
    SessionIdentifierUnavailable {
        metadata: Box<Error>,
        #[source]
        hostname: std::io::Error,
    },

    #[error("{stage}: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    StdIoError(#[from] std::io::Error),

    #[error(transparent)]
    PemError(#[from] pem_rfc7468::Error),

    #[error(transparent)]
    RsaError(#[from] rsa::errors::Error),

    #[error(transparent)]
    RsaPkcs8Error(#[from] rsa::pkcs8::Error),

    #[error(transparent)]
    Pkcs1Error(#[from] rsa::pkcs1::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    XmlError(#[from] quick_xml::de::DeError),

    #[error(transparent)]
    UrlError(#[from] url::ParseError),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error("API Error ({0}): {1}")]
    ApiError(reqwest::StatusCode, String),

    #[error("AWS STS returned {code} ({status}): {message}")]
    Federation {
        status: reqwest::StatusCode,
        code: crate::client::StsErrorCode,
        message: String,
    },
}

impl Error {
    /// Returns the cancellation or deadline error buried in this error, if any.
    pub fn context_error(&self) -> Option<crate::context::ContextError> {
        match self {
            Self::Context(e) => Some(*e),
            Self::Stage { source, .. } => source.context_error(),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyRoleArn | Self::InvalidRoleArn(_) | Self::EmptyRegion | Self::InvalidRegion(_)
        )
    }
}

pub(crate) trait ResultExt<T> {
    /// Wrap an error with the name of the stage that produced it
    fn stage(self, stage: &'static str) -> Result<T, Error>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<Error>,
{
    fn stage(self, stage: &'static str) -> Result<T, Error> {
        self.map_err(|e| Error::Stage {
            stage,
            source: Box::new(e.into()),
        })
    }
}
