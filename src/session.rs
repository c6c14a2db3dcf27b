//! Session identifier (RoleSessionName) resolution

/// Length limit applied to identifiers derived from platform metadata
pub const SESSION_IDENTIFIER_MAX_LEN: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionIdentifier(String);

impl SessionIdentifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// `{project_id}-{hostname}`, cut at [`SESSION_IDENTIFIER_MAX_LEN`] characters
    pub fn from_project_and_host(project_id: &str, hostname: &str) -> Self {
        let joined = format!("{project_id}-{hostname}");
        Self(truncate_chars(&joined, SESSION_IDENTIFIER_MAX_LEN).to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn os_hostname() -> std::io::Result<String> {
    hostname::get()?.into_string().map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "hostname is not valid unicode",
        )
    })
}

pub struct SessionIdentifierResolver<'a> {
    metadata: &'a dyn crate::metadata::MetadataSource,
    local_hostname: fn() -> std::io::Result<String>,
}

impl<'a> SessionIdentifierResolver<'a> {
    pub fn new(metadata: &'a dyn crate::metadata::MetadataSource) -> Self {
        Self {
            metadata,
            local_hostname: os_hostname,
        }
    }

    pub fn with_local_hostname(mut self, f: fn() -> std::io::Result<String>) -> Self {
        self.local_hostname = f;
        self
    }

    /// First non-empty of: `explicit`, `environment`, metadata-derived, local hostname.
    pub async fn resolve(
        &self,
        ctx: &crate::context::Context,
        explicit: Option<&str>,
        environment: Option<&str>,
    ) -> Result<SessionIdentifier, crate::error::Error> {
        ctx.check()?;

        if let Some(v) = explicit.filter(|v| !v.is_empty()) {
            return Ok(SessionIdentifier::new(v));
        }
        if let Some(v) = environment.filter(|v| !v.is_empty()) {
            return Ok(SessionIdentifier::new(v));
        }

        tracing::debug!("Attempting to create session identifier from GCP metadata");
        let metadata_err = match self.from_metadata(ctx).await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        // the caller giving up is not a reason to fall back
        if let Some(e) = metadata_err.context_error().or_else(|| ctx.err()) {
            return Err(e.into());
        }

        tracing::debug!(message = "Failed to create session identifier from GCP metadata, falling back to OS hostname", error = %metadata_err);
        match (self.local_hostname)() {
            Ok(hostname) if !hostname.is_empty() => {
                tracing::debug!(message = "Using local hostname as session identifier", hostname = %hostname);
                Ok(SessionIdentifier::new(hostname))
            }
            Ok(_) => Err(crate::error::Error::SessionIdentifierUnavailable {
                metadata: Box::new(metadata_err),
                hostname: std::io::Error::new(std::io::ErrorKind::NotFound, "hostname is empty"),
            }),
            Err(e) => Err(crate::error::Error::SessionIdentifierUnavailable {
                metadata: Box::new(metadata_err),
                hostname: e,
            }),
        }
    }

    async fn from_metadata(
        &self,
        ctx: &crate::context::Context,
    ) -> Result<SessionIdentifier, crate::error::Error> {
        use crate::error::ResultExt as _;

        let project_id = self
            .metadata
            .project_id(ctx)
            .await
            .stage("couldn't fetch ProjectID from GCP metadata server")?;
        let hostname = self
            .metadata
            .hostname(ctx)
            .await
            .stage("couldn't fetch Hostname from GCP metadata server")?;

        Ok(SessionIdentifier::from_project_and_host(
            &project_id,
            &hostname,
        ))
    }
}
