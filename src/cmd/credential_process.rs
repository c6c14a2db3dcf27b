#[derive(clap::Args)]
pub struct CredentialProcessArgs {
    /// IAM Role ARN to assume
    #[clap(long)]
    role_arn: String,
    /// AWS Region of the STS endpoint to call
    #[clap(long, default_value = crate::validation::DEFAULT_REGION)]
    sts_region: String,
    /// RoleSessionName to use; optional
    ///
    /// Falls back to $AWS_SESSION_IDENTIFIER, then `{project_id}-{hostname}` from the GCE metadata
    /// server (up to 32 characters), then the local hostname.
    #[clap(long)]
    session_id: Option<String>,
    /// Session duration in seconds (900 to 43200); STS applies the role's default when omitted
    #[clap(long, value_parser = clap::value_parser!(u32).range(900..=43200))]
    duration_seconds: Option<u32>,
    /// Log the raw Google identity token; only effective with --log-level=debug
    #[clap(long, action = clap::ArgAction::SetTrue)]
    print_id_token: bool,
    /// Log verbosity; logs go to stderr. RUST_LOG takes precedence when set.
    #[clap(long, value_enum, ignore_case = true, default_value = "error")]
    log_level: crate::config::LogLevel,
}

impl CredentialProcessArgs {
    pub fn log_level(&self) -> crate::config::LogLevel {
        self.log_level
    }
}

/// Inputs of a single credential exchange
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub role_arn: &'a crate::validation::RoleArn,
    pub session_id: Option<&'a str>,
    pub session_id_env: Option<&'a str>,
    pub duration_seconds: Option<u32>,
}

/// Resolve a session identifier, then trade an identity token from `token_source` for AWS
/// credentials.
pub async fn obtain_credential(
    ctx: &crate::context::Context,
    client: &crate::client::Client,
    resolver: &crate::session::SessionIdentifierResolver<'_>,
    token_source: &dyn crate::identity::WebIdentityTokenSource,
    request: &Request<'_>,
) -> Result<crate::client::TemporaryCredential, crate::error::Error> {
    use crate::error::ResultExt as _;

    let session_name = resolver
        .resolve(ctx, request.session_id, request.session_id_env)
        .await
        .stage("failed to get session identifier")?;
    tracing::debug!(message = "Resolved session identifier", session_name = %session_name);

    crate::client::exchange_with(
        ctx,
        client,
        request.role_arn,
        &session_name,
        request.duration_seconds,
        token_source,
    )
    .await
}

/// Write `credential` as one line of credential_process JSON
pub fn write_credential(
    mut writer: impl std::io::Write,
    credential: &crate::client::TemporaryCredential,
) -> Result<(), crate::error::Error> {
    serde_json::to_writer(&mut writer, credential)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[tokio::main]
pub async fn run(args: &CredentialProcessArgs) -> Result<(), anyhow::Error> {
    let config = crate::config::Config::new(args.print_id_token, args.log_level);

    let (client, role_arn) = crate::client::validated_client(&args.sts_region, &args.role_arn)?;

    let ctx = crate::context::Context::background();
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling");
                ctx.cancel();
            }
        });
    }

    let metadata = crate::metadata::MetadataClient::new()?;
    let resolver = crate::session::SessionIdentifierResolver::new(&metadata);
    let provider = crate::identity::IdentityTokenProvider::new(config, &metadata)?;

    let session_id_env = crate::config::env_nonempty(crate::config::ENV_SESSION_ID);
    let request = Request {
        role_arn: &role_arn,
        session_id: args.session_id.as_deref(),
        session_id_env: session_id_env.as_deref(),
        duration_seconds: args.duration_seconds,
    };

    let credential = obtain_credential(&ctx, &client, &resolver, &provider, &request).await?;
    write_credential(std::io::stdout().lock(), &credential)?;
    Ok(())
}
