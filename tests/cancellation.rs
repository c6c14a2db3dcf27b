mod common;

use std::sync::Arc;
use std::time::Duration;

fn slow_metadata() -> common::MetadataServer {
    common::MetadataServer {
        delay: Some(Duration::from_secs(2)),
        ..common::MetadataServer::janus_go()
    }
}

#[tokio::test]
async fn test_resolver_deadline_does_not_fall_back() {
    let addr = Arc::new(slow_metadata()).start().await;
    let metadata = janus::metadata::MetadataClient::with_host(&addr.to_string()).unwrap();
    let resolver = janus::session::SessionIdentifierResolver::new(&metadata)
        .with_local_hostname(|| Ok("local".to_owned()));

    let ctx = janus::context::Context::background().with_timeout(Duration::from_millis(100));
    let e = resolver.resolve(&ctx, None, None).await.unwrap_err();
    assert_eq!(
        e.context_error(),
        Some(janus::context::ContextError::DeadlineExceeded)
    );
}

#[tokio::test]
async fn test_resolver_cancel_does_not_fall_back() {
    let addr = Arc::new(slow_metadata()).start().await;
    let metadata = janus::metadata::MetadataClient::with_host(&addr.to_string()).unwrap();
    let resolver = janus::session::SessionIdentifierResolver::new(&metadata)
        .with_local_hostname(|| Ok("local".to_owned()));

    let ctx = janus::context::Context::background();
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            ctx.cancel();
        });
    }
    let e = resolver.resolve(&ctx, None, None).await.unwrap_err();
    assert_eq!(e.context_error(), Some(janus::context::ContextError::Cancelled));
}

#[tokio::test]
async fn test_provider_deadline_is_not_swallowed() {
    let addr = Arc::new(slow_metadata()).start().await;
    let metadata = janus::metadata::MetadataClient::with_host(&addr.to_string()).unwrap();

    // would be used if the metadata failure were treated as an ordinary miss
    let dir = temp_dir::TempDir::with_prefix("janus-it").unwrap();
    let path = dir.child("credentials.json");
    tokio::fs::write(
        &path,
        serde_json::to_vec(&serde_json::json!({
            "type": "service_account",
            "client_email": "sa@janus-go.iam.gserviceaccount.com",
            "private_key": include_str!("fixtures/service-account-key.pem"),
        }))
        .unwrap(),
    )
    .await
    .unwrap();

    let provider =
        janus::identity::IdentityTokenProvider::new(janus::config::Config::default(), &metadata)
            .unwrap()
            .with_credentials_file(&path);

    let ctx = janus::context::Context::background().with_timeout(Duration::from_millis(100));
    let e = provider.get_token(&ctx).await.unwrap_err();
    assert_eq!(
        e.context_error(),
        Some(janus::context::ContextError::DeadlineExceeded)
    );
}

#[tokio::test]
async fn test_exchange_cancelled_before_start() {
    let metadata_server = Arc::new(common::MetadataServer::janus_go());
    let metadata_addr = metadata_server.clone().start().await;
    let sts = Arc::new(common::FormServer::new(
        axum::http::StatusCode::OK,
        "text/xml",
        common::sts_success_xml("unused"),
    ));
    let sts_addr = sts.clone().start().await;

    let metadata = janus::metadata::MetadataClient::with_host(&metadata_addr.to_string()).unwrap();
    let resolver = janus::session::SessionIdentifierResolver::new(&metadata);
    let provider =
        janus::identity::IdentityTokenProvider::new(janus::config::Config::default(), &metadata)
            .unwrap();
    let client = common::sts_client(sts_addr);
    let role_arn = janus::validation::RoleArn::parse(common::ROLE_ARN).unwrap();

    let ctx = janus::context::Context::background();
    ctx.cancel();
    let e = janus::cmd::credential_process::obtain_credential(
        &ctx,
        &client,
        &resolver,
        &provider,
        &janus::cmd::credential_process::Request {
            role_arn: &role_arn,
            session_id: Some("explicit"),
            session_id_env: None,
            duration_seconds: None,
        },
    )
    .await
    .unwrap_err();

    assert_eq!(e.context_error(), Some(janus::context::ContextError::Cancelled));
    assert!(sts.requests().is_empty());
    assert!(metadata_server.audiences.lock().unwrap().is_empty());
}
