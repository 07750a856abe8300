use clap::Parser;
use std::io::IsTerminal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_broadcast_rotator::Rotator;
use youtube_broadcast_rotator::config::{AuthArgs, Cli, Command, RotateArgs};
use youtube_broadcast_rotator::credentials::{
    CachedCredentials, CredentialCache, CredentialProvider, InteractiveGrant,
};
use youtube_broadcast_rotator::oauth::{ClientSecrets, OAuthManager};
use youtube_broadcast_rotator::restreamer::Restreamer;
use youtube_broadcast_rotator::youtube_api::YouTubeClient;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    match Cli::parse().command {
        Command::Rotate(args) => rotate(args).await,
        Command::Authorize(auth) => authorize(auth).await,
    }
}

async fn oauth_manager(auth: &AuthArgs) -> eyre::Result<OAuthManager> {
    let secrets = ClientSecrets::load(&auth.client_secrets_path()).await?;
    OAuthManager::new(secrets)
}

async fn authorize(auth: AuthArgs) -> eyre::Result<()> {
    let grant = InteractiveGrant {
        cache: CredentialCache::new(auth.token_path()),
        oauth: oauth_manager(&auth).await?,
    };
    let token = grant.credential().await?;
    tracing::info!(expires_at = %token.expires_at(), "authorization complete");
    Ok(())
}

async fn rotate(args: RotateArgs) -> eyre::Result<()> {
    let retry = args.retry.policy();
    let oauth = oauth_manager(&args.auth).await?;
    let cache = CredentialCache::new(args.auth.token_path());

    let provider = CachedCredentials {
        cache: cache.clone(),
        oauth: oauth.clone(),
    };
    let token = retry
        .run("load credentials", || provider.credential())
        .await?;
    let initial_access_token = token.access_token().to_string();
    let youtube = YouTubeClient::new(token, oauth, args.youtube_api_base.as_str())?;

    let egress = match args.restreamer.config() {
        Some(config) => {
            let restreamer = retry
                .run("log in to restreamer", || Restreamer::login(config.clone()))
                .await?;
            Some(restreamer)
        }
        None => {
            tracing::info!("no restreamer configured, egress control disabled");
            None
        }
    };

    let rotator = Rotator::new(youtube, egress, args.rotation_config(), retry);
    let result = rotator.rotate(jiff::Timestamp::now()).await;

    // A long retry chain may have refreshed the token; keep the newer one
    // whether or not the rotation succeeded.
    let token = rotator.api().token().await;
    if token.access_token() != initial_access_token
        && let Err(e) = cache.store(&token).await
    {
        tracing::warn!(error = %e, "could not persist refreshed credential");
    }

    let outcome = result?;
    match &outcome.new_broadcast_id {
        Some(id) => tracing::info!(
            stream_id = %outcome.stream_id,
            broadcast_id = %id,
            "rotation complete"
        ),
        None => tracing::info!(stream_id = %outcome.stream_id, "dry run complete"),
    }
    Ok(())
}
