use anyhow::{Context, Result};
use document_store::Collection;
use identity_core::{SessionIdentity, UserId, Viewer};
use social_service::config::Config;
use social_service::{polls, Session, SnapshotApplied};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "social_service=info,graph_service=info,document_store=info";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
    }
}

fn log_summary(session: &Session, applied: SnapshotApplied) {
    match applied.collection {
        Collection::Connections => {
            let graph = session.graph();
            info!(
                connections = graph.connection_count(),
                incoming = graph.incoming_requests().len(),
                outgoing = graph.outgoing_requests().len(),
                "Connections updated"
            );
        }
        Collection::Posts => {
            let posts = session.feed().posts();
            info!(posts = posts.len(), skipped = applied.documents - applied.kept, "Feed updated");

            for post in &posts {
                let Some(poll) = &post.poll else { continue };
                let tally: Vec<String> = polls::tally(poll)
                    .iter()
                    .map(|t| format!("{}: {} ({:.0}%)", t.text, t.votes, t.percentage))
                    .collect();
                info!(
                    post_id = %post.id,
                    question = %poll.question,
                    total_votes = polls::total_votes(poll),
                    tally = %tally.join(", "),
                    "Poll tally"
                );
            }
        }
        Collection::Users => {
            let suggestions: Vec<String> = session
                .suggestions()
                .into_iter()
                .map(|profile| profile.display_name)
                .collect();
            info!(
                users = applied.kept,
                suggestions = %suggestions.join(", "),
                "User directory updated"
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting social-service");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        env = %config.app.env,
        backend = ?config.store.backend,
        strict_transitions = config.graph.strict_transitions,
        "Configuration loaded"
    );

    let store = config.store.connect().await?;
    let identity = Arc::new(SessionIdentity::default());
    let session = Arc::new(Session::new(store, identity.clone(), config.graph.clone()));

    let Some(viewer_id) = config.app.viewer_id.as_deref() else {
        warn!("VIEWER_ID not set, nothing to sync");
        shutdown_signal().await;
        return Ok(());
    };
    let viewer_id = UserId::new(viewer_id).context("Invalid VIEWER_ID")?;

    identity.sign_in(Viewer::new(viewer_id.clone(), viewer_id.as_str()));
    let profile = session
        .profiles()
        .load_or_create()
        .await
        .context("Failed to load viewer profile")?;

    let mut viewer = Viewer::new(viewer_id, profile.display_name.clone()).with_email(profile.email);
    if let Some(picture) = profile.profile_picture {
        viewer = viewer.with_profile_picture(picture);
    }
    identity.sign_in(viewer);
    info!(user_id = %profile.id, name = %profile.display_name, "Signed in");

    let mut sync = session
        .spawn_sync()
        .await
        .context("Failed to start live sync")?;
    info!("social-service is running");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            update = sync.next_update() => match update {
                Some(applied) => log_summary(&session, applied),
                None => {
                    error!("All live queries closed");
                    break;
                }
            },
        }
    }

    sync.shutdown();
    info!("social-service shutting down");
    Ok(())
}
