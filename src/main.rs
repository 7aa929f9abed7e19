use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use polls::config::Config;
use polls::db::{self, Migrator, PollsStorage};
use polls::service::{accounts, fixtures, static_assets};
use polls::{PollsState, polls_router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[command(name = "polls", version, about = "Online polls: questions, choices and votes")]
struct Cli {
    /// Defaults to `serve`.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending migrations, then serve HTTP
    Serve {
        /// Overrides BIND_ADDR
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        skip_migrate: bool,
    },
    /// Apply pending database migrations
    Migrate {
        /// Only show which migrations are applied
        #[arg(long)]
        list: bool,
    },
    /// Load JSON fixtures in the given order, all or nothing
    Loaddata {
        #[arg(required = true)]
        fixtures: Vec<PathBuf>,
    },
    /// Write bundled static assets into STATIC_ROOT
    Collectstatic,
    /// Create a staff superuser
    Createsuperuser {
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, env = "SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let cfg = Config::from_env()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.basic.database_url,
        debug = cfg.basic.debug,
        timezone = %cfg.basic.timezone,
        allowed_hosts = %cfg.security.allowed_hosts,
        "configuration loaded"
    );

    let command = cli.command.unwrap_or(Command::Serve {
        bind: None,
        skip_migrate: false,
    });

    if let Command::Collectstatic = command {
        static_assets::collect(&cfg.basic.static_root).await?;
        return Ok(());
    }

    let storage = PollsStorage::new(db::connect(&cfg.basic.database_url).await?);

    match command {
        Command::Serve { bind, skip_migrate } => serve(storage, &cfg, bind, skip_migrate).await?,
        Command::Migrate { list: true } => {
            for m in Migrator::new(storage.pool()).status().await? {
                println!("[{}] {}", if m.applied { "X" } else { " " }, m.name);
            }
        }
        Command::Migrate { list: false } => {
            let ran = storage.migrate().await?;
            info!(count = ran.len(), "migrations applied");
        }
        Command::Loaddata { fixtures: paths } => {
            fixtures::load_fixtures(&storage, &paths).await?;
        }
        Command::Createsuperuser {
            username,
            email,
            password,
        } => {
            accounts::create_superuser(&storage, &username, &email, &password).await?;
        }
        Command::Collectstatic => unreachable!("handled before connecting"),
    }
    Ok(())
}

/// Migrate first; a failed migration means the listener is never bound.
async fn serve(
    storage: PollsStorage,
    cfg: &Config,
    bind: Option<String>,
    skip_migrate: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !skip_migrate {
        let ran = storage.migrate().await?;
        info!(count = ran.len(), "migrations applied");
    }

    let state = PollsState::new(storage, cfg)?;
    if cfg.security.secret_key.is_none() {
        warn!("SECRET_KEY not set; sessions will not survive a restart");
    }

    let limiter = state.login_limiter.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            limiter.retain_recent();
        }
    });

    let app = polls_router(state);

    let addr = bind.unwrap_or_else(|| cfg.basic.bind_addr.clone());
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
