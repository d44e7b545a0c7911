use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use structopt::StructOpt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use busboard::config::Config;
use busboard::gtfs::GtfsFeed;
use busboard::provider::{HttpProvider, RouteDataProvider};
use busboard::{api, RouteAnimator, Status};

#[derive(StructOpt)]
#[structopt(name = "busboard", about = "Bus fleet dashboard backend")]
struct Args {
    /// TOML config file. Missing file means defaults.
    #[structopt(long, parse(from_os_str), default_value = "busboard.toml")]
    config: PathBuf,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Serve the route, stop and departure API
    Serve {
        #[structopt(long)]
        bind: Option<String>,
        /// Directory holding routes.txt, trips.txt, stop_times.txt, stops.txt, ...
        #[structopt(long)]
        data_dir: Option<String>,
    },
    /// Fetch a route path from the API and animate a bus along it
    Simulate {
        route_id: String,
        #[structopt(long, default_value = "0")]
        direction: u32,
        #[structopt(long)]
        api_url: Option<String>,
        /// Print every snapshot as a JSON line instead of logging it
        #[structopt(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::from_args();
    let mut config = Config::load(&args.config)?;

    match args.command {
        Command::Serve { bind, data_dir } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            serve(config).await
        }
        Command::Simulate {
            route_id,
            direction,
            api_url,
            json,
        } => {
            if let Some(api_url) = api_url {
                config.api_url = api_url;
            }
            simulate(config, &route_id, direction, json).await
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let feed = GtfsFeed::load(&config.data_dir)
        .with_context(|| format!("Failed to load GTFS data from {}", config.data_dir))?;
    let app = api::router(Arc::new(feed));

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    info!("Server is running on http://{}", config.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn simulate(config: Config, route_id: &str, direction: u32, json: bool) -> Result<()> {
    let provider = HttpProvider::new(config.api_url.clone(), config.request_timeout())?;
    // A failed fetch never reaches the animator.
    let path = provider.route_path(route_id, direction).await?;

    let (mut animator, mut updates) = RouteAnimator::new(config.animation.settings());
    let settings = animator.settings();
    info!(
        route_id,
        direction,
        speed_kmh = settings.speed_kmh,
        tick_ms = settings.tick_interval.as_millis() as u64,
        "Simulating bus"
    );
    animator.start(path.polyline(), path.stops, direction);

    while let Some(snapshot) = updates.recv().await {
        if json {
            println!("{}", serde_json::to_string(&snapshot)?);
            if snapshot.status.is_final() {
                break;
            }
            continue;
        }
        let state = &snapshot.state;
        match &snapshot.status {
            Status::Disarmed => info!(route_id, direction, "Route has no shape to animate"),
            Status::Failed(e) => error!(route_id, direction, "Animation failed: {}", e),
            status => info!(
                ?status,
                index = state.current_index,
                position = ?state.position.map(|p| p.to_pair()),
                nearest_stop = state.nearest_stop.as_ref().map(|s| s.name.as_str()).unwrap_or("-"),
                remaining_m = ?state.remaining_distance_m.map(|d| d.round()),
                remaining_s = ?state.remaining_time_s.map(|t| t.round()),
                "Bus update"
            ),
        }
        if snapshot.status.is_final() {
            break;
        }
    }

    animator.stop();
    Ok(())
}
