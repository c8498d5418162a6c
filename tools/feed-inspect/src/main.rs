use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use geo::Point;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod fetcher;
mod output;

use fetcher::FileFetcher;
use ridealong_core::transit::identifiers::{DirectionIdentifier, RouteIdentifier, StopIdentifier};
use ridealong_core::transit::models::types::{Route, SourceTag};
use ridealong_core::transit::spatial::{
    bounding_box, decode_polyline, flatten_plan, path_length, segment_path, StepSelection,
};
use ridealong_core::{FeedConfig, QueryState, TransitFeeds};

#[derive(Parser, Debug)]
#[command(
    name = "feed-inspect",
    author,
    version,
    about = "Resolve transit feed queries against payload files on disk",
    long_about = "Runs the query layer over JSON payloads laid out as \
                  <data>/<source>/<resource>.json, exactly as the apps would \
                  see them from the backends.\n\n\
                  Use it to check new payload captures, reproduce a departure \
                  board at a given time or step through a trip plan."
)]
struct Args {
    /// Feed config JSON (endpoints, cache, theme, palette, utc offset)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Payload directory; overrides the configured endpoints with
    /// <data>/bustime, <data>/campus and <data>/planner
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Verbose output (show debug messages)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a source's routes with their directions
    Routes {
        #[arg(short, long, default_value = "bustime")]
        source: SourceTag,
    },

    /// List a source's vehicles, optionally following refetches
    Vehicles {
        #[arg(short, long, default_value = "bustime")]
        source: SourceTag,

        /// Print this many refetched snapshots after the first
        #[arg(long, default_value = "0")]
        watch: usize,
    },

    /// Show the departure grid at one stop
    Board {
        #[arg(short, long, default_value = "bustime")]
        source: SourceTag,
        #[arg(short, long)]
        route: String,
        #[arg(long)]
        direction: String,
        #[arg(long)]
        stop: String,
        /// Local time to highlight from, as YYYY-MM-DDTHH:MM (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Summarize how far a direction runs off schedule
    Deviation {
        #[arg(short, long, default_value = "bustime")]
        source: SourceTag,
        #[arg(short, long)]
        route: String,
        #[arg(long)]
        direction: String,
    },

    /// List alerts for a route
    Alerts {
        #[arg(short, long, default_value = "bustime")]
        source: SourceTag,
        #[arg(short, long)]
        route: String,
    },

    /// Search stops by name
    Places {
        #[arg(short, long, default_value = "bustime")]
        source: SourceTag,
        text: String,
        /// Rider location as LAT,LON; sorts results by distance
        #[arg(long)]
        near: Option<String>,
    },

    /// Plan a trip and show how its path splits for one step
    Plan {
        /// Origin as LAT,LON
        #[arg(long)]
        from: String,
        /// Destination as LAT,LON
        #[arg(long)]
        to: String,
        /// Instruction index to highlight (overview when omitted)
        #[arg(long)]
        step: Option<usize>,
    },

    /// Decode an encoded polyline
    Polyline { encoded: String },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .init();

    let config = load_config(&args)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    runtime.block_on(run(args.command, config))
}

fn load_config(args: &Args) -> Result<FeedConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            FeedConfig::from_json_str(&json)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        }
        None => FeedConfig::default(),
    };

    if let Some(data) = &args.data {
        if !data.is_dir() {
            bail!("Payload directory does not exist: {}", data.display());
        }
        let endpoint = |source: &str| data.join(source).display().to_string();
        config.endpoints.bustime = endpoint("bustime");
        config.endpoints.campus = endpoint("campus");
        config.endpoints.planner = endpoint("planner");
    }

    Ok(config)
}

async fn run(command: Command, config: FeedConfig) -> Result<()> {
    let offset = config.utc_offset().context("Invalid feed configuration")?;
    let feeds = TransitFeeds::new(Arc::new(FileFetcher), config)
        .context("Invalid feed configuration")?;

    match command {
        Command::Routes { source } => {
            let routes = settled(feeds.routes(source).resolve().await, "routes")?;
            for route in routes.iter() {
                print!("{}", output::route(route));
            }
        }

        Command::Vehicles { source, watch } => {
            let query = feeds.vehicles(source);
            let buses = settled(query.resolve().await, "vehicles")?;
            print!("{}", output::vehicles(&buses));

            let period = feeds.config().cache.vehicles_refetch();
            for _ in 0..watch {
                tokio::time::sleep(period).await;
                let buses = settled(query.refresh().await, "vehicles")?;
                println!("--");
                print!("{}", output::vehicles(&buses));
            }
        }

        Command::Board {
            source,
            route,
            direction,
            stop,
            at,
        } => {
            let route = find_route(&feeds, source, &route).await?;
            let direction = direction_id(&route, &direction);
            let now = match at {
                Some(at) => NaiveDateTime::parse_from_str(&at, "%Y-%m-%dT%H:%M")
                    .with_context(|| format!("Invalid time: {at}"))?,
                None => Utc::now().with_timezone(&offset).naive_local(),
            };
            let stop = StopIdentifier::new(stop);
            let grid = settled(feeds.board(&route, &direction, &stop, now).await, "board")?;
            print!("{}", output::grid(&grid));
        }

        Command::Deviation {
            source,
            route,
            direction,
        } => {
            let route = find_route(&feeds, source, &route).await?;
            let direction = direction_id(&route, &direction);
            let status = settled(feeds.deviation(Some(&route), Some(&direction)).await, "deviation")?;
            println!("{}: {}", direction, status);
        }

        Command::Alerts { source, route } => {
            let route = find_route(&feeds, source, &route).await?;
            let alerts = settled(feeds.alerts(Some(&route)).resolve().await, "alerts")?;
            if alerts.is_empty() {
                println!("No alerts for {}", route.short_code);
            }
            for alert in alerts.iter() {
                print!("{}", output::alert(alert));
            }
        }

        Command::Places { source, text, near } => {
            let near = near.as_deref().map(parse_point).transpose()?;
            let places = settled(feeds.place_suggestions(source, &text, near).await, "places")?;
            for place in places.iter() {
                println!("{}", output::place(place, near));
            }
        }

        Command::Plan { from, to, step } => {
            let (from, to) = (parse_point(&from)?, parse_point(&to)?);
            let plans = settled(feeds.trip_plans(Some(from), Some(to)).resolve().await, "trip plans")?;
            let Some(plan) = plans.first() else {
                bail!("The planner returned no trips");
            };
            print!("{}", output::plan(plan));

            let selection = step.map_or(StepSelection::Overview, StepSelection::Step);
            let segments = segment_path(&flatten_plan(plan), selection);
            print!("{}", output::segments(&segments));
        }

        Command::Polyline { encoded } => {
            let points = decode_polyline(&encoded).context("Failed to decode polyline")?;
            for point in &points {
                println!("{:.5},{:.5}", point.y(), point.x());
            }
            println!("{} points, {:.0} m", points.len(), path_length(&points));
            if let Some(bounds) = bounding_box(&points) {
                println!("{}", output::bounds(&bounds));
            }
        }
    }

    Ok(())
}

/// The settled value of a query, or why there is none.
fn settled<T>(state: QueryState<T>, what: &str) -> Result<Arc<T>> {
    match state {
        QueryState::Success(value) => Ok(value),
        QueryState::Error(error) => Err(anyhow!(error)).with_context(|| format!("Failed to load {what}")),
        QueryState::Idle => bail!("No source serves {what}"),
        QueryState::Pending => bail!("{what} is still loading"),
    }
}

async fn find_route(feeds: &TransitFeeds, source: SourceTag, id: &str) -> Result<Arc<Route>> {
    let routes = settled(feeds.routes(source).resolve().await, "routes")?;
    let id = RouteIdentifier::new(id);
    routes
        .iter()
        .find(|route| route.id == id || route.short_code.as_ref() == id.as_str())
        .cloned()
        .with_context(|| format!("Route {id} not found in {source}"))
}

/// Accept either a full direction id or the name scoped to the route.
fn direction_id(route: &Route, direction: &str) -> DirectionIdentifier {
    let full = DirectionIdentifier::new(direction);
    if route.direction(&full).is_some() {
        return full;
    }
    DirectionIdentifier::scoped(&route.id, direction)
}

fn parse_point(text: &str) -> Result<Point> {
    let (lat, lon) = text
        .split_once(',')
        .with_context(|| format!("Expected LAT,LON but got {text:?}"))?;
    let lat: f64 = lat.trim().parse().with_context(|| format!("Invalid latitude: {lat}"))?;
    let lon: f64 = lon.trim().parse().with_context(|| format!("Invalid longitude: {lon}"))?;
    Ok(Point::new(lon, lat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        let point = parse_point("40.4406, -79.9959").unwrap();
        assert_eq!(point.y(), 40.4406);
        assert_eq!(point.x(), -79.9959);
        assert!(parse_point("40.4406").is_err());
        assert!(parse_point("north,west").is_err());
    }

    #[test]
    fn test_settled_states() {
        assert_eq!(*settled(QueryState::Success(Arc::new(3)), "count").unwrap(), 3);
        assert!(settled::<u32>(QueryState::Idle, "count").is_err());
        assert!(settled::<u32>(QueryState::Pending, "count").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "feed-inspect",
            "--data",
            "captures",
            "board",
            "--route",
            "4",
            "--direction",
            "OUTBOUND",
            "--stop",
            "300",
            "--at",
            "2024-03-01T08:30",
        ])
        .unwrap();
        assert_eq!(args.data, Some(PathBuf::from("captures")));
        match args.command {
            Command::Board { source, route, .. } => {
                assert_eq!(source, SourceTag::Bustime);
                assert_eq!(route, "4");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
