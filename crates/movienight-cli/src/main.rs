//! movienight - movie-watching groups from the command line.
//!
//! Drives the core library headlessly: sign in as a user, browse the TMDB
//! catalogue, manage groups and mark movies as watched or to watch.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use movienight_core::api::CatalogClient;
use movienight_core::auth::{Session, SessionData};
use movienight_core::cache::CacheStore;
use movienight_core::config::Config;
use movienight_core::models::{Movie, MovieAction, MoviePage};
use movienight_core::remote::LocalDocumentStore;
use movienight_core::sync::{GroupSnapshot, MirrorHandle};
use movienight_core::usecases;
use movienight_core::viewmodel::UiState;
use movienight_core::Repository;

// ============================================================================
// Constants
// ============================================================================

/// How long to wait for the first remote snapshot before using the cache
const SYNC_TIMEOUT_SECS: u64 = 5;

/// Log file name prefix inside `MOVIENIGHT_LOG_DIR`
const LOG_FILE_PREFIX: &str = "movienight.log";

/// Overview length in movie listings
const OVERVIEW_PREVIEW_LEN: usize = 80;

const USAGE: &str = "\
Usage: movienight <command> [args]

Commands:
  login <user-id> <email>       Sign in, registering the account if needed
  logout                        Forget the signed-in user
  popular [page]                List popular movies
  search <query>                Search movies by title
  groups                        List your groups
  create-group <name>           Create a group you own
  add-member <group> <user-id>  Add a user to a group
  watched <group> <movie-id>    Mark a movie as watched in a group
  to-watch <group> <movie-id>   Mark a movie as to watch in a group
  status <group> <movie-id>     Show your status for a movie in a group";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file and must be held until exit.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var("MOVIENIGHT_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("help");
    let rest = if args.is_empty() { &args[..] } else { &args[1..] };
    info!(command = command, "movienight starting");

    match command {
        "login" => login(rest).await,
        "logout" => logout(),
        "popular" => popular(rest).await,
        "search" => search(rest).await,
        "groups" => groups().await,
        "create-group" => create_group(rest).await,
        "add-member" => add_member(rest).await,
        "watched" => set_status(rest, MovieAction::MarkWatched).await,
        "to-watch" => set_status(rest, MovieAction::MarkToWatch).await,
        "status" => status(rest).await,
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

// ============================================================================
// Wiring
// ============================================================================

struct App {
    config: Config,
    repo: Arc<Repository>,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let cache = CacheStore::open(&cache_dir)
            .with_context(|| format!("Failed to open cache at {}", cache_dir.display()))?;
        let remote = LocalDocumentStore::open(config.remote_store_path()?)
            .context("Failed to open document store")?;

        let mut catalog = CatalogClient::new(config.catalog_base_url.clone())?
            .with_language(config.language.clone());
        if let Ok(key) = std::env::var("TMDB_API_KEY") {
            catalog = catalog.with_api_key(key);
        }

        let repo = Repository::new(Arc::new(cache), Arc::new(remote), catalog);
        Ok(Self {
            config,
            repo: Arc::new(repo),
        })
    }

    /// Open for the signed-in user
    fn signed_in() -> Result<(Self, String)> {
        let config = Config::load()?;
        let user_id = config
            .last_user_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Not signed in. Run `movienight login <user-id> <email>` first."))?;

        let mut session = Session::new(config.cache_dir()?);
        session.load()?;
        if session.user_id() != Some(user_id.as_str()) {
            bail!("Session for {} not found. Run `movienight login` again.", user_id);
        }
        Ok((Self::open(config)?, user_id))
    }

    fn require_catalog(&self) -> Result<()> {
        if !self.repo.catalog().has_api_key() {
            bail!("TMDB_API_KEY is not set");
        }
        Ok(())
    }

    /// Mirror the user's groups and wait for the first snapshot
    async fn sync(&self, user_id: &str) -> Result<MirrorHandle<GroupSnapshot>> {
        let mut handle = self.repo.sync_groups_for_user(user_id).await?;
        match tokio::time::timeout(Duration::from_secs(SYNC_TIMEOUT_SECS), handle.changed()).await {
            Ok(Some(Err(e))) => eprintln!("Remote sync failed ({}), showing cached data", e),
            Ok(_) => {}
            Err(_) => eprintln!("Remote sync timed out, showing cached data"),
        }
        Ok(handle)
    }
}

fn into_result<T>(state: UiState<T>) -> Result<T> {
    match state {
        UiState::Success(data) => Ok(data),
        UiState::Error(e) => Err(e.into()),
        UiState::Idle | UiState::Loading => bail!("Operation did not complete"),
    }
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing argument <{}>\n\n{}", name, USAGE))
}

fn movie_id_arg(args: &[String], index: usize) -> Result<i64> {
    let raw = arg(args, index, "movie-id")?;
    raw.parse().with_context(|| format!("Invalid movie id: {}", raw))
}

// ============================================================================
// Commands
// ============================================================================

async fn login(args: &[String]) -> Result<()> {
    let user_id = arg(args, 0, "user-id")?;
    let email = arg(args, 1, "email")?;

    let mut config = Config::load()?;
    config.last_user_id = Some(user_id.to_string());
    let app = App::open(config)?;

    let user = into_result(usecases::sign_in(&app.repo, user_id, email).await)?;

    let mut session = Session::new(app.config.cache_dir()?);
    session.update(SessionData::new(&user.id, &user.email));
    session.save()?;
    app.config.save()?;

    println!("Signed in as {} <{}>", user.id, user.email);
    Ok(())
}

fn logout() -> Result<()> {
    let mut config = Config::load()?;
    let mut session = Session::new(config.cache_dir()?);
    session.clear()?;
    config.last_user_id = None;
    config.save()?;
    println!("Signed out");
    Ok(())
}

fn print_movies(page: &MoviePage, image_base_url: &str) {
    if page.results.is_empty() {
        println!("No movies found");
        return;
    }
    for movie in &page.results {
        print_movie(movie, image_base_url);
    }
    println!("\nPage {} of {} ({} movies)", page.page, page.total_pages, page.total_results);
}

fn print_movie(movie: &Movie, image_base_url: &str) {
    let year = movie
        .release_year()
        .map(|y| format!(" ({})", y))
        .unwrap_or_default();
    println!("{:>8}  {}{}  {}", movie.id, movie.title, year, movie.rating_display());
    if !movie.overview.is_empty() {
        println!("          {}", movie.short_overview(OVERVIEW_PREVIEW_LEN));
    }
    if let Some(url) = movie.poster_url(image_base_url) {
        println!("          {}", url);
    }
}

async fn popular(args: &[String]) -> Result<()> {
    let page = match args.first() {
        Some(raw) => raw.parse().with_context(|| format!("Invalid page: {}", raw))?,
        None => 1,
    };
    let app = App::open(Config::load()?)?;
    app.require_catalog()?;

    let result = into_result(usecases::get_popular_movies(&app.repo, page).await)?;
    print_movies(&result, &app.config.image_base_url);
    Ok(())
}

async fn search(args: &[String]) -> Result<()> {
    let query = args.join(" ");
    if query.trim().is_empty() {
        bail!("Missing argument <query>\n\n{}", USAGE);
    }
    let app = App::open(Config::load()?)?;
    app.require_catalog()?;

    let result = into_result(usecases::search_movies(&app.repo, &query, 1).await)?;
    print_movies(&result, &app.config.image_base_url);
    Ok(())
}

async fn groups() -> Result<()> {
    let (app, user_id) = App::signed_in()?;
    let _mirror = app.sync(&user_id).await?;

    let groups = app.repo.cache().groups_for_user(&user_id)?;
    if groups.is_empty() {
        println!("You are not in any group yet. Create one with `movienight create-group <name>`.");
        return Ok(());
    }
    for group in &groups {
        let role = if group.is_owner(&user_id) { " (owner)" } else { "" };
        println!(
            "{}  {}{}  {}, {} movies",
            group.id,
            group.name,
            role,
            group.display_member_count(),
            group.movie_ids().len()
        );
    }
    if let Some(age) = app.repo.sync_age()? {
        println!("\nSynced {}", age);
    }
    Ok(())
}

async fn create_group(args: &[String]) -> Result<()> {
    let name = args.join(" ");
    let (app, user_id) = App::signed_in()?;
    let group = into_result(usecases::create_group(&app.repo, &name, &user_id).await)?;
    println!("Created {} ({})", group.name, group.id);
    Ok(())
}

async fn add_member(args: &[String]) -> Result<()> {
    let group_id = arg(args, 0, "group")?;
    let member = arg(args, 1, "user-id")?;
    let (app, _) = App::signed_in()?;
    let group = into_result(usecases::add_member(&app.repo, group_id, member).await)?;
    println!("{} now has {}", group.name, group.display_member_count());
    Ok(())
}

async fn set_status(args: &[String], action: MovieAction) -> Result<()> {
    let group_id = arg(args, 0, "group")?;
    let movie_id = movie_id_arg(args, 1)?;
    let (app, user_id) = App::signed_in()?;
    // The group must be cached for the status row to be recorded
    let _mirror = app.sync(&user_id).await?;

    let status = into_result(
        usecases::set_movie_status(&app.repo, group_id, &user_id, movie_id, action).await,
    )?;
    println!("Movie {}: {}", movie_id, status);
    Ok(())
}

async fn status(args: &[String]) -> Result<()> {
    let group_id = arg(args, 0, "group")?;
    let movie_id = movie_id_arg(args, 1)?;
    let (app, user_id) = App::signed_in()?;
    let _mirror = app.sync(&user_id).await?;

    let status = app.repo.movie_status(group_id, &user_id, movie_id)?;
    if app.repo.catalog().has_api_key() {
        let movie = app.repo.catalog().movie(movie_id).await?;
        println!("{}: {}", movie.title, status);
    } else {
        println!("Movie {}: {}", movie_id, status);
    }
    Ok(())
}
