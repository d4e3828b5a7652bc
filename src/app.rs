//! Command line front end: configuration, tracing and wiring of the service.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use clap::error::ErrorKind;
use clap::CommandFactory;
use clap::Parser;
use fieldx::fxstruct;
use garde::Validate;
use tokio::net::TcpListener;
use tracing::info;

use crate::aggregate::Aggregator;
use crate::policy::CachePolicy;
use crate::server;
use crate::service::CacheService;
use crate::store::MemoryStore;
use crate::store::NullStore;
use crate::traits::LmsClient;
use crate::traits::PersistentStore;
use crate::upstream::MoodleClient;

#[derive(Debug, Clone, clap::Parser, Validate)]
#[fxstruct(no_new, get(copy))]
#[clap(about, version, author, name = "lms-catalog-cache")]
pub struct Cli {
    /// Address to listen on.
    #[clap(long, env = "LMSCACHE_LISTEN", default_value = "0.0.0.0:8080")]
    #[garde(skip)]
    listen: SocketAddr,

    /// Site root of the LMS, e.g. https://lms.example.edu
    #[clap(long, env = "LMSCACHE_LMS_URL")]
    #[fieldx(get(clone))]
    #[garde(length(min = 1))]
    lms_url: String,

    /// Web-service token.
    #[clap(long, env = "LMSCACHE_LMS_TOKEN", hide_env_values = true)]
    #[fieldx(get(clone))]
    #[garde(length(min = 1))]
    lms_token: String,

    /// How many courses are enriched concurrently.
    #[clap(long, env = "LMSCACHE_BATCH_SIZE", default_value_t = 5)]
    #[garde(range(min = 1))]
    batch_size: usize,

    /// Budget for a single upstream call, in seconds.
    #[clap(long, env = "LMSCACHE_UPSTREAM_TIMEOUT", default_value_t = 10)]
    #[garde(range(min = 1))]
    upstream_timeout: u64,

    /// Maximum number of entries in the memory cache.
    #[clap(long, env = "LMSCACHE_MEMORY_CAPACITY", default_value_t = 10_000)]
    #[garde(range(min = 1))]
    memory_capacity: u64,

    /// TTL of root category listings, minutes.
    #[clap(long, env = "LMSCACHE_TTL_ROOT_CATEGORIES", default_value_t = 60)]
    #[garde(range(min = 1))]
    ttl_root_categories: u32,

    /// TTL of category children listings, minutes.
    #[clap(long, env = "LMSCACHE_TTL_CATEGORY_CHILDREN", default_value_t = 30)]
    #[garde(range(min = 1))]
    ttl_category_children: u32,

    /// TTL of plain course listings, minutes.
    #[clap(long, env = "LMSCACHE_TTL_COURSES", default_value_t = 15)]
    #[garde(range(min = 1))]
    ttl_courses: u32,

    /// TTL of course listings with enrolment counts and instructors, minutes.
    #[clap(long, env = "LMSCACHE_TTL_COURSES_WITH_DETAILS", default_value_t = 30)]
    #[garde(range(min = 1))]
    ttl_courses_with_details: u32,

    /// TTL of per-course enrolment stats, minutes.
    #[clap(long, env = "LMSCACHE_TTL_ENROLLMENT_STATS", default_value_t = 5)]
    #[garde(range(min = 1))]
    ttl_enrollment_stats: u32,

    /// TTL of a user's course list, minutes.
    #[clap(long, env = "LMSCACHE_TTL_USER_COURSES", default_value_t = 10)]
    #[garde(range(min = 1))]
    ttl_user_courses: u32,

    /// A user counts as active if they accessed the course within this many days.
    #[clap(long, env = "LMSCACHE_ACTIVE_WINDOW_DAYS", default_value_t = 30)]
    #[garde(range(min = 1))]
    active_window_days: i64,

    /// Persist the cache in SQLite.
    #[clap(long, env = "LMSCACHE_SQLITE")]
    #[garde(skip)]
    sqlite: bool,

    /// SQLite database file.
    #[clap(long, env = "LMSCACHE_SQLITE_PATH", default_value = "lms-cache.db")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    sqlite_path: PathBuf,

    /// Persist the cache in PostgreSQL.
    #[clap(long, env = "LMSCACHE_PG")]
    #[garde(custom(Self::exclusive_with_sqlite(&self.sqlite)))]
    pg: bool,

    #[clap(long, env = "LMSCACHE_PG_HOST", default_value = "localhost")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    pg_host: String,

    #[clap(long, env = "LMSCACHE_PG_PORT", default_value_t = 5432)]
    #[garde(skip)]
    pg_port: u16,

    #[clap(long, env = "LMSCACHE_PG_USER", default_value = "lms_cache")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    pg_user: String,

    #[clap(long, env = "LMSCACHE_PG_PASSWORD", default_value = "", hide_env_values = true)]
    #[fieldx(get(clone))]
    #[garde(skip)]
    pg_password: String,

    #[clap(long, env = "LMSCACHE_PG_DATABASE", default_value = "lms_cache")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    pg_database: String,

    /// Write log to this file instead of stdout. Needs the `tracing-file` feature.
    #[clap(long, env = "LMSCACHE_LOG_FILE")]
    #[fieldx(get(clone))]
    #[garde(skip)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn exclusive_with_sqlite<'a>(sqlite: &'a bool) -> impl FnOnce(&'a bool, &()) -> garde::Result {
        move |pg, _| {
            if *pg && *sqlite {
                Err(garde::Error::new("--pg and --sqlite cannot be used together"))
            }
            else {
                Ok(())
            }
        }
    }

    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            root_categories_ttl: self.ttl_root_categories,
            category_children_ttl: self.ttl_category_children,
            courses_ttl: self.ttl_courses,
            courses_with_details_ttl: self.ttl_courses_with_details,
            enrollment_stats_ttl: self.ttl_enrollment_stats,
            user_courses_ttl: self.ttl_user_courses,
            ..CachePolicy::default()
        }
    }
}

/// The binary's application object.
#[derive(Debug)]
pub struct CatalogApp {
    cli: Cli,
}

impl CatalogApp {
    /// Parse the process arguments and environment. Help and version requests print and exit here.
    pub fn from_env() -> Result<Self> {
        match Cli::try_parse() {
            Ok(cli) => Self::new(cli),
            Err(err) => match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
                _ => Err(err.into()),
            },
        }
    }

    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::new(Cli::try_parse_from(args)?)
    }

    fn new(cli: Cli) -> Result<Self> {
        if let Err(err) = cli.validate() {
            let mut cmd = Cli::command();
            return Err(cmd.error(ErrorKind::InvalidValue, err).into());
        }
        Ok(Self { cli })
    }

    pub fn cli(&self) -> &Cli {
        &self.cli
    }

    #[cfg(feature = "tracing")]
    fn setup_tracing(&self) -> Result<()> {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(self.log_writer()?))
            .try_init()?;

        info!("Tracing initialized");

        Ok(())
    }

    #[cfg(feature = "tracing")]
    fn log_writer(&self) -> Result<std::sync::Mutex<Box<dyn std::io::Write + Send + 'static>>> {
        use std::io;

        #[cfg(feature = "tracing-file")]
        if let Some(log_file) = self.cli.log_file() {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(log_file)?;
            return Ok(std::sync::Mutex::new(Box::new(file)));
        }

        Ok(std::sync::Mutex::new(Box::new(io::stdout()) as Box<dyn io::Write + Send>))
    }

    async fn persistent_store(&self) -> Result<Arc<dyn PersistentStore>> {
        let cli = &self.cli;

        #[cfg(feature = "sqlite")]
        if cli.sqlite() {
            use crate::store::db::driver::sqlite::Sqlite;
            use crate::store::DbStore;

            let driver = Sqlite::connect(&cli.sqlite_path()).await?;
            let store = DbStore::new(Arc::new(driver));
            store.prepare().await?;
            info!("Persistent cache in SQLite at {}", cli.sqlite_path().display());
            return Ok(Arc::new(store));
        }

        #[cfg(not(feature = "sqlite"))]
        if cli.sqlite() {
            bail!("SQLite support is not enabled. Rebuild with `--features sqlite`.");
        }

        #[cfg(feature = "pg")]
        if cli.pg() {
            use crate::store::db::driver::pg::Pg;
            use crate::store::DbStore;

            let pg = Pg::builder()
                .host(cli.pg_host())
                .port(cli.pg_port())
                .user(cli.pg_user())
                .password(cli.pg_password())
                .database(cli.pg_database())
                .build()?;
            pg.connect().await?;
            let store = DbStore::new(pg);
            store.prepare().await?;
            info!("Persistent cache in PostgreSQL database {}@{}", cli.pg_database(), cli.pg_host());
            return Ok(Arc::new(store));
        }

        #[cfg(not(feature = "pg"))]
        if cli.pg() {
            bail!("PostgreSQL support is not enabled. Rebuild with `--features pg`.");
        }

        info!("Persistence is not configured, the memory tier is the only cache");
        Ok(Arc::new(NullStore))
    }

    /// Assemble the cache service from the configuration.
    pub async fn service(&self) -> Result<Arc<CacheService>> {
        let cli = &self.cli;
        let call_timeout = Duration::from_secs(cli.upstream_timeout());

        let client: Arc<dyn LmsClient> = Arc::new(
            MoodleClient::builder()
                .base_url(cli.lms_url())
                .token(cli.lms_token())
                .request_timeout(call_timeout)
                .active_window_days(cli.active_window_days())
                .build()?,
        );

        let aggregator = Aggregator::builder()
            .client(client)
            .batch_size(cli.batch_size())
            .call_timeout(call_timeout)
            .build()?;

        let memory = MemoryStore::builder().max_capacity(cli.memory_capacity()).build()?;

        Ok(Arc::new(
            CacheService::builder()
                .aggregator(Arc::new(aggregator))
                .memory(Arc::new(memory))
                .persistent(self.persistent_store().await?)
                .policy(cli.policy())
                .build()?,
        ))
    }

    pub async fn execute(&self) -> Result<()> {
        #[cfg(feature = "tracing")]
        self.setup_tracing()?;

        let service = self.service().await?;

        let listener = TcpListener::bind(self.cli.listen()).await?;
        server::serve(listener, service.clone()).await?;

        service.close().await;
        info!("Server stopped");

        Ok(())
    }
}
