use std::env;
use std::fmt;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};

use academy::api::{AppState, create_router};
use academy::auth::{
    AuthConfig, AuthState, NewPrincipal, Principal, Role, RoleGate, SqlitePrincipalStore,
};
use academy::db::Database;
use academy::payroll::{DEFAULT_ADVANCE_REASON, PayrollRepository, PayrollService, SystemClock};

const APP_NAME: &str = "academy";
const DATABASE_FILE: &str = "academy.db";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

#[tokio::main]
async fn async_principals(ctx: RuntimeContext, cmd: PrincipalCommand) -> Result<()> {
    handle_principals(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging();
    debug!("resolved paths: {}", ctx.paths);

    match cli.command {
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Admin { command } => async_principals(ctx, PrincipalCommand::Admin(command)),
        Command::Student { command } => async_principals(ctx, PrincipalCommand::Student(command)),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Academy administration server: auth gate and payroll ledger.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON (also switches logs to JSON)
    #[arg(long, global = true, conflicts_with = "yaml")]
    json: bool,
    /// Output machine readable YAML
    #[arg(long, global = true)]
    yaml: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true)]
    no_color: bool,
    /// Do not change anything on disk
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve(ServeCommand),
    /// Create config directories and default files
    Init(InitCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Manage administrator accounts
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
    /// Manage student accounts
    Student {
        #[command(subcommand)]
        command: StudentCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to (defaults to server.host)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (defaults to server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    /// Recreate configuration even if it already exists
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Regenerate the default configuration file
    Reset,
}

#[derive(Debug, Subcommand)]
enum AdminCommand {
    /// Create an administrator
    Create(CreateAdminCommand),
}

#[derive(Debug, Subcommand)]
enum StudentCommand {
    /// Create a student login
    Create(CreateStudentCommand),
}

#[derive(Debug, Clone, Args)]
struct CreateAdminCommand {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    /// Permission to grant (repeatable)
    #[arg(long = "permission", value_name = "NAME")]
    permissions: Vec<String>,
}

#[derive(Debug, Clone, Args)]
struct CreateStudentCommand {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Debug)]
enum PrincipalCommand {
    Admin(AdminCommand),
    Student(StudentCommand),
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
    /// Messages produced before the subscriber existed; emitted by `init_logging`.
    deferred_notices: Vec<String>,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.clone())?;
        let (config, deferred_notices) = load_or_init_config(&paths, &common)?;
        let paths = paths.apply_overrides(&config)?;
        let ctx = Self {
            common,
            paths,
            config,
            deferred_notices,
        };
        ctx.ensure_directories()?;
        Ok(ctx)
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        let level = self.effective_log_level();
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("academy={level},tower_http={level}")));

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            let disable_color = self.common.no_color
                || env::var_os("NO_COLOR").is_some()
                || !io::stderr().is_terminal();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color),
                )
                .try_init()
                .ok();
        }

        for notice in &self.deferred_notices {
            info!("{notice}");
        }
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.quiet {
            LevelFilter::ERROR
        } else if self.common.trace {
            LevelFilter::TRACE
        } else if self.common.debug {
            LevelFilter::DEBUG
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::INFO),
                1 => LevelFilter::DEBUG,
                _ => LevelFilter::TRACE,
            }
        }
    }

    fn ensure_directories(&self) -> Result<()> {
        if self.common.dry_run {
            info!(
                "dry-run: would ensure data dir {} and state dir {}",
                self.paths.data_dir.display(),
                self.paths.state_dir.display()
            );
            return Ok(());
        }

        fs::create_dir_all(&self.paths.data_dir).with_context(|| {
            format!("creating data directory {}", self.paths.data_dir.display())
        })?;
        fs::create_dir_all(&self.paths.state_dir).with_context(|| {
            format!(
                "creating state directory {}",
                self.paths.state_dir.display()
            )
        })?;
        Ok(())
    }

    fn database_path(&self) -> PathBuf {
        self.paths.data_dir.join(DATABASE_FILE)
    }
}

#[derive(Debug, Clone)]
struct AppPaths {
    config_file: PathBuf,
    data_dir: PathBuf,
    state_dir: PathBuf,
}

impl AppPaths {
    fn discover(override_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => {
                let expanded = expand_path(path)?;
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => default_config_dir()?.join("config.toml"),
        };

        if config_file.parent().is_none() {
            return Err(anyhow!("invalid config file path: {config_file:?}"));
        }

        Ok(Self {
            config_file,
            data_dir: default_data_dir()?,
            state_dir: default_state_dir()?,
        })
    }

    fn apply_overrides(mut self, cfg: &AppConfig) -> Result<Self> {
        if let Some(ref data_override) = cfg.paths.data_dir {
            self.data_dir = expand_str_path(data_override)?;
        }
        if let Some(ref state_override) = cfg.paths.state_dir {
            self.state_dir = expand_str_path(state_override)?;
        }
        Ok(self)
    }
}

impl fmt::Display for AppPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "config: {}, data: {}, state: {}",
            self.config_file.display(),
            self.data_dir.display(),
            self.state_dir.display()
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    logging: LoggingConfig,
    paths: PathsConfig,
    server: ServerConfig,
    auth: AuthConfig,
    payroll: PayrollConfig,
}

impl AppConfig {
    /// Copy safe to print: literal secrets are masked, `env:` references kept.
    fn redacted(&self) -> Self {
        let mut config = self.clone();
        let is_literal = config
            .auth
            .jwt_secret
            .as_deref()
            .is_some_and(|secret| !secret.starts_with("env:"));
        if is_literal {
            config.auth.jwt_secret = Some("<redacted>".to_string());
        }
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct LoggingConfig {
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct PathsConfig {
    data_dir: Option<String>,
    state_dir: Option<String>,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ServerConfig {
    host: String,
    port: u16,
    /// Include raw internal error detail in 500 responses. Development only.
    expose_error_details: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            expose_error_details: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct PayrollConfig {
    /// Reason recorded on advances granted without one.
    default_reason: String,
}

impl Default for PayrollConfig {
    fn default() -> Self {
        Self {
            default_reason: DEFAULT_ADVANCE_REASON.to_string(),
        }
    }
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.config_file.exists() && !cmd.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.paths.config_file.display()
        ));
    }

    if ctx.common.dry_run {
        info!(
            "dry-run: would write default config to {}",
            ctx.paths.config_file.display()
        );
        return Ok(());
    }

    write_default_config(&ctx.paths.config_file)
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = ctx.config.redacted();
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&config).context("serializing config to JSON")?
                );
            } else if ctx.common.yaml {
                println!(
                    "{}",
                    serde_yaml::to_string(&config).context("serializing config to YAML")?
                );
            } else {
                println!(
                    "{}",
                    toml::to_string_pretty(&config).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                info!(
                    "dry-run: would reset config at {}",
                    ctx.paths.config_file.display()
                );
                return Ok(());
            }
            write_default_config(&ctx.paths.config_file)
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

async fn handle_principals(ctx: &RuntimeContext, cmd: PrincipalCommand) -> Result<()> {
    let (request, role) = match cmd {
        PrincipalCommand::Admin(AdminCommand::Create(c)) => (
            NewPrincipal {
                name: c.name,
                email: c.email,
                password: c.password,
                permissions: c.permissions,
            },
            Role::Admin,
        ),
        PrincipalCommand::Student(StudentCommand::Create(c)) => (
            NewPrincipal {
                name: c.name,
                email: c.email,
                password: c.password,
                permissions: Vec::new(),
            },
            Role::Student,
        ),
    };

    if ctx.common.dry_run {
        info!("dry-run: would create {} {}", role, request.email);
        return Ok(());
    }

    let database = Database::new(&ctx.database_path()).await?;
    let store = match role {
        Role::Admin => SqlitePrincipalStore::admins(database.pool().clone()),
        Role::Student => SqlitePrincipalStore::students(database.pool().clone()),
    };
    let principal = store.create(request).await?;
    print_principal(ctx, &principal)
}

fn print_principal(ctx: &RuntimeContext, principal: &Principal) -> Result<()> {
    if ctx.common.json {
        println!("{}", serde_json::to_string_pretty(principal)?);
    } else if ctx.common.yaml {
        println!("{}", serde_yaml::to_string(principal)?);
    } else {
        println!(
            "Created {} {} <{}> ({})",
            principal.role, principal.name, principal.email, principal.id
        );
    }
    Ok(())
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    info!("Starting academy server...");

    let db_path = ctx.database_path();
    info!("Database path: {}", db_path.display());
    let database = Database::new(&db_path).await?;

    let auth_config = ctx.config.auth.clone();
    auth_config
        .validate()
        .context("Invalid auth configuration")?;
    info!(
        "Auth mode: {}",
        if auth_config.dev_mode {
            "development"
        } else {
            "production"
        }
    );
    let auth_state = AuthState::new(auth_config);

    let admins = Arc::new(SqlitePrincipalStore::admins(database.pool().clone()));
    let students = Arc::new(SqlitePrincipalStore::students(database.pool().clone()));
    let admin_gate = RoleGate::admin(auth_state.clone(), admins);
    let student_gate = RoleGate::student(auth_state.clone(), students);

    let payroll = PayrollService::new(
        PayrollRepository::new(database.pool().clone()),
        Arc::new(SystemClock),
    )
    .with_default_reason(ctx.config.payroll.default_reason.clone());

    let state = AppState::new(payroll, auth_state, admin_gate, student_gate)
        .with_error_details(ctx.config.server.expose_error_details);
    let app = create_router(state);

    let host = cmd.host.unwrap_or_else(|| ctx.config.server.host.clone());
    let port = cmd.port.unwrap_or(ctx.config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("parsing listen address {host}:{port}"))?;
    info!("Listening on http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .context("binding to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}

fn load_or_init_config(
    paths: &AppPaths,
    common: &CommonOpts,
) -> Result<(AppConfig, Vec<String>)> {
    let mut notices = Vec::new();
    if !paths.config_file.exists() {
        if common.dry_run {
            notices.push(format!(
                "dry-run: would create default config at {}",
                paths.config_file.display()
            ));
        } else {
            write_default_config(&paths.config_file)?;
        }
    }

    let env_prefix = env_prefix();
    let built = Config::builder()
        .set_default("logging.level", "info")?
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 5000_i64)?
        .add_source(
            File::from(paths.config_file.as_path())
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(env_prefix.as_str())
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("auth.allowed_origins"),
        )
        .build()?;

    let config: AppConfig = built.try_deserialize()?;
    Ok((config, notices))
}

/// Write the default config. A fresh signing secret is generated so the
/// server starts in production mode without further edits.
fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some(AuthConfig::generate_jwt_secret());

    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!("could not restrict permissions on {}: {}", path.display(), e);
        }
    }

    Ok(())
}

fn default_config_header(path: &Path) -> String {
    format!(
        "# Configuration for {APP_NAME}\n# File: {}\n\n",
        path.display()
    )
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        expand_str_path(text)
    } else {
        Ok(path)
    }
}

fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::data_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}

fn default_state_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::state_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("state").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine state directory"))
}

fn env_prefix() -> String {
    APP_NAME.to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_default_config(&path).unwrap();

        let paths = AppPaths {
            config_file: path.clone(),
            data_dir: dir.path().join("data"),
            state_dir: dir.path().join("state"),
        };
        let common = CommonOpts {
            config: Some(path),
            quiet: false,
            verbose: 0,
            debug: false,
            trace: false,
            json: false,
            yaml: false,
            no_color: true,
            dry_run: false,
        };
        let (config, notices) = load_or_init_config(&paths, &common).unwrap();
        assert!(notices.is_empty());
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.payroll.default_reason, DEFAULT_ADVANCE_REASON);
        assert!(!config.server.expose_error_details);
        assert!(config.auth.validate().is_ok());
    }

    #[test]
    fn test_dry_run_defers_config_notice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let paths = AppPaths {
            config_file: path.clone(),
            data_dir: dir.path().join("data"),
            state_dir: dir.path().join("state"),
        };
        let common = CommonOpts {
            config: Some(path.clone()),
            quiet: false,
            verbose: 0,
            debug: false,
            trace: false,
            json: false,
            yaml: false,
            no_color: true,
            dry_run: true,
        };

        let (config, notices) = load_or_init_config(&paths, &common).unwrap();
        assert!(!path.exists());
        assert_eq!(config.server.port, 5000);
        assert_eq!(
            notices,
            vec![format!(
                "dry-run: would create default config at {}",
                path.display()
            )]
        );
    }

    #[test]
    fn test_redacted_masks_literal_secret() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some("a".repeat(40));
        assert_eq!(
            config.redacted().auth.jwt_secret.as_deref(),
            Some("<redacted>")
        );

        config.auth.jwt_secret = Some("env:ACADEMY_JWT".to_string());
        assert_eq!(
            config.redacted().auth.jwt_secret.as_deref(),
            Some("env:ACADEMY_JWT")
        );
    }

    #[test]
    fn test_cli_parses_admin_create() {
        let cli = Cli::try_parse_from([
            "academy",
            "admin",
            "create",
            "--name",
            "Office",
            "--email",
            "office@example.com",
            "--password",
            "secret1",
            "--permission",
            "payroll",
        ])
        .unwrap();
        match cli.command {
            Command::Admin {
                command: AdminCommand::Create(c),
            } => assert_eq!(c.permissions, vec!["payroll"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
