//! Top-level CLI definition and dispatch.

use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{Days, Local, NaiveDate};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use labdesk::api::client::ApiClient;
use labdesk::auth::profile::{ProfileService, ProfileUpdate};
use labdesk::auth::session::{AuthService, LoginOutcome, Registration};
use labdesk::auth::tokens::{TokenStore, fingerprint};
use labdesk::cli::alert_line;
use labdesk::cli::table::{self, terminal_width};
use labdesk::core::config::Config;
use labdesk::core::errors::LabError;
use labdesk::dashboard::summary::DashboardService;
use labdesk::logger::activity::{
    ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger,
};
#[cfg(feature = "sqlite")]
use labdesk::logger::sqlite::SqliteLogger;
#[cfg(feature = "sqlite")]
use labdesk::logger::stats::{StatsEngine, WindowStats, window_label};
use labdesk::query::fetcher::FetchStatus;
use labdesk::query::grid::GridBinding;
use labdesk::query::mutation::MutationKind;
use labdesk::query::selection::EntityId;
use labdesk::query::sort::{SortDirection, SortSpec};
use labdesk::query::state::FilterValue;
use labdesk::resources::media::MediaUploader;
use labdesk::resources::models::{
    Asset, Borrowing, Category, HistoryEntry, Location, Maintenance, Resource, ResourceKind, Room,
    Software, User,
};
use labdesk::resources::service::{ResourceService, grid_options};
use labdesk::ui::alerts::{AlertCenter, AlertLevel};
use labdesk::ui::i18n::{Catalog, Locale, MessageKey};

/// Extra wait on top of the request timeout before a list is reported as stuck.
const SETTLE_MARGIN: Duration = Duration::from_secs(5);
const DEFAULT_SETTLE_MS: u64 = 30_000;

/// Lab asset management from the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "labdesk",
    author,
    version,
    about = "Laboratory asset management client",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Sign in and store the session.
    Login(LoginArgs),
    /// End the session and forget stored tokens.
    Logout,
    /// Create an account.
    Register(RegisterArgs),
    /// Forgotten or changed passwords.
    Password(PasswordArgs),
    /// One-time codes for two-factor sign-in.
    Otp(OtpArgs),
    /// The signed-in user's profile.
    Profile(ProfileArgs),
    /// List one page of a resource.
    List(ListArgs),
    /// Show one record.
    Get(ItemArgs),
    /// Create a record from a JSON body.
    Create(CreateArgs),
    /// Update a record from a JSON body.
    Update(UpdateArgs),
    /// Delete a record.
    Delete(ItemArgs),
    /// Copy an asset on the server.
    Duplicate(DuplicateArgs),
    /// Search users or assets the way the selection dialogs do.
    Pick(PickArgs),
    /// Inventory counts and lab usage per day.
    Dashboard(DashboardArgs),
    /// Upload an image and print its URL.
    Upload(UploadArgs),
    /// Show aggregated request statistics from the activity database.
    #[cfg(feature = "sqlite")]
    Stats(StatsArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct LoginArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    /// One-time code, for accounts with two-factor sign-in.
    #[arg(long, value_name = "CODE")]
    code: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct RegisterArgs {
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    confirm: String,
    #[arg(long)]
    phone: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct PasswordArgs {
    #[command(subcommand)]
    command: PasswordCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum PasswordCommand {
    /// Email a reset code.
    Forgot {
        #[arg(long)]
        email: String,
    },
    /// Check a reset code before choosing a new password.
    Validate {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
    },
    /// Set a new password with a reset code.
    Reset {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
        #[arg(long = "new")]
        new_password: String,
        #[arg(long)]
        confirm: String,
    },
    /// Change the password of the signed-in user.
    Change {
        #[arg(long)]
        current: String,
        #[arg(long = "new")]
        new_password: String,
        #[arg(long)]
        confirm: String,
    },
}

#[derive(Debug, Clone, Args)]
struct OtpArgs {
    #[command(subcommand)]
    command: OtpCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum OtpCommand {
    /// Finish sign-in with an emailed code.
    Verify {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
    },
    /// Email a sign-in code.
    Email {
        #[arg(long)]
        email: String,
    },
    /// Finish sign-in with an authenticator app code.
    Qr {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
    },
}

#[derive(Debug, Clone, Args)]
struct ProfileArgs {
    #[command(subcommand)]
    command: Option<ProfileCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ProfileCommand {
    /// Print the profile.
    Show,
    /// Change profile fields. Omitted fields stay as they are.
    Update {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Image URL, e.g. from `labdesk upload`.
        #[arg(long)]
        image: Option<String>,
    },
    /// Turn two-factor sign-in on or off.
    Tfa,
}

#[derive(Debug, Clone, Args)]
struct ListArgs {
    /// Resource name (asset, room, borrowing, ...).
    resource: String,
    /// Free-text search.
    #[arg(short, long)]
    keyword: Option<String>,
    /// `name=value`; repeat a name to match any of several values.
    #[arg(short, long = "filter", value_name = "NAME=VALUE")]
    filters: Vec<String>,
    /// `field` or `field:asc|desc`.
    #[arg(short, long, value_name = "FIELD[:DIR]")]
    sort: Option<String>,
    /// 1-based page number.
    #[arg(short, long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    size: Option<u32>,
}

#[derive(Debug, Clone, Args)]
struct ItemArgs {
    resource: String,
    id: EntityId,
}

#[derive(Debug, Clone, Args)]
struct CreateArgs {
    resource: String,
    /// JSON body, or `@path` to read it from a file.
    #[arg(long, value_name = "JSON|@FILE")]
    data: String,
}

#[derive(Debug, Clone, Args)]
struct UpdateArgs {
    resource: String,
    id: EntityId,
    /// JSON body, or `@path` to read it from a file.
    #[arg(long, value_name = "JSON|@FILE")]
    data: String,
}

#[derive(Debug, Clone, Args)]
struct DuplicateArgs {
    /// Asset id.
    id: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PickTarget {
    Users,
    Assets,
}

#[derive(Debug, Clone, Args)]
struct PickArgs {
    #[arg(value_enum)]
    target: PickTarget,
    #[arg(long)]
    search: Option<String>,
    /// Pages to load, as if scrolling to the bottom.
    #[arg(long, default_value_t = 1)]
    pages: u32,
    /// Id to select once loaded.
    #[arg(long)]
    select: Option<EntityId>,
}

#[derive(Debug, Clone, Args)]
struct DashboardArgs {
    /// Days of usage to chart, ending today.
    #[arg(long, default_value_t = 7, conflicts_with = "from")]
    days: u64,
    /// First day (YYYY-MM-DD).
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,
    /// Last day (YYYY-MM-DD).
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Args)]
struct UploadArgs {
    path: PathBuf,
}

#[cfg(feature = "sqlite")]
#[derive(Debug, Clone, Args, Default)]
struct StatsArgs {
    /// Time window (for example: `15m`, `24h`, `7d`). Omit for all standard windows.
    #[arg(long, value_name = "WINDOW")]
    window: Option<String>,
    /// Show the N busiest endpoints.
    #[arg(long, default_value_t = 0, value_name = "N")]
    top: usize,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args, Default)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

impl From<LabError> for CliError {
    fn from(error: LabError) -> Self {
        let message = error.to_string();
        match error {
            LabError::Validation { .. }
            | LabError::InvalidConfig { .. }
            | LabError::MissingConfig { .. }
            | LabError::ConfigParse { .. }
            | LabError::Unauthorized { .. } => Self::User(message),
            LabError::Serialization { .. } | LabError::Unknown { .. } => Self::Internal(message),
            error if error.is_retryable() => Self::Runtime(format!("{message} (retrying may help)")),
            _ => Self::Runtime(message),
        }
    }
}

/// Everything a networked command needs: config, client, activity log, alerts.
struct App {
    config: Config,
    client: ApiClient,
    catalog: Catalog,
    alerts: Arc<AlertCenter>,
    activity: ActivityLoggerHandle,
    logger: JoinHandle<()>,
}

impl App {
    fn open(cli: &Cli) -> Result<Self, CliError> {
        let config = Config::load(cli.config.as_deref())?;
        let hash = config.stable_hash()?;
        let tokens = Arc::new(TokenStore::open(&config.paths.token_file)?);
        let (activity, logger) = spawn_logger(ActivityLoggerConfig::from_config(&config))?;
        activity.send(ActivityEvent::SessionStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: hash.clone(),
        });
        if cli.verbose {
            eprintln!(
                "config: {} (hash {hash})",
                config.paths.config_file.display()
            );
            eprintln!("api: {}", config.api.base_url);
            if let Some(token) = tokens.access_token() {
                eprintln!("session: {}", fingerprint(&token));
            }
        }
        let client = ApiClient::from_config(&config, tokens)?.with_activity(activity.clone());
        Ok(Self {
            catalog: Catalog::new(Locale::resolve(&config.ui.locale)),
            alerts: Arc::new(AlertCenter::new(config.ui.max_alerts)),
            config,
            client,
            activity,
            logger,
        })
    }

    fn settle_timeout(&self) -> Duration {
        let request = self.config.api.timeout_ms.unwrap_or(DEFAULT_SETTLE_MS);
        let debounce = self.config.grid.debounce_ms.max(self.config.picker.debounce_ms);
        Duration::from_millis(request.saturating_add(debounce)) + SETTLE_MARGIN
    }

    fn finish(self, command: &str, ok: bool) {
        self.activity.send(ActivityEvent::SessionEnded {
            command: command.to_string(),
            ok,
        });
        let closed = self.activity.shutdown().err().or_else(|| {
            self.logger.join().err().map(|_| LabError::ChannelClosed {
                component: "activity-logger",
            })
        });
        if let Some(error) = closed {
            eprintln!("{} activity log incomplete: {error}", "warning:".yellow());
        }
    }
}

fn with_app<F>(cli: &Cli, body: F) -> Result<(), CliError>
where
    F: FnOnce(&App) -> Result<(), CliError>,
{
    let app = App::open(cli)?;
    let result = body(&app);
    app.finish(command_label(&cli.command), result.is_ok());
    result
}

/// Run `$body` with `$r` bound to the entity type of `$kind`.
macro_rules! with_resource {
    ($kind:expr, $r:ident => $body:expr) => {
        match $kind {
            ResourceKind::Asset => {
                type $r = Asset;
                $body
            }
            ResourceKind::Category => {
                type $r = Category;
                $body
            }
            ResourceKind::Location => {
                type $r = Location;
                $body
            }
            ResourceKind::Room => {
                type $r = Room;
                $body
            }
            ResourceKind::Software => {
                type $r = Software;
                $body
            }
            ResourceKind::Maintenance => {
                type $r = Maintenance;
                $body
            }
            ResourceKind::Borrowing => {
                type $r = Borrowing;
                $body
            }
            ResourceKind::History => {
                type $r = HistoryEntry;
                $body
            }
            ResourceKind::User => {
                type $r = User;
                $body
            }
        }
    };
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Login(args) => with_app(cli, |app| run_login(cli, app, args)),
        Command::Logout => with_app(cli, |app| run_logout(cli, app)),
        Command::Register(args) => with_app(cli, |app| run_register(cli, app, args)),
        Command::Password(args) => with_app(cli, |app| run_password(cli, app, args)),
        Command::Otp(args) => with_app(cli, |app| run_otp(cli, app, args)),
        Command::Profile(args) => with_app(cli, |app| run_profile(cli, app, args)),
        Command::List(args) => {
            let kind = parse_resource(&args.resource)?;
            with_app(cli, |app| {
                with_resource!(kind, R => run_list::<R>(cli, app, args))
            })
        }
        Command::Get(args) => {
            let kind = parse_resource(&args.resource)?;
            with_app(cli, |app| {
                with_resource!(kind, R => run_get::<R>(cli, app, args.id))
            })
        }
        Command::Create(args) => {
            let kind = parse_resource(&args.resource)?;
            let body = read_body(&args.data)?;
            with_app(cli, |app| {
                with_resource!(kind, R => run_mutation::<R, _>(cli, app, MutationKind::Create, |service| {
                    service.create(&body)
                }))
            })
        }
        Command::Update(args) => {
            let kind = parse_resource(&args.resource)?;
            let body = read_body(&args.data)?;
            with_app(cli, |app| {
                with_resource!(kind, R => run_mutation::<R, _>(cli, app, MutationKind::Update, |service| {
                    service.update(args.id, &body)
                }))
            })
        }
        Command::Delete(args) => {
            let kind = parse_resource(&args.resource)?;
            with_app(cli, |app| {
                with_resource!(kind, R => run_mutation::<R, _>(cli, app, MutationKind::Delete, |service| {
                    service.delete(args.id).map(|()| None)
                }))
            })
        }
        Command::Duplicate(args) => with_app(cli, |app| {
            run_mutation::<Asset, _>(cli, app, MutationKind::Duplicate, |service| {
                service.duplicate(args.id)
            })
        }),
        Command::Pick(args) => with_app(cli, |app| match args.target {
            PickTarget::Users => run_pick::<User>(cli, app, args),
            PickTarget::Assets => run_pick::<Asset>(cli, app, args),
        }),
        Command::Dashboard(args) => with_app(cli, |app| run_dashboard(cli, app, args)),
        Command::Upload(args) => run_upload(cli, args),
        #[cfg(feature = "sqlite")]
        Command::Stats(args) => run_stats(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Login(_) => "login",
        Command::Logout => "logout",
        Command::Register(_) => "register",
        Command::Password(args) => match args.command {
            PasswordCommand::Forgot { .. } => "password forgot",
            PasswordCommand::Validate { .. } => "password validate",
            PasswordCommand::Reset { .. } => "password reset",
            PasswordCommand::Change { .. } => "password change",
        },
        Command::Otp(args) => match args.command {
            OtpCommand::Verify { .. } => "otp verify",
            OtpCommand::Email { .. } => "otp email",
            OtpCommand::Qr { .. } => "otp qr",
        },
        Command::Profile(args) => match args.command {
            None | Some(ProfileCommand::Show) => "profile show",
            Some(ProfileCommand::Update { .. }) => "profile update",
            Some(ProfileCommand::Tfa) => "profile tfa",
        },
        Command::List(_) => "list",
        Command::Get(_) => "get",
        Command::Create(_) => "create",
        Command::Update(_) => "update",
        Command::Delete(_) => "delete",
        Command::Duplicate(_) => "duplicate",
        Command::Pick(_) => "pick",
        Command::Dashboard(_) => "dashboard",
        Command::Upload(_) => "upload",
        #[cfg(feature = "sqlite")]
        Command::Stats(_) => "stats",
        Command::Config(args) => match args.command {
            None | Some(ConfigCommand::Path) => "config path",
            Some(ConfigCommand::Show) => "config show",
            Some(ConfigCommand::Validate) => "config validate",
        },
        Command::Version(_) => "version",
        Command::Completions(_) => "completions",
    }
}

// ---------------------------------------------------------------------------
// Session and account commands
// ---------------------------------------------------------------------------

fn run_login(cli: &Cli, app: &App, args: &LoginArgs) -> Result<(), CliError> {
    let auth = AuthService::new(app.client.clone());
    match auth.login(&args.email, &args.password)? {
        LoginOutcome::Authenticated => emit_message(
            cli,
            "login",
            app.catalog.text(MessageKey::LoginSucceeded),
            json!({"authenticated": true}),
        ),
        LoginOutcome::TwoFactorRequired { email, qr } => {
            if let Some(code) = &args.code {
                if qr.is_some() {
                    auth.verify_qr(&email, code)?;
                } else {
                    auth.verify_otp(&email, code)?;
                }
                return emit_message(
                    cli,
                    "login",
                    app.catalog.text(MessageKey::LoginSucceeded),
                    json!({"authenticated": true, "twoFactor": true}),
                );
            }
            let message = app.catalog.text(MessageKey::TwoFactorRequired);
            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{message}");
                    if qr.is_some() {
                        println!("  {}", app.catalog.text(MessageKey::ScanQrHint));
                        println!("  labdesk otp qr --email {email} --code <CODE>");
                    } else {
                        println!("  {}", app.catalog.text(MessageKey::RequestOtpHint));
                        println!("  labdesk otp email --email {email}");
                        println!("  labdesk otp verify --email {email} --code <CODE>");
                    }
                }
                OutputMode::Json => {
                    write_json_line(&json!({
                        "command": "login",
                        "authenticated": false,
                        "twoFactorRequired": true,
                        "email": email,
                        "qr": qr,
                    }))?;
                }
            }
            Err(CliError::Partial(message.to_string()))
        }
    }
}

fn run_logout(cli: &Cli, app: &App) -> Result<(), CliError> {
    let was_signed_in = app.client.tokens().is_authenticated();
    let remote = AuthService::new(app.client.clone()).logout();
    emit_message(
        cli,
        "logout",
        app.catalog.text(MessageKey::LoggedOut),
        json!({"hadSession": was_signed_in, "remoteOk": remote.is_ok()}),
    )?;
    remote.map_err(|e| CliError::Partial(format!("local session cleared; {e}")))
}

fn run_register(cli: &Cli, app: &App, args: &RegisterArgs) -> Result<(), CliError> {
    let registration = Registration {
        first_name: args.first_name.clone(),
        last_name: args.last_name.clone(),
        email: args.email.clone(),
        password: args.password.clone(),
        confirm_password: args.confirm.clone(),
        phone_number: args.phone.clone(),
    };
    let reply = AuthService::new(app.client.clone()).register(&registration)?;
    emit_reply(cli, app, "register", reply, MessageKey::Registered)
}

fn run_password(cli: &Cli, app: &App, args: &PasswordArgs) -> Result<(), CliError> {
    let label = command_label(&cli.command);
    let auth = AuthService::new(app.client.clone());
    match &args.command {
        PasswordCommand::Forgot { email } => {
            let reply = auth.forgot_password(email)?;
            emit_reply(cli, app, label, reply, MessageKey::ResetCodeSent)
        }
        PasswordCommand::Validate { email, code } => {
            let reply = auth.validate_reset_code(email, code)?;
            emit_reply(cli, app, label, reply, MessageKey::ResetCodeValid)
        }
        PasswordCommand::Reset {
            email,
            code,
            new_password,
            confirm,
        } => {
            auth.reset_password(email, code, new_password, confirm)?;
            emit_reply(cli, app, label, None, MessageKey::PasswordReset)
        }
        PasswordCommand::Change {
            current,
            new_password,
            confirm,
        } => {
            require_session(app)?;
            let reply =
                ProfileService::new(app.client.clone()).change_password(current, new_password, confirm)?;
            emit_reply(cli, app, label, reply, MessageKey::PasswordChanged)
        }
    }
}

fn run_otp(cli: &Cli, app: &App, args: &OtpArgs) -> Result<(), CliError> {
    let label = command_label(&cli.command);
    let auth = AuthService::new(app.client.clone());
    match &args.command {
        OtpCommand::Verify { email, code } => {
            auth.verify_otp(email, code)?;
            emit_reply(cli, app, label, None, MessageKey::OtpVerified)
        }
        OtpCommand::Qr { email, code } => {
            auth.verify_qr(email, code)?;
            emit_reply(cli, app, label, None, MessageKey::OtpVerified)
        }
        OtpCommand::Email { email } => {
            let reply = auth.email_otp(email)?;
            emit_reply(cli, app, label, reply, MessageKey::OtpSent)
        }
    }
}

fn run_profile(cli: &Cli, app: &App, args: &ProfileArgs) -> Result<(), CliError> {
    require_session(app)?;
    let label = command_label(&cli.command);
    let service = ProfileService::new(app.client.clone());
    match &args.command {
        None | Some(ProfileCommand::Show) => {
            let profile = service.profile()?;
            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", profile.full_name().bold());
                    println!("  Email: {}", profile.email);
                    if let Some(role) = &profile.role {
                        println!("  Role:  {role}");
                    }
                    if let Some(phone) = &profile.phone_number {
                        println!("  Phone: {phone}");
                    }
                    let tfa = if profile.mfa_enabled { "on" } else { "off" };
                    println!("  Two-factor: {tfa}");
                }
                OutputMode::Json => {
                    write_json_line(&json!({
                        "command": label,
                        "profile": serde_json::to_value(&profile)?,
                    }))?;
                }
            }
            Ok(())
        }
        Some(ProfileCommand::Update {
            first_name,
            last_name,
            phone,
            image,
        }) => {
            let update = ProfileUpdate {
                first_name: first_name.clone(),
                last_name: last_name.clone(),
                phone_number: phone.clone(),
                image: image.clone(),
            };
            let reply = service.update(&update)?;
            emit_reply(cli, app, label, reply, MessageKey::ProfileUpdated)
        }
        Some(ProfileCommand::Tfa) => {
            let reply = service.toggle_tfa()?;
            emit_reply(cli, app, label, reply, MessageKey::TwoFactorToggled)
        }
    }
}

fn require_session(app: &App) -> Result<(), CliError> {
    if app.client.tokens().is_authenticated() {
        Ok(())
    } else {
        Err(CliError::User(
            app.catalog.text(MessageKey::SessionMissing).to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Resource commands
// ---------------------------------------------------------------------------

fn run_list<R: Resource>(cli: &Cli, app: &App, args: &ListArgs) -> Result<(), CliError> {
    let index = args
        .page
        .checked_sub(1)
        .ok_or_else(|| CliError::User("--page starts at 1".to_string()))?;
    let mut grid = open_grid::<R>(app)?;
    if let Some(keyword) = &args.keyword {
        grid.set_keyword(keyword);
    }
    for (name, values) in parse_filters(&args.filters)? {
        grid.set_filter(&name, values);
    }
    grid.query().check_filters(R::FILTERS)?;
    if let Some(raw) = &args.sort {
        let sort = parse_sort(raw)?;
        if !R::SORT.allows(&sort.field) && !cli.quiet {
            eprintln!(
                "{} cannot sort {} by {}; using {}",
                "warning:".yellow(),
                R::NAME,
                sort.field,
                R::SORT.default_spec().field,
            );
        }
        grid.set_sort(Some(sort));
    }
    if let Some(size) = args.size {
        grid.set_page_size(size)?;
    }
    if index == 0 {
        grid.load();
    } else {
        grid.set_page(index);
    }
    settle(app, &grid)?;

    let total = grid.total_rows();
    let rows = grid.rows();
    match output_mode(cli) {
        OutputMode::Human => {
            if let Some(note) = grid.overlay_text() {
                println!("{note}");
            }
            if !rows.is_empty() {
                let mut headers = vec!["#"];
                headers.extend_from_slice(R::columns());
                let cells: Vec<Vec<String>> = rows
                    .iter()
                    .map(|row| {
                        let mut line = vec![row.ordinal.to_string()];
                        line.extend(row.item.cells());
                        line
                    })
                    .collect();
                print!("{}", table::render(&headers, &cells, terminal_width()));
            }
            println!(
                "{} · {}",
                app.catalog.page_position(grid.query().page(), grid.page_count()),
                app.catalog.total_rows(total),
            );
        }
        OutputMode::Json => {
            let page = grid.page();
            write_json_line(&json!({
                "command": "list",
                "resource": R::NAME,
                "page": page.number,
                "size": page.size,
                "totalElements": page.total_elements,
                "totalPages": page.total_pages(),
                "first": page.is_first(),
                "last": page.is_last(),
                "content": serde_json::to_value(&page.content)?,
            }))?;
        }
    }
    Ok(())
}

fn run_get<R: Resource>(cli: &Cli, app: &App, id: EntityId) -> Result<(), CliError> {
    let item = ResourceService::<R>::new(app.client.clone()).get(id)?;
    match output_mode(cli) {
        OutputMode::Human => {
            for (header, cell) in R::columns().iter().zip(item.cells()) {
                println!("{:<14} {cell}", header.to_lowercase());
            }
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "get",
                "resource": R::NAME,
                "item": serde_json::to_value(&item)?,
            }))?;
        }
    }
    Ok(())
}

/// Mutations run through a grid so the list is refetched and an alert raised.
fn run_mutation<R, F>(cli: &Cli, app: &App, kind: MutationKind, op: F) -> Result<(), CliError>
where
    R: Resource,
    F: FnOnce(&ResourceService<R>) -> labdesk::core::errors::Result<Option<R>>,
{
    let service = ResourceService::<R>::new(app.client.clone());
    let mut grid = open_grid::<R>(app)?;
    let outcome = grid.mutate(kind, || op(&service));
    if outcome.is_ok() {
        settle(app, &grid)?;
    }
    let alerts = app.alerts.drain();
    match output_mode(cli) {
        OutputMode::Human => {
            for alert in &alerts {
                if !(cli.quiet && alert.level != AlertLevel::Error) {
                    println!("{}", alert_line(alert));
                }
            }
            if let Ok(Some(item)) = &outcome {
                if cli.verbose {
                    for (header, cell) in R::columns().iter().zip(item.cells()) {
                        println!("  {:<14} {cell}", header.to_lowercase());
                    }
                }
            }
        }
        OutputMode::Json => {
            let item = match &outcome {
                Ok(Some(item)) => serde_json::to_value(item)?,
                _ => Value::Null,
            };
            write_json_line(&json!({
                "command": kind.as_str(),
                "resource": R::NAME,
                "ok": outcome.is_ok(),
                "item": item,
                "totalElements": grid.total_rows(),
                "alerts": serde_json::to_value(&alerts)?,
            }))?;
        }
    }
    outcome.map(|_| ()).map_err(CliError::from)
}

fn open_grid<R: Resource>(app: &App) -> Result<GridBinding<R>, CliError> {
    let service = ResourceService::<R>::new(app.client.clone());
    let options = grid_options::<R>(&app.config, Arc::clone(&app.alerts), &app.client)?;
    Ok(service.grid(options)?)
}

fn settle<R: Resource>(app: &App, grid: &GridBinding<R>) -> Result<(), CliError> {
    if !grid.wait_settled(app.settle_timeout()) {
        return Err(CliError::Runtime(format!(
            "timed out waiting for {} list",
            R::NAME
        )));
    }
    match grid.fetcher().status() {
        FetchStatus::Failure(message) => Err(CliError::Runtime(message)),
        _ => Ok(()),
    }
}

fn run_pick<R: Resource>(cli: &Cli, app: &App, args: &PickArgs) -> Result<(), CliError> {
    let picker = ResourceService::<R>::new(app.client.clone()).picker(&app.config)?;
    let timeout = app.settle_timeout();
    let wait = |picker: &labdesk::query::selection::RemotePicker<R>| {
        if picker.wait_settled(timeout) {
            Ok(())
        } else {
            Err(CliError::Runtime(format!("timed out loading {} picker", R::NAME)))
        }
    };

    picker.open();
    wait(&picker)?;
    if let Some(keyword) = &args.search {
        picker.search(keyword);
        wait(&picker)?;
    }
    for _ in 1..args.pages.max(1) {
        if !picker.load_more() {
            break;
        }
        wait(&picker)?;
    }
    if let Some(id) = args.select {
        if !picker.select(id) {
            return Err(CliError::User(format!(
                "{} {id} is not among the loaded results",
                R::NAME
            )));
        }
    }

    let state = picker.snapshot();
    if let Some(error) = state.last_error() {
        return Err(CliError::Runtime(error.to_string()));
    }
    match output_mode(cli) {
        OutputMode::Human => {
            let cells: Vec<Vec<String>> = state.items().iter().map(R::cells).collect();
            if cells.is_empty() {
                println!("{}", app.catalog.text(MessageKey::NoRows));
            } else {
                print!("{}", table::render(R::columns(), &cells, terminal_width()));
            }
            let loaded = app.catalog.loaded_of(state.len(), state.total());
            if state.has_more() {
                println!("{loaded} ({})", app.catalog.text(MessageKey::MoreAvailable));
            } else {
                println!("{loaded}");
            }
            if let Some(id) = state.selected() {
                println!("{}: {id}", app.catalog.text(MessageKey::Selected));
            }
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "pick",
                "resource": R::NAME,
                "keyword": state.keyword(),
                "loaded": state.len(),
                "total": state.total(),
                "hasMore": state.has_more(),
                "selected": state.selected(),
                "items": serde_json::to_value(state.items())?,
            }))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Dashboard and media
// ---------------------------------------------------------------------------

fn run_dashboard(cli: &Cli, app: &App, args: &DashboardArgs) -> Result<(), CliError> {
    let (from, to) = match (args.from, args.to) {
        (Some(from), Some(to)) => (from, to),
        _ => {
            let to = Local::now().date_naive();
            let from = to
                .checked_sub_days(Days::new(args.days.max(1) - 1))
                .ok_or_else(|| CliError::User(format!("--days {} is out of range", args.days)))?;
            (from, to)
        }
    };
    let summary = DashboardService::new(app.client.clone()).summary(from, to)?;

    match output_mode(cli) {
        OutputMode::Human => {
            let catalog = &app.catalog;
            println!("{}: {}", catalog.text(MessageKey::Assets), summary.total_assets);
            for (status, count) in &summary.assets_by_status {
                if *count > 0 {
                    println!("  {status:<14} {count}");
                }
            }
            println!("{}", catalog.borrowings(summary.active_borrowings, summary.overdue_borrowings));
            println!("{}: {}", catalog.text(MessageKey::OpenMaintenance), summary.open_maintenance);
            println!();
            println!("{} {from} .. {to}:", catalog.text(MessageKey::LabUsage));
            let peak = summary.usage.peak().map_or(0, |day| day.sessions);
            for day in &summary.usage.days {
                print_usage_bar(day.date, day.sessions, peak);
            }
            if !summary.usage.by_room.is_empty() {
                println!();
                println!("{}:", catalog.text(MessageKey::ByRoom));
                for (room, sessions) in &summary.usage.by_room {
                    println!("  {room:<20} {sessions}");
                }
            }
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "dashboard",
                "summary": serde_json::to_value(&summary)?,
            }))?;
        }
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn print_usage_bar(date: NaiveDate, sessions: u64, peak: u64) {
    let bar_width = 30;
    let filled = if peak == 0 {
        0
    } else {
        ((sessions as f64 / peak as f64) * bar_width as f64).round() as usize
    };
    let bar: String = "#".repeat(filled.min(bar_width));
    println!("  {date} {sessions:>4} |{bar:<bar_width$}|");
}

fn run_upload(cli: &Cli, args: &UploadArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let catalog = Catalog::new(Locale::resolve(&config.ui.locale));
    let uploader = MediaUploader::new(
        &config.media,
        config.api.timeout_ms.map(Duration::from_millis),
    )?;
    let url = uploader.upload_file(&args.path)?;
    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                println!("{}", catalog.text(MessageKey::UploadSucceeded));
            }
            println!("{url}");
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "upload",
                "path": args.path.to_string_lossy(),
                "url": url,
            }))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

fn parse_window_duration(s: &str) -> Result<Duration, CliError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(CliError::User("empty window string".to_string()));
    }
    let (digits, suffix) = s.split_at(s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len()));
    let n: u64 = digits
        .parse()
        .map_err(|_| CliError::User(format!("invalid window value: {s}")))?;
    let multiplier = match suffix {
        "s" | "sec" => 1,
        "m" | "min" => 60,
        "h" | "hr" => 3600,
        "d" | "day" => 86400,
        "" => 60, // bare number defaults to minutes
        _ => return Err(CliError::User(format!("unknown window suffix: {suffix}"))),
    };
    let secs = n
        .checked_mul(multiplier)
        .ok_or_else(|| CliError::User(format!("window too large: {s}")))?;
    Ok(Duration::from_secs(secs))
}

#[cfg(feature = "sqlite")]
fn run_stats(cli: &Cli, args: &StatsArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;

    if !config.paths.sqlite_db.exists() {
        match output_mode(cli) {
            OutputMode::Human => {
                println!(
                    "No activity database found at {}.",
                    config.paths.sqlite_db.display()
                );
                println!("  Run any networked command to start collecting statistics.");
            }
            OutputMode::Json => {
                write_json_line(&json!({
                    "command": "stats",
                    "error": "no_database",
                    "db_path": config.paths.sqlite_db.to_string_lossy(),
                }))?;
            }
        }
        return Ok(());
    }

    let db = SqliteLogger::open_read_only(&config.paths.sqlite_db)?;
    let engine = StatsEngine::new(&db);
    let specific_window = args
        .window
        .as_deref()
        .map(parse_window_duration)
        .transpose()?;
    let windows = match specific_window {
        Some(window) => vec![engine.window_stats(window)?],
        None => engine.summary()?,
    };
    let top_window = specific_window.unwrap_or(Duration::from_secs(24 * 3600));
    let top = if args.top > 0 {
        engine.top_endpoints(args.top, top_window)?
    } else {
        Vec::new()
    };

    match output_mode(cli) {
        OutputMode::Human => {
            for ws in &windows {
                println!("── {} ──", window_label(ws.window));
                print_window_stats_human(ws);
                println!();
            }
            if args.top > 0 {
                println!("Top {} endpoints (last {}):", args.top, window_label(top_window));
                if top.is_empty() {
                    println!("  (none)");
                } else {
                    println!("  {:<32}  {:>6}  {:>8}  {:>8}", "Endpoint", "Count", "Failures", "Mean ms");
                    println!("  {}", "-".repeat(60));
                    for e in &top {
                        println!(
                            "  {:<32}  {:>6}  {:>8}  {:>8.1}",
                            table::truncate(&e.endpoint, 32),
                            e.count,
                            e.failures,
                            e.mean_ms
                        );
                    }
                }
            }
        }
        OutputMode::Json => {
            let mut payload = if specific_window.is_some() {
                json!({"windows": serde_json::to_value(&windows)?})
            } else {
                engine.export_json()?
            };
            if let Some(obj) = payload.as_object_mut() {
                obj.insert("command".to_string(), json!("stats"));
                if args.top > 0 {
                    obj.insert("top_endpoints".to_string(), serde_json::to_value(&top)?);
                }
            }
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
fn print_window_stats_human(ws: &WindowStats) {
    println!("  Requests:");
    println!("    Total:       {}", ws.requests.total);
    println!(
        "    Failures:    {} ({:.1}%)",
        ws.requests.failures,
        ws.requests.failure_rate() * 100.0
    );
    if ws.requests.transport_failures > 0 {
        println!("    No response: {}", ws.requests.transport_failures);
    }
    if ws.requests.total > 0 {
        println!("    Mean:        {:.1} ms", ws.requests.mean_ms);
        println!("    Slowest:     {} ms", ws.requests.max_ms);
    }
    println!("  Mutations:");
    println!("    Succeeded:   {}", ws.mutations.succeeded);
    println!("    Failed:      {}", ws.mutations.failed);
    println!("    Stale pages: {}", ws.mutations.discarded_responses);
}

// ---------------------------------------------------------------------------
// Config and version
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    write_json_line(&json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    }))?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    write_json_line(&json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    }))?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        write_json_line(&json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        }))?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("Configuration is INVALID: {e}");
                    }
                    OutputMode::Json => {
                        write_json_line(&json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                        }))?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");
    let git_sha = option_env!("GIT_SHA").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("labdesk {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
                println!("git_sha: {git_sha}");
                println!("features: {}", enabled_features().join(","));
            }
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "binary": "labdesk",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                    "git_sha": git_sha,
                    "features": enabled_features(),
                }
            }))?;
        }
    }
    Ok(())
}

fn enabled_features() -> Vec<&'static str> {
    let mut features = vec!["cli"];
    if cfg!(feature = "sqlite") {
        features.push("sqlite");
    }
    features
}

// ---------------------------------------------------------------------------
// Argument parsing and output helpers
// ---------------------------------------------------------------------------

fn parse_resource(raw: &str) -> Result<ResourceKind, CliError> {
    ResourceKind::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = ResourceKind::ALL.iter().map(|k| k.name()).collect();
        CliError::User(format!(
            "unknown resource `{raw}` (expected one of: {})",
            known.join(", ")
        ))
    })
}

/// `status=AVAILABLE` pairs grouped by name; repeated names collect values.
fn parse_filters(raw: &[String]) -> Result<BTreeMap<String, Vec<FilterValue>>, CliError> {
    let mut filters: BTreeMap<String, Vec<FilterValue>> = BTreeMap::new();
    for pair in raw {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(CliError::User(format!("filter `{pair}` is not NAME=VALUE")));
        };
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() || value.is_empty() {
            return Err(CliError::User(format!("filter `{pair}` is not NAME=VALUE")));
        }
        filters
            .entry(name.to_string())
            .or_default()
            .push(FilterValue::parse(value));
    }
    Ok(filters)
}

fn parse_sort(raw: &str) -> Result<SortSpec, CliError> {
    let (field, direction) = match raw.split_once(':') {
        Some((field, dir)) => (
            field.trim(),
            SortDirection::parse(dir)
                .ok_or_else(|| CliError::User(format!("sort direction `{dir}` is not asc or desc")))?,
        ),
        None => (raw.trim(), SortDirection::Asc),
    };
    if field.is_empty() {
        return Err(CliError::User("sort field is empty".to_string()));
    }
    Ok(SortSpec::new(field, direction))
}

/// Inline JSON, or `@path` for a file.
fn read_body(raw: &str) -> Result<Value, CliError> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(Path::new(path))
            .map_err(|e| CliError::User(format!("read {path}: {e}")))?,
        None => raw.to_string(),
    };
    let body: Value = serde_json::from_str(&text)
        .map_err(|e| CliError::User(format!("request body is not valid JSON: {e}")))?;
    if body.is_object() {
        Ok(body)
    } else {
        Err(CliError::User("request body must be a JSON object".to_string()))
    }
}

fn emit_message(cli: &Cli, command: &str, message: &str, extra: Value) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                println!("{}", message.green());
            }
        }
        OutputMode::Json => {
            let mut payload = json!({"command": command, "message": message});
            if let (Some(obj), Value::Object(fields)) = (payload.as_object_mut(), extra) {
                obj.extend(fields);
            }
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

/// Prefer the backend's own wording; fall back to the local message.
fn emit_reply(
    cli: &Cli,
    app: &App,
    command: &str,
    reply: Option<String>,
    fallback: MessageKey,
) -> Result<(), CliError> {
    let message = reply.unwrap_or_else(|| app.catalog.text(fallback).to_string());
    emit_message(cli, command, &message, json!({}))
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("LABDESK_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        Some(_) | None => fallback,
    }
}
