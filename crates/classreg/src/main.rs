use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use log::LevelFilter;
use tracing::{debug, info, warn};

use classreg::account::AccountClient;
use classreg::auth::{AuthService, LoginOutcome, SessionHandle};
use classreg::config::{APP_NAME, AppConfig, default_config_path, load as load_config, write_default};
use classreg::reference::ReferenceClient;
use classreg::registration::{
    BasicInfoForm, CancelReason, CancelSignalHub, CompleteOutcome, RegistrationWizard, RoleDetail,
    RoleDetailsForm, SubmitOutcome, WizardError,
};
use classreg::roledetail::RoleDetailClient;
use classreg_protocol::account::AccountRole;
use classreg_protocol::roles::{ParentLink, StudentRecord, TeacherAssignment};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("using config file: {}", ctx.config_path.display());

    match cli.command {
        Command::Register(cmd) => async_register(ctx, cmd),
        Command::Login(cmd) => async_login(ctx, cmd),
        Command::Reference { command } => async_reference(ctx, command),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[tokio::main]
async fn async_register(ctx: RuntimeContext, cmd: RegisterCommand) -> Result<()> {
    handle_register(&ctx, cmd).await
}

#[tokio::main]
async fn async_login(ctx: RuntimeContext, cmd: LoginCommand) -> Result<()> {
    handle_login(&ctx, cmd).await
}

#[tokio::main]
async fn async_reference(ctx: RuntimeContext, cmd: ReferenceCommand) -> Result<()> {
    handle_reference(&ctx, cmd).await
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Classreg - registration client for the school management platform.",
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
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a new account on the platform
    Register(RegisterCommand),
    /// Log in and resolve the session's permissions
    Login(LoginCommand),
    /// Browse reference data (grades, classes, subjects)
    Reference {
        #[command(subcommand)]
        command: ReferenceCommand,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct RegisterCommand {
    /// Full name
    #[arg(long)]
    name: String,
    /// Email address
    #[arg(long)]
    email: String,
    /// Postal address
    #[arg(long)]
    address: String,
    /// Birth date (YYYY-MM-DD)
    #[arg(long)]
    birth_date: String,
    /// Contact number
    #[arg(long)]
    contact: String,
    /// Account role (teacher, student, parent)
    #[arg(long)]
    role: AccountRole,
    /// Username (3-20 characters)
    #[arg(long)]
    username: String,
    /// Password (at least 6 characters)
    #[arg(long)]
    password: String,
    /// Password confirmation; defaults to the password
    #[arg(long)]
    password_confirmation: Option<String>,
    /// Gender
    #[arg(long, default_value = "unspecified")]
    gender: String,
    /// Staff number (teacher role)
    #[arg(long)]
    staff_no: Option<String>,
    /// Teaching assignment as GRADE:CLASS:SUBJECT:MEDIUM (repeatable)
    #[arg(long = "assignment", value_name = "GRADE:CLASS:SUBJECT:MEDIUM")]
    assignments: Vec<String>,
    /// Child link as ADMISSION:PROFESSION:RELATION:CONTACT (repeatable)
    #[arg(long = "child-link", value_name = "ADMISSION:PROFESSION:RELATION:CONTACT")]
    child_links: Vec<String>,
    /// Admission number (student role)
    #[arg(long)]
    admission_no: Option<String>,
    /// Grade (student role)
    #[arg(long)]
    student_grade: Option<String>,
    /// Class (student role)
    #[arg(long)]
    student_class: Option<String>,
    /// Medium (student role)
    #[arg(long)]
    student_medium: Option<String>,
    /// Guardian contact number (student role)
    #[arg(long)]
    guardian_contact: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct LoginCommand {
    /// Username
    #[arg(long)]
    username: String,
    /// Password
    #[arg(long)]
    password: String,
}

#[derive(Debug, Subcommand)]
enum ReferenceCommand {
    /// List grade levels
    Grades,
    /// List classes
    Classes,
    /// List subject offerings
    Subjects,
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

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_path: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_path = match common.config.clone() {
            Some(path) => path,
            None => default_config_path()?,
        };
        let config = load_config(Some(&config_path))?;
        Ok(Self {
            common,
            config_path,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = if self.common.trace {
            "trace"
        } else if self.common.verbose >= 1 {
            "debug"
        } else {
            self.config.logging.level.as_str()
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("classreg={level}")));

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .ok();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(io::stderr().is_terminal())
                        .with_target(false),
                )
                .try_init()
                .ok();
        }

        Ok(())
    }

    fn account_client(&self, session: &SessionHandle) -> AccountClient {
        AccountClient::with_timeouts(
            self.config.backend.base_url.clone(),
            session.clone(),
            self.config.backend.request_timeout(),
            self.config.backend.compensation_timeout(),
        )
    }
}

async fn handle_register(ctx: &RuntimeContext, cmd: RegisterCommand) -> Result<()> {
    let session = SessionHandle::new();
    let account = Arc::new(ctx.account_client(&session));
    let role_details = Arc::new(RoleDetailClient::with_timeout(
        ctx.config.backend.base_url.clone(),
        session.clone(),
        ctx.config.backend.request_timeout(),
    ));

    let wizard = RegistrationWizard::new(account, role_details, CancelSignalHub::new());

    // Ctrl-C while a half-registered account exists behaves like closing the
    // window: the hub only has a listener during that phase.
    let hub = wizard.signals().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            hub.emit(CancelReason::WindowClosed);
        }
    });

    let username = cmd.username.clone();
    let form = BasicInfoForm {
        name: cmd.name.clone(),
        email: cmd.email.clone(),
        address: cmd.address.clone(),
        birth_date: cmd.birth_date.clone(),
        contact: cmd.contact.clone(),
        role: cmd.role,
        username: cmd.username.clone(),
        password: cmd.password.clone(),
        password_confirmation: cmd
            .password_confirmation
            .clone()
            .unwrap_or_else(|| cmd.password.clone()),
        gender: cmd.gender.clone(),
    };

    match wizard.submit_basic_info(form).await {
        Ok(SubmitOutcome::Advanced) => {
            info!(username = %username, "account created, collecting role details");
        }
        Ok(SubmitOutcome::AlreadySubmitting) => bail!("another submission is already in flight"),
        Err(err) => return Err(registration_failure(err)),
    }

    let details = match cmd.role {
        AccountRole::Teacher => {
            for raw in &cmd.assignments {
                let detail = parse_assignment(raw)?;
                stage_or_abort(&wizard, detail).await?;
            }
            RoleDetailsForm::Teacher {
                staff_no: cmd
                    .staff_no
                    .clone()
                    .context("--staff-no is required for teacher registration")?,
            }
        }
        AccountRole::Parent => {
            for raw in &cmd.child_links {
                let detail = parse_child_link(raw)?;
                stage_or_abort(&wizard, detail).await?;
            }
            RoleDetailsForm::Parent
        }
        AccountRole::Student => RoleDetailsForm::Student {
            record: StudentRecord {
                admission_no: cmd
                    .admission_no
                    .clone()
                    .context("--admission-no is required for student registration")?,
                grade: cmd
                    .student_grade
                    .clone()
                    .context("--student-grade is required for student registration")?,
                class: cmd
                    .student_class
                    .clone()
                    .context("--student-class is required for student registration")?,
                medium: cmd
                    .student_medium
                    .clone()
                    .context("--student-medium is required for student registration")?,
                guardian_contact: cmd
                    .guardian_contact
                    .clone()
                    .context("--guardian-contact is required for student registration")?,
            },
        },
    };

    match wizard.submit_role_details(details).await {
        Ok(CompleteOutcome::Completed) => {
            println!("Registration complete. You can now log in as '{username}'.");
            Ok(())
        }
        Ok(CompleteOutcome::AlreadySubmitting) => bail!("another submission is already in flight"),
        Err(err) => {
            // One-shot run: nothing to retry interactively, so abandon the
            // half-registered account instead of leaving it behind.
            warn!(error = %err, "role-detail submission failed, abandoning registration");
            wizard.cancel(CancelReason::UserAction).await;
            Err(registration_failure(err))
        }
    }
}

/// Stage an entry; on rejection abandon the half-registered account first.
async fn stage_or_abort(wizard: &Arc<RegistrationWizard>, detail: RoleDetail) -> Result<()> {
    if let Err(err) = wizard.stage_assignment(detail) {
        wizard.cancel(CancelReason::UserAction).await;
        return Err(registration_failure(err));
    }
    Ok(())
}

/// Render a wizard error, expanding field-level errors onto their own lines.
fn registration_failure(err: WizardError) -> anyhow::Error {
    if let Some(fields) = err.field_errors() {
        let mut rendered = String::from("the backend rejected the form:");
        for (field, message) in &fields.0 {
            rendered.push_str(&format!("\n  {field}: {message}"));
        }
        anyhow::anyhow!(rendered)
    } else {
        anyhow::anyhow!(err)
    }
}

fn parse_assignment(raw: &str) -> Result<RoleDetail> {
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 4 {
        bail!("invalid assignment '{raw}': expected GRADE:CLASS:SUBJECT:MEDIUM");
    }
    Ok(RoleDetail::Teacher(TeacherAssignment {
        grade: parts[0].to_string(),
        class: parts[1].to_string(),
        subject: parts[2].to_string(),
        medium: parts[3].to_string(),
    }))
}

fn parse_child_link(raw: &str) -> Result<RoleDetail> {
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 4 {
        bail!("invalid child link '{raw}': expected ADMISSION:PROFESSION:RELATION:CONTACT");
    }
    Ok(RoleDetail::ParentLink(ParentLink {
        student_admission_no: parts[0].to_string(),
        profession: parts[1].to_string(),
        relation: parts[2].to_string(),
        contact: parts[3].to_string(),
    }))
}

async fn handle_login(ctx: &RuntimeContext, cmd: LoginCommand) -> Result<()> {
    let session = SessionHandle::new();
    let account = Arc::new(ctx.account_client(&session));
    let auth = AuthService::new(account, session)
        .with_retry_delay(ctx.config.auth.permission_retry_delay());

    match auth.login(&cmd.username, &cmd.password).await? {
        LoginOutcome::Authorized(context) => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "accountId": context.account_id,
                        "role": context.role,
                        "permissions": context.permissions,
                    })
                );
            } else {
                println!(
                    "Logged in as {} ({}) with {} permission(s).",
                    context.account_id,
                    context.role,
                    context.permissions.len()
                );
            }
            Ok(())
        }
        LoginOutcome::Unauthorized => {
            bail!("no permissions could be resolved for this account")
        }
    }
}

async fn handle_reference(ctx: &RuntimeContext, cmd: ReferenceCommand) -> Result<()> {
    let client = ReferenceClient::new(ctx.config.backend.base_url.clone(), SessionHandle::new());

    match cmd {
        ReferenceCommand::Grades => {
            let grades = client.list_grades().await?;
            if ctx.common.json {
                println!("{}", serde_json::to_string_pretty(&grades)?);
            } else {
                for grade in grades {
                    println!("{}", grade.grade);
                }
            }
        }
        ReferenceCommand::Classes => {
            let classes = client.list_classes().await?;
            if ctx.common.json {
                println!("{}", serde_json::to_string_pretty(&classes)?);
            } else {
                for class in classes {
                    println!("{}", class.class);
                }
            }
        }
        ReferenceCommand::Subjects => {
            let subjects = client.list_subjects().await?;
            if ctx.common.json {
                println!("{}", serde_json::to_string_pretty(&subjects)?);
            } else {
                for subject in subjects {
                    match &subject.sub_subject {
                        Some(sub) => println!(
                            "{} / {} ({}, {})",
                            subject.main_subject, sub, subject.medium, subject.grade
                        ),
                        None => println!(
                            "{} ({}, {})",
                            subject.main_subject, subject.medium, subject.grade
                        ),
                    }
                }
            }
        }
    }

    Ok(())
}

fn handle_config(ctx: &RuntimeContext, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            println!("{}", toml::to_string_pretty(&ctx.config)?);
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.config_path.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            write_default(&ctx.config_path)?;
            println!("Wrote default configuration to {}", ctx.config_path.display());
            Ok(())
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    clap_complete::generate(shell, &mut Cli::command(), APP_NAME, &mut io::stdout());
    Ok(())
}
