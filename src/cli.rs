use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::api::ApiClient;
use crate::config::Config;
use crate::context::AppContext;
use crate::gate::{GateView, PermissionGate, ACCESS_DENIED_MESSAGE, ACCESS_DENIED_TITLE};
use crate::models::{LocationInput, Role};
use crate::permissions::{PermissionScope, PermissionSet};
use crate::session::{WorkspaceRef, WorkspaceType};

#[derive(Parser)]
#[command(name = "eventma")]
#[command(about = "Sign in, pick a workspace and manage EventMA from the terminal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, env = "EVENTMA_API_URL", help = "Override the API base URL")]
    pub api_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    Login {
        #[arg(long, help = "Account email (defaults to the remembered one)")]
        email: Option<String>,

        #[arg(long, help = "Remember this email for the next sign-in")]
        remember: bool,
    },

    Register {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,
    },

    Verify {
        #[arg(long)]
        email: String,

        #[arg(long, help = "Verification code received by email")]
        otp: String,
    },

    ResendOtp {
        #[arg(long)]
        email: String,
    },

    ChangePassword,

    Logout,

    /// Show the session state and where the app would navigate
    Status {
        #[arg(long, default_value = "/", help = "Path the app is currently on")]
        path: String,
    },

    Refresh,

    Workspace {
        #[command(subcommand)]
        action: WorkspaceAction,
    },

    Permissions {
        #[command(subcommand)]
        action: PermissionsAction,
    },

    Roles {
        #[command(subcommand)]
        action: Option<RolesAction>,
    },

    Locations {
        #[command(subcommand)]
        action: Option<LocationsAction>,
    },

    TaskTypes,

    Notifications {
        #[command(subcommand)]
        action: Option<NotificationsAction>,
    },

    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum WorkspaceAction {
    Switch {
        #[arg(help = "enterprise or supplier")]
        kind: WorkspaceType,

        id: String,

        #[arg(long, help = "Project to load project-level permissions for")]
        project: Option<String>,
    },
    Current,
}

#[derive(Subcommand)]
pub enum PermissionsAction {
    /// List every permission code the API knows about
    List,
    Show {
        #[arg(long)]
        project: Option<String>,
    },
    Check {
        code: String,

        #[arg(long, default_value = "enterprise")]
        scope: PermissionScope,

        #[arg(long)]
        project: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum RolesAction {
    List,
    /// Rename a role or replace its permission codes
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long = "permission", help = "Permission code (repeat to grant several)")]
        permissions: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum LocationsAction {
    List,
    Create {
        name: String,

        #[arg(long)]
        address: Option<String>,

        #[arg(long)]
        capacity: Option<u32>,
    },
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        address: Option<String>,

        #[arg(long)]
        capacity: Option<u32>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
pub enum NotificationsAction {
    List,
    Read { id: String },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Init,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { action } = &cli.command {
        return match action {
            Some(ConfigAction::Init) => crate::config::init_config().await,
            Some(ConfigAction::Show) | None => crate::config::show_config().await,
        };
    }

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }

    let (mut ctx, api) =
        AppContext::from_config(&config).context("Failed to open local session storage")?;

    match cli.command {
        Commands::Login { email, remember } => login(&mut ctx, email, remember).await,
        Commands::Register { name, email } => {
            let password = prompt_new_password()?;
            crate::auth::register(&ctx, &name, &email, &password).await?;
            Ok(())
        }
        Commands::Verify { email, otp } => {
            crate::auth::verify(&ctx, &email, &otp).await?;
            Ok(())
        }
        Commands::ResendOtp { email } => {
            crate::auth::resend_otp(&ctx, &email).await?;
            Ok(())
        }
        Commands::ChangePassword => {
            let current = dialoguer::Password::new()
                .with_prompt("Current password")
                .interact()?;
            let new = prompt_new_password()?;
            crate::auth::change_password(&mut ctx, &current, &new).await?;
            Ok(())
        }
        Commands::Logout => {
            crate::auth::logout(&mut ctx).await?;
            println!("✓ Signed out");
            Ok(())
        }
        Commands::Status { path } => status(&mut ctx, &path),
        Commands::Refresh => {
            crate::auth::refresh(&mut ctx).await?;
            println!("✓ Session refreshed");
            Ok(())
        }
        Commands::Workspace { action } => match action {
            WorkspaceAction::Switch { kind, id, project } => {
                let workspace = WorkspaceRef::new(id, kind);
                let permissions = ctx
                    .switcher()
                    .switch(&workspace, project.as_deref())
                    .await?;
                print_permissions(&permissions);
                println!("  Dashboard: {}", workspace.dashboard_path());
                Ok(())
            }
            WorkspaceAction::Current => {
                match ctx.store.workspace() {
                    Some(workspace) => {
                        println!("{} workspace {}", workspace.kind, workspace.id);
                    }
                    None => println!("No workspace selected."),
                }
                Ok(())
            }
        },
        Commands::Permissions { action } => match action {
            PermissionsAction::List => permission_catalog(&mut ctx, &api).await,
            PermissionsAction::Show { project } => {
                let permissions = load_permissions(&ctx, project.as_deref()).await?;
                print_permissions(&permissions);
                Ok(())
            }
            PermissionsAction::Check {
                code,
                scope,
                project,
            } => {
                load_permissions(&ctx, project.as_deref()).await?;
                match PermissionGate::new(code.clone(), scope).check(&ctx.permissions) {
                    GateView::Children => println!("✓ '{}' granted at {} scope", code, scope),
                    GateView::Loading => println!("Permissions are still loading..."),
                    GateView::AccessDenied => print_access_denied(),
                }
                Ok(())
            }
        },
        Commands::Roles { action } => roles(&mut ctx, &api, action).await,
        Commands::Locations { action } => locations(&mut ctx, &api, action).await,
        Commands::TaskTypes => task_types(&mut ctx, &api).await,
        Commands::Notifications { action } => notifications(&mut ctx, &api, action).await,
        Commands::Config { .. } => Ok(()),
    }
}

async fn login(ctx: &mut AppContext, email: Option<String>, remember: bool) -> Result<()> {
    let email = match email.or_else(|| ctx.store.remembered_email()) {
        Some(email) => email,
        None => dialoguer::Input::<String>::new()
            .with_prompt("Email")
            .interact_text()?,
    };

    let password = dialoguer::Password::new()
        .with_prompt("Password")
        .interact()?;

    let user = crate::auth::login(ctx, &email, &password, remember).await?;
    println!("✓ Signed in as {} <{}>", user.name, user.email);

    let decision = ctx.check(crate::controller::SIGN_IN_PATH);
    if let Some(route) = decision.redirect {
        println!("  Next: {}", route);
    }

    Ok(())
}

fn prompt_new_password() -> Result<String> {
    Ok(dialoguer::Password::new()
        .with_prompt("New password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()?)
}

fn status(ctx: &mut AppContext, path: &str) -> Result<()> {
    let decision = ctx.check(path);
    let session = ctx.store.snapshot();

    println!("State: {:?}", decision.state);
    if !session.has_credentials() {
        println!("No stored credentials.");
    }
    if let Some(user) = &session.user {
        println!("User: {} <{}>", user.name, user.email);
    }
    if let Some(workspace) = &session.workspace {
        println!("Workspace: {} {}", workspace.kind, workspace.id);
    }
    match decision.redirect {
        Some(route) => println!("Redirect: {}", route),
        None => println!("Redirect: none (staying on {})", path),
    }

    Ok(())
}

async fn load_permissions(ctx: &AppContext, project: Option<&str>) -> Result<PermissionSet> {
    let user = ctx
        .store
        .user()
        .context("Not signed in. Run 'eventma login' first.")?;
    if ctx.store.workspace().is_none() {
        anyhow::bail!("No workspace selected. Run 'eventma workspace switch <kind> <id>' first.");
    }

    Ok(ctx.permissions.fetch_permissions(&user.id, project).await)
}

fn print_permissions(permissions: &PermissionSet) {
    if permissions.is_owner {
        println!("Owner: all permissions granted");
    }

    let mut enterprise: Vec<_> = permissions.enterprise.iter().collect();
    enterprise.sort();
    let mut project: Vec<_> = permissions.project.iter().collect();
    project.sort();

    println!("Enterprise permissions ({}):", enterprise.len());
    for code in enterprise {
        println!("  {}", code);
    }
    println!("Project permissions ({}):", project.len());
    for code in project {
        println!("  {}", code);
    }
}

fn print_access_denied() {
    println!("⛔ {}", ACCESS_DENIED_TITLE);
    println!("   {}", ACCESS_DENIED_MESSAGE);
}

async fn permission_catalog(ctx: &mut AppContext, api: &ApiClient) -> Result<()> {
    let result = api.list_permissions().await;
    let mut permissions = ctx.intercept(result)?;

    if permissions.is_empty() {
        println!("No permissions defined.");
        return Ok(());
    }

    permissions.sort_by(|a, b| a.code.cmp(&b.code));
    println!("Permissions:");
    for permission in permissions {
        match permission.scope {
            Some(scope) => println!("  {} - {} [{}]", permission.code, permission.name, scope),
            None => println!("  {} - {}", permission.code, permission.name),
        }
    }

    Ok(())
}

async fn roles(ctx: &mut AppContext, api: &ApiClient, action: Option<RolesAction>) -> Result<()> {
    let result = api.list_roles().await;
    let roles = ctx.intercept(result)?;

    match action.unwrap_or(RolesAction::List) {
        RolesAction::List => {
            if roles.is_empty() {
                println!("No roles found.");
                return Ok(());
            }

            println!("Roles:");
            for role in roles {
                println!(
                    "  {} - {} ({} permissions)",
                    role.id,
                    role.name,
                    role.permissions.len()
                );
            }
        }
        RolesAction::Update {
            id,
            name,
            permissions,
        } => {
            let current = roles
                .into_iter()
                .find(|role| role.id == id)
                .with_context(|| format!("Role '{}' not found", id))?;
            let role = Role {
                name: name.unwrap_or(current.name),
                permissions: if permissions.is_empty() {
                    current.permissions
                } else {
                    permissions
                },
                id: current.id,
            };

            let result = api.update_role(&role).await;
            let updated = ctx.intercept(result)?;
            println!(
                "✓ Updated role: {} ({} permissions)",
                updated.name,
                updated.permissions.len()
            );
        }
    }

    Ok(())
}

async fn locations(
    ctx: &mut AppContext,
    api: &ApiClient,
    action: Option<LocationsAction>,
) -> Result<()> {
    match action.unwrap_or(LocationsAction::List) {
        LocationsAction::List => {
            let result = api.list_locations().await;
            let locations = ctx.intercept(result)?;

            if locations.is_empty() {
                println!("No locations found.");
                println!("Create one with: eventma locations create <name>");
                return Ok(());
            }

            println!("Locations:");
            for location in locations {
                println!(
                    "  {} - {} {}",
                    location.id,
                    location.name,
                    location.address.unwrap_or_default()
                );
            }
        }
        LocationsAction::Create {
            name,
            address,
            capacity,
        } => {
            let input = LocationInput {
                name,
                address,
                capacity,
            };
            let result = api.create_location(&input).await;
            let location = ctx.intercept(result)?;
            println!("✓ Created location: {} ({})", location.name, location.id);
        }
        LocationsAction::Update {
            id,
            name,
            address,
            capacity,
        } => {
            let result = api.list_locations().await;
            let current = ctx
                .intercept(result)?
                .into_iter()
                .find(|location| location.id == id)
                .with_context(|| format!("Location '{}' not found", id))?;
            let input = LocationInput {
                name: name.unwrap_or(current.name),
                address: address.or(current.address),
                capacity: capacity.or(current.capacity),
            };

            let result = api.update_location(&id, &input).await;
            let location = ctx.intercept(result)?;
            println!("✓ Updated location: {} ({})", location.name, location.id);
        }
        LocationsAction::Delete { id } => {
            let result = api.delete_location(&id).await;
            ctx.intercept(result)?;
            println!("✓ Deleted location {}", id);
        }
    }

    Ok(())
}

async fn task_types(ctx: &mut AppContext, api: &ApiClient) -> Result<()> {
    let result = api.list_task_types().await;
    let task_types = ctx.intercept(result)?;

    if task_types.is_empty() {
        println!("No task types found.");
        return Ok(());
    }

    println!("Task types:");
    for task_type in task_types {
        match task_type.category {
            Some(category) => println!("  {} - {} [{}]", task_type.id, task_type.name, category),
            None => println!("  {} - {}", task_type.id, task_type.name),
        }
    }

    Ok(())
}

async fn notifications(
    ctx: &mut AppContext,
    api: &ApiClient,
    action: Option<NotificationsAction>,
) -> Result<()> {
    match action.unwrap_or(NotificationsAction::List) {
        NotificationsAction::List => {
            let result = api.list_notifications().await;
            let notifications = ctx.intercept(result)?;

            if notifications.is_empty() {
                println!("No notifications.");
                return Ok(());
            }

            for notification in notifications {
                let marker = if notification.read { " " } else { "•" };
                println!(
                    "{} {} [{}] {}",
                    marker,
                    notification.id,
                    notification.created_at.format("%Y-%m-%d %H:%M"),
                    notification.title
                );
            }
        }
        NotificationsAction::Read { id } => {
            let result = api.mark_notification_read(&id).await;
            ctx.intercept(result)?;
            println!("✓ Marked {} as read", id);
        }
    }

    Ok(())
}
