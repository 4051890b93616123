//! perimeter_admin - account, detector config and statistics management

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use zeroize::Zeroizing;

use perimeter_roi::api::{RegisterRequest, UpdatePasswordData, UpdateProfileData};
use perimeter_roi::storage::{shared, SharedStore};
use perimeter_roi::{ApiClient, AuthSession, ClientConfig, SqliteKvStore, StatsStore, User};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE", global = true)]
    ui: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the access token.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "PERIMETER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored token and user.
    Logout,
    /// Create an account.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long, env = "PERIMETER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show the signed-in user.
    Me,
    /// Change username and/or email. Signs in again with the new username.
    Profile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, env = "PERIMETER_PASSWORD", hide_env_values = true)]
        current_password: String,
    },
    /// Change password. Signs out afterwards.
    Password {
        #[arg(long)]
        current_password: String,
        #[arg(long)]
        new_password: String,
    },
    /// Detector settings stored by the service.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Local dashboard statistics.
    Stats {
        #[command(subcommand)]
        action: StatsAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    /// Update fields given as `field=value`.
    Set {
        #[arg(required = true, value_name = "FIELD=VALUE")]
        assignments: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum StatsAction {
    Show,
    Reset,
    /// Statistics reported by the service.
    Backend,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_flag(&args.ui, std::io::stderr().is_terminal());
    let cfg = ClientConfig::load()?;

    let store = {
        let _stage = ui.stage("Open local store");
        shared(SqliteKvStore::open(&cfg.db_path)?)
    };
    let api = ApiClient::new(&cfg.api_base_url, store.clone());
    let mut session = AuthSession::restore(store.clone())?;

    match args.command {
        Command::Login { username, password } => {
            let password = Zeroizing::new(password);
            let _stage = ui.stage("Sign in");
            sign_in(&api, &mut session, &username, &password)?;
            println!("signed in as {}", username);
        }
        Command::Logout => {
            session.logout()?;
            println!("signed out");
        }
        Command::Register {
            email,
            username,
            password,
        } => {
            let password = Zeroizing::new(password);
            let user = {
                let _stage = ui.stage("Register");
                api.register(&RegisterRequest {
                    email,
                    username,
                    password: password.to_string(),
                })?
            };
            println!("registered {} <{}>", user.username, user.email);
        }
        Command::Me => {
            session.require_user()?;
            let me = api.current_user()?;
            println!("{}", serde_json::to_string_pretty(&me)?);
        }
        Command::Profile {
            username,
            email,
            current_password,
        } => {
            let current_password = Zeroizing::new(current_password);
            let current = session.require_user()?.clone();
            if username.is_none() && email.is_none() {
                return Err(anyhow!("nothing to update; pass --username or --email"));
            }
            let updated = {
                let _stage = ui.stage("Update profile");
                api.update_profile_info(&UpdateProfileData {
                    username: username.clone(),
                    email,
                    current_password: current_password.to_string(),
                })?
            };
            let _stage = ui.stage("Renew session");
            let username = username.unwrap_or(current.username);
            sign_in(&api, &mut session, &username, &current_password)?;
            println!("profile updated: {} <{}>", updated.username, updated.email);
        }
        Command::Password {
            current_password,
            new_password,
        } => {
            session.require_user()?;
            let data = UpdatePasswordData {
                current_password,
                new_password,
            };
            {
                let _stage = ui.stage("Update password");
                api.update_password(&data)?;
            }
            session.logout()?;
            println!("password changed; sign in again");
        }
        Command::Config { action } => {
            session.require_user()?;
            run_config(&api, &ui, action)?;
        }
        Command::Stats { action } => run_stats(&api, &session, store, action)?,
    }
    Ok(())
}

/// Exchange credentials for a token, then cache the service's view of the
/// user.
fn sign_in(api: &ApiClient, session: &mut AuthSession, username: &str, password: &str) -> Result<()> {
    let token = api.login(username, password)?;
    session.login(
        &token.access_token,
        User {
            username: username.to_string(),
            email: None,
        },
    )?;
    match api.current_user() {
        Ok(me) => {
            session.login(
                &token.access_token,
                User {
                    username: me.username,
                    email: Some(me.email),
                },
            )?;
        }
        Err(err) => log::warn!("signed in but could not load profile: {:#}", err),
    }
    Ok(())
}

fn run_config(api: &ApiClient, ui: &ui::Ui, action: ConfigAction) -> Result<()> {
    let mut config = api.get_config()?;
    match action {
        ConfigAction::Show => {}
        ConfigAction::Set { assignments } => {
            for assignment in &assignments {
                let (field, value) = assignment
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected field=value, got {}", assignment))?;
                config.set_field(field.trim(), value.trim())?;
            }
            let _stage = ui.stage("Save config");
            api.save_config(&config)?;
        }
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn run_stats(
    api: &ApiClient,
    session: &AuthSession,
    store: SharedStore,
    action: StatsAction,
) -> Result<()> {
    let mut stats = StatsStore::new(store);
    match action {
        StatsAction::Show => {
            let snapshot = stats.snapshot()?;
            println!(
                "alarms: {}  detections: {}  video sessions: {}  camera sessions: {}",
                snapshot.total_alarms,
                snapshot.total_detections,
                snapshot.video_sessions,
                snapshot.camera_sessions
            );
            for entry in snapshot.logs.iter().take(20) {
                println!("{}  {:<16} {}", entry.timestamp, entry.kind.as_str(), entry.details);
            }
        }
        StatsAction::Reset => {
            stats.reset()?;
            println!("statistics reset");
        }
        StatsAction::Backend => {
            session.require_user()?;
            let remote = api.backend_stats()?;
            println!("{}", serde_json::to_string_pretty(&remote)?);
        }
    }
    Ok(())
}
