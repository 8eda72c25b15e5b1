//! Carhire CLI - a terminal front-end for the car rental service.
//!
//! Each subcommand plays the part of one screen or button: it mounts the
//! screen through the guard, or dispatches the action, and prints the result.

mod render;

use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use carhire_core::models::{NewCar, NewUser, RentalMode};
use carhire_core::{CarRental, Config, GuardDecision, LoginScreen, Route};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable that supplies passwords non-interactively
const ENV_PASSWORD: &str = "CARHIRE_PASSWORD";

/// Rolling log file name prefix
const LOG_FILE_PREFIX: &str = "carhire.log";

#[derive(Parser, Debug)]
#[command(name = "carhire", version, about = "Car rental client")]
struct Cli {
    /// Backend base URL, overriding the config file
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and remember the session
    Login { username: Option<String> },
    /// End the session
    Logout,
    /// Create a new account
    Signup { username: String },
    /// Show the current session
    Status,
    /// Open a screen (home, explore, cars, profile, dashboard, login)
    Screen { route: Route },
    /// List available cars
    Cars,
    /// Show the logged in user
    Profile,
    /// Create a user (admin)
    AddUser { username: String },
    /// Add a car to the fleet (admin)
    AddCar {
        #[arg(long)]
        brand: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        fuel: String,
        #[arg(long)]
        price: String,
    },
    /// Rent a car
    Rent {
        car_id: String,
        /// pickup or delivery
        mode: RentalMode,
        /// Delivery address
        #[arg(long)]
        address: Option<String>,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, and additionally to a daily rolling file when a log
/// directory is configured. The returned guard flushes the file on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
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

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }

    let _log_guard = init_tracing(config.log_dir.as_deref());
    info!(command = ?cli.command, "carhire starting");

    let app = CarRental::from_config(&config)?;
    app.start().await;

    match cli.command {
        Command::Login { username } => login(&app, &mut config, username).await,
        Command::Logout => {
            app.logout().await?;
            println!("Logged out.");
            Ok(())
        }
        Command::Signup { username } => {
            let password = prompt_password()?;
            render::outcome(app.sign_up(NewUser::new(username, password)).await, |()| {
                println!("Account created. You can now log in.");
            })
        }
        Command::Status => {
            render::session(&app.session(), app.is_admin().await);
            Ok(())
        }
        Command::Screen { route } => screen(&app, route).await,
        Command::Cars => render::outcome(app.list_cars().await, |cars| render::cars(&cars)),
        Command::Profile => render::outcome(app.profile().await, |profile| {
            render::profile(&profile)
        }),
        Command::AddUser { username } => {
            let password = prompt_password()?;
            render::outcome(app.add_user(NewUser::new(username, password)).await, |()| {
                println!("User added.");
            })
        }
        Command::AddCar {
            brand,
            model,
            year,
            fuel,
            price,
        } => {
            let car = NewCar {
                brand,
                model,
                year,
                fuel,
                price_per_day: price,
            };
            render::outcome(app.add_car(car).await, |()| println!("Car added."))
        }
        Command::Rent {
            car_id,
            mode,
            address,
        } => render::outcome(
            app.rent(&car_id, mode, address.as_deref()).await,
            |()| println!("Rental confirmed: {}.", mode.display_name()),
        ),
    }
}

async fn login(app: &CarRental, config: &mut Config, username: Option<String>) -> Result<()> {
    if let LoginScreen::AlreadyLoggedIn { continue_to } = app.login_screen().await {
        println!("You are already logged in. Continue to {}.", continue_to.title());
        return Ok(());
    }

    let username = match username {
        Some(username) => username,
        None => prompt_username(config.last_username.as_deref())?,
    };
    let password = prompt_password()?;

    println!("\nAuthenticating...");
    let outcome = app.login(&username, &password).await;
    if matches!(outcome, Ok(ref o) if o.is_success()) {
        config.last_username = Some(username.trim().to_string());
        config.save()?;
    }
    render::outcome(outcome, |()| println!("Login successful!"))
}

async fn screen(app: &CarRental, route: Route) -> Result<()> {
    match app.mount(route).await {
        GuardDecision::Allow => {}
        decision => return render::refused(decision),
    }

    println!("== {} ==", route.title());
    match route {
        Route::Home | Route::Explore => Ok(()),
        Route::Cars => render::outcome(app.list_cars().await, |cars| render::cars(&cars)),
        Route::Profile => render::outcome(app.profile().await, |profile| {
            render::profile(&profile)
        }),
        Route::Dashboard => {
            println!("Manage the fleet with `carhire add-car` and users with `carhire add-user`.");
            Ok(())
        }
        Route::Login => match app.login_screen().await {
            LoginScreen::AlreadyLoggedIn { continue_to } => {
                println!("You are already logged in. Continue to {}.", continue_to.title());
                Ok(())
            }
            LoginScreen::Form => {
                println!("Run `carhire login`, or `carhire signup` to create an account.");
                Ok(())
            }
        },
    }
}

fn prompt_username(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Username [{}]: ", last),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), last) {
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => bail!("Username required"),
        (false, _) => Ok(input.to_string()),
    }
}

fn prompt_password() -> Result<String> {
    if let Ok(password) = std::env::var(ENV_PASSWORD) {
        return Ok(password);
    }
    let password = rpassword::prompt_password("Password: ")?;
    Ok(password)
}
