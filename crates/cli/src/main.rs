//! Furnish CLI - Drive the shopping cart from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Fill the device cart while signed out
//! furnish cart add sofa-01 --title "Asgaard sofa" --price 2500000 --quantity 2
//!
//! # Sign in; the device cart is merged into the account cart
//! furnish login -e ada@example.com -p hunter2
//!
//! # Show the account cart
//! furnish cart show
//!
//! # Sign out; the device cart is shown again
//! furnish logout
//! ```
//!
//! # Commands
//!
//! - `cart show|add|remove|update|clear` - Operate on the current cart
//! - `login`, `register` - Start a session and merge the device cart
//! - `logout` - End the session
//! - `whoami` - Show the signed-in account
//!
//! Configuration comes from the environment; see [`furnish_cart::config`].

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::io::{self, Write};

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use furnish_cart::{CartConfig, Registration};

use commands::{CliError, Context};

mod commands;
mod output;
mod persisted;

#[derive(Parser)]
#[command(name = "furnish")]
#[command(author, version, about = "Furnish shopping cart")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Operate on the current cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Sign in and merge the device cart into the account
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,
    },
    /// Sign out
    Logout,
    /// Show the signed-in account
    Whoami,
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show {
        /// Print the cart as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a product
    Add {
        /// Product id
        id: String,

        /// Product title
        #[arg(short, long)]
        title: String,

        /// Unit price in whole currency units
        #[arg(long)]
        price: u64,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// Image URL
        #[arg(long)]
        image: Option<String>,

        /// Short secondary line
        #[arg(long)]
        subtitle: Option<String>,
    },
    /// Remove a product
    Remove {
        /// Product id
        id: String,
    },
    /// Set a product's quantity (zero or less removes it)
    Update {
        /// Product id
        id: String,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Empty the cart
    Clear,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match CartConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            let _ = writeln!(io::stderr(), "Configuration error: {e}");
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Logs go to stderr so command output stays clean
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "furnish_cart=info,furnish_cli=info".into());

    let json_layer = config.log_json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(io::stderr)
    });
    let text_layer = (!config.log_json).then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &CartConfig) -> Result<(), CliError> {
    let mut ctx = Context::open(config).await?;
    let mut out = io::stdout().lock();

    let result = match cli.command {
        Commands::Cart { action } => match action {
            CartAction::Show { json } => commands::cart::show(&ctx, &mut out, json).await,
            CartAction::Add {
                id,
                title,
                price,
                quantity,
                image,
                subtitle,
            } => {
                let line = commands::cart::NewLine {
                    id,
                    title,
                    price,
                    quantity,
                    image,
                    subtitle,
                };
                commands::cart::add(&ctx, &mut out, line).await
            }
            CartAction::Remove { id } => commands::cart::remove(&ctx, &mut out, &id).await,
            CartAction::Update { id, quantity } => {
                commands::cart::update(&ctx, &mut out, &id, quantity).await
            }
            CartAction::Clear => commands::cart::clear(&ctx, &mut out).await,
        },
        Commands::Login { email, password } => {
            commands::account::login(&ctx, &mut out, &email, SecretString::from(password)).await
        }
        Commands::Register {
            name,
            email,
            password,
        } => {
            let registration = Registration {
                name,
                email,
                password: SecretString::from(password),
            };
            commands::account::register(&ctx, &mut out, registration).await
        }
        Commands::Logout => commands::account::logout(&ctx, &mut out).await,
        Commands::Whoami => commands::account::whoami(&ctx, &mut out).await,
    };

    output::notices(&mut io::stderr(), &ctx.drain_notices())?;
    ctx.sync_saved_session()?;
    result
}
