use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use meatshop_api::{
    auth::{AuthConfig, AuthService},
    config,
    db::{self, DbPool},
    services::{admin::AdminService, users::UserService},
};
use serde::Serialize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let pool: Arc<DbPool> = Arc::new(
        db::establish_connection_from_app_config(&cfg)
            .await
            .context("failed to connect to database")?,
    );

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::SetAdmin { email, revoke } => {
            let auth = Arc::new(AuthService::new(AuthConfig::from_app_config(&cfg)));
            let users = UserService::new(pool.clone(), auth);
            let profile = users
                .set_admin(&email, !revoke)
                .await
                .with_context(|| format!("failed to update admin flag for {email}"))?;

            if cli.json {
                print_json(&profile)?;
            } else if profile.is_admin {
                println!("{} is now an admin (id {})", profile.email, profile.id);
            } else {
                println!("{} is no longer an admin (id {})", profile.email, profile.id);
            }
        }
        Commands::Stats => {
            let stats = AdminService::new(pool.clone())
                .dashboard_stats()
                .await
                .context("failed to compute dashboard stats")?;

            if cli.json {
                print_json(&stats)?;
            } else {
                println!("Orders:      {}", stats.total_orders);
                println!("Revenue:     {}", stats.total_revenue);
                println!("Undelivered: {}", stats.undelivered_orders);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Parser)]
#[command(name = "meatshop", about = "Meatshop maintenance CLI", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Grant (or with --revoke, remove) admin rights for an account
    SetAdmin {
        #[arg(long)]
        email: String,
        #[arg(long, action = ArgAction::SetTrue)]
        revoke: bool,
    },
    /// Print the admin dashboard figures
    Stats,
}
