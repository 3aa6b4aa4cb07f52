//! CLI entry point - the composition root.
//!
//! Loads configuration, initializes logging, and bootstraps the gateway only
//! for commands that need live server connections.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use toolgate_cli::{Cli, CliError, Commands, ConfigLoader, bootstrap, handlers};

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = ConfigLoader::load(cli.config.as_deref())?;

    // Commands that never connect to servers
    match &command {
        Commands::Policy => {
            return handlers::policy::execute(&toolgate_cli::bootstrap::policy(&config));
        }
        Commands::Classify { names } => {
            return handlers::policy::execute_classify(
                &toolgate_cli::bootstrap::policy(&config),
                names,
            );
        }
        Commands::Config => return handlers::config::execute(&config, cli.config.as_deref()),
        _ => {}
    }

    let ctx = bootstrap(config, cli.config.clone()).await?;

    let result = match command {
        Commands::Tools { json } => handlers::tools::execute(&ctx, json),
        Commands::Call {
            tool,
            args,
            confirm,
        } => handlers::call::execute(&ctx, &tool, &args, confirm).await,
        Commands::Servers => handlers::servers::execute(&ctx).await,
        Commands::Serve => handlers::serve::execute(&ctx).await,
        Commands::Policy | Commands::Classify { .. } | Commands::Config => Ok(()),
    };

    ctx.shutdown().await;
    result
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        std::process::exit(code);
    }
}
