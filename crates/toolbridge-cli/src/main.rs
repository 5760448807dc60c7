mod config;

use clap::{Parser, Subcommand};
use config::EnvOverrides;
use std::path::PathBuf;
use std::process::ExitCode;
use toolbridge_builtins::BuiltinTools;
use toolbridge_mcp::ClientRegistry;
use toolbridge_tools::arguments_from_value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toolbridge", about = "Discover and call tools on MCP servers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "toolbridge.toml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every registered tool
    Tools,
    /// Invoke one tool and print its result
    Call {
        /// Tool name
        tool: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Print function specs for every tool as JSON
    Specs,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    init_tracing(cli.json);

    let mut config = config::load(&cli.config).await?;
    EnvOverrides::from_env().apply(&mut config);

    // Parse arguments before connecting anything.
    let call_args = match &cli.command {
        Commands::Call { args, .. } => {
            let value: serde_json::Value = serde_json::from_str(args)
                .map_err(|e| anyhow::anyhow!("--args is not valid JSON: {e}"))?;
            Some(arguments_from_value(value)?)
        }
        _ => None,
    };

    let registry = ClientRegistry::with_local_tools(&BuiltinTools, config.local_tools);
    let failures = registry.connect_all(&config.servers).await;
    for failure in &failures {
        warn!(error = %failure, "server skipped");
    }
    info!(
        servers = registry.server_count(),
        tools = registry.get_tools().len(),
        "registry ready"
    );

    let code = match cli.command {
        Commands::Tools => {
            let tools = registry.get_tools();
            if tools.is_empty() {
                println!("No tools registered.");
                println!("Configure servers in {} under [[servers]]", cli.config.display());
            } else {
                println!("Registered tools:");
                for tool in &tools {
                    println!("  {} - {}", tool.name(), tool.descriptor().description);
                }
                println!("\nTotal: {} tool(s)", tools.len());
            }
            for status in registry.status() {
                println!(
                    "Server {} ({}): {} tool(s)",
                    status.name, status.transport, status.tool_count
                );
            }
            if !failures.is_empty() {
                println!("{} server(s) failed to register", failures.len());
            }
            ExitCode::SUCCESS
        }
        Commands::Call { tool, .. } => {
            let args = call_args.unwrap_or_default();
            match registry.invoke(&tool, args).await {
                Ok(result) => {
                    println!("{}", result.to_display_string());
                    if result.success {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    }
                }
                Err(e) => {
                    eprintln!("Error: {}", e.description());
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Specs => {
            let specs = serde_json::Value::Array(registry.function_specs());
            println!("{}", serde_json::to_string_pretty(&specs)?);
            ExitCode::SUCCESS
        }
    };

    let report = registry.close().await;
    for (server, e) in &report.failures {
        warn!(server = %server, error = %e, "close failed");
    }
    Ok(code)
}
