use crate::server;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use taxforms::error::AppError;
use taxforms::intake::schema::schema_sql;
use taxforms::intake::sin::generate_key_base64;

#[derive(Parser, Debug)]
#[command(
    name = "Tax Form Intake",
    about = "Run the tax-form intake service and its maintenance commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the PostgreSQL schema for the intake tables
    Schema(SchemaArgs),
    /// Generate a FIELD_ENCRYPTION_KEY value
    Keygen,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct SchemaArgs {
    /// Write the DDL to a file instead of stdout
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Schema(args) => write_schema(args),
        Command::Keygen => {
            println!("{}", generate_key_base64());
            Ok(())
        }
    }
}

fn write_schema(args: SchemaArgs) -> Result<(), AppError> {
    let sql = schema_sql();
    match args.output {
        Some(path) => std::fs::write(path, format!("{sql}\n"))?,
        None => println!("{sql}"),
    }
    Ok(())
}
