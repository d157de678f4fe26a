mod cli;
mod infra;
mod routes;
mod server;

use taxforms::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
