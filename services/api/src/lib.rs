mod cli;
mod demo;
mod infra;
mod routes;
mod server;

use veritrust::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
