use std::process::ExitCode;

use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    match reply_courier::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Worker exited with an error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
