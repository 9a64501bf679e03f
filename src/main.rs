use std::process::ExitCode;

use zentest::cli::app;

#[tokio::main]
async fn main() -> ExitCode {
    match app::run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
