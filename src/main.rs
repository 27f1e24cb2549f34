use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match tubegrab_lib::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
