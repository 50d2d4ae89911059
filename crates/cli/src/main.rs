use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    colloquy_cli::run().await
}
