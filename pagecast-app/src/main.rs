use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    pagecast_lib::run().await
}
