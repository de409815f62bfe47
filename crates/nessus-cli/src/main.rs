//! Binary entrypoint for the Nessus CLI.

use std::process;

#[tokio::main]
async fn main() {
    let exit_code = nessus_cli::run().await;
    if exit_code != 0 {
        process::exit(exit_code);
    }
}
