use minet::cli::run_from_arguments;

/// Without arguments, main runs the default simulation
#[tokio::main]
async fn main() {
    println!("minet v{}", env!("CARGO_PKG_VERSION"));
    run_from_arguments().await;
    println!("Done");
}
