use std::path::PathBuf;

use asl_client::{read_landmarks, AslClient};
use clap::{Parser, Subcommand};
use common::Error;
use env_logger::TimestampPrecision;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address of the ASL server
    #[clap(long, default_value = "127.0.0.1:8000")]
    address: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify an image file
    Image { path: PathBuf },
    /// Classify a landmark JSON file
    Landmarks { path: PathBuf },
    /// Check whether the server is up
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let client = AslClient::new(&args.address);
    log::info!("Using server at {}", client.base_url());

    match args.command {
        Command::Image { path } => {
            let response = client.predict_image(&path).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Landmarks { path } => {
            let payload = read_landmarks(&path)?;
            let response = client.predict_landmarks(&payload).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Health => {
            let healthy = client.healthcheck().await?;
            println!("{}", if healthy { "healthy" } else { "unhealthy" });
        }
    }

    Ok(())
}
