// sqlgate - ask your database questions in plain language

use sqlgate::{cli, logging};

#[tokio::main]
async fn main() {
    // .env is optional and must load before the log filter is read
    dotenvy::dotenv().ok();
    logging::init();

    if let Err(e) = cli::run().await {
        eprintln!("error: {e:?}");
        std::process::exit(1);
    }
}
