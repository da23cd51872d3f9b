use log::error;

use patient_sheets::app;
use patient_sheets::config::Config;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load();
    if let Err(e) = app::run(config).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
