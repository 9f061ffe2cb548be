use livecode_lib::config::Settings;

#[tokio::main]
async fn main() {
    // .env first so RUST_LOG and LIVECODE__* can come from it
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env: {}", e);
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = livecode_lib::run(settings).await {
        eprintln!("Error running interview engine: {:#}", e);
        std::process::exit(1);
    }
}
