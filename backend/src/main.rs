use actix_web::{App, HttpServer, web};
use inference_backend::config::ServiceConfig;
use inference_backend::error::StartupError;
use inference_backend::routes::{UploadLimits, configure_routes, cors};
use std::env;
use std::path::PathBuf;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), StartupError> {
    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = ServiceConfig::load(config_path.as_deref())?;
    log::debug!("Service configuration: {:?}", config);

    let engine = web::Data::new(inference_backend::build_engine(&config)?);
    let limits = web::Data::new(UploadLimits {
        max_bytes: config.max_upload_bytes,
    });

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(cors())
            .app_data(engine.clone())
            .app_data(limits.clone())
            .configure(configure_routes)
    });
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }

    server.bind(&bind_address)?.run().await?;
    Ok(())
}
