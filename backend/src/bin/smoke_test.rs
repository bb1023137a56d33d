//! Manual check against a running service.
//!
//! Usage: `smoke_test [BASE_URL] [IMAGE_PATH]`

use reqwest::multipart;
use shared::{ErrorResponse, HealthResponse, PredictionResult};
use std::env;
use std::path::{Path, PathBuf};

const DEFAULT_BASE_URL: &str = "http://localhost:9000";
const DEFAULT_IMAGE: &str = "test_image.jpg";

#[actix_web::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let mut args = env::args().skip(1);
    let base_url = args.next().unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let image_path = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_IMAGE.to_string()));
    let client = reqwest::Client::new();

    log::info!("Testing health endpoint...");
    match check_health(&client, &base_url).await {
        Ok(health) => log::info!("Health check: {} - {}", health.status, health.message),
        Err(e) => {
            log::error!("Health check failed: {}", e);
            log::error!("Make sure the service is running at {}", base_url);
            std::process::exit(1);
        }
    }

    log::info!("Testing prediction endpoint...");
    if !image_path.is_file() {
        log::warn!("Test image not found at {}", image_path.display());
        log::warn!("Skipping prediction test. Service appears to be running correctly.");
        return;
    }
    if let Err(e) = check_predict(&client, &base_url, &image_path).await {
        log::error!("Prediction test failed: {}", e);
        std::process::exit(1);
    }

    log::info!("Service is ready to accept requests!");
}

async fn check_health(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<HealthResponse, reqwest::Error> {
    client
        .get(format!("{}/health", base_url))
        .send()
        .await?
        .error_for_status()?
        .json::<HealthResponse>()
        .await
}

async fn check_predict(
    client: &reqwest::Client,
    base_url: &str,
    image_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(image_path)?;
    let file_name = image_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_IMAGE.to_string());
    let form = multipart::Form::new().part("file", multipart::Part::bytes(bytes).file_name(file_name));

    let response = client
        .post(format!("{}/predict", base_url))
        .multipart(form)
        .send()
        .await?;
    let status = response.status();
    log::info!("Prediction test: {}", status);

    if status.is_success() {
        let result: PredictionResult = response.json().await?;
        log::info!("Response: {} (confidence: {:.4})", result.label, result.confidence);
        Ok(())
    } else {
        let body: ErrorResponse = response.json().await?;
        Err(format!("{} ({})", body.error, body.kind).into())
    }
}
