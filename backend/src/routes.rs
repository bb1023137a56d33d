use actix_cors::Cors;
use actix_multipart::{Field, Multipart};
use actix_web::{HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use shared::HealthResponse;
use uuid::Uuid;

use crate::error::{DecodeError, InferenceError, PredictError};
use crate::inference::{InferenceEngine, decode_image, preprocess};

pub const UPLOAD_FIELD: &str = "file";

/// Per-request limits handed to the handlers as app data.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_bytes: usize,
}

/// Any origin, method and header, cached for an hour.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600)
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/predict").route(web::post().to(predict)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse::ok("Inference service is running"))
}

async fn predict(
    engine: web::Data<InferenceEngine>,
    limits: web::Data<UploadLimits>,
    payload: Multipart,
) -> Result<HttpResponse, PredictError> {
    let request_id = Uuid::new_v4();
    let (file_name, image_data) = read_upload(payload, limits.max_bytes).await?;
    info!(
        "[{}] Received prediction request for file: {}",
        request_id,
        file_name.as_deref().unwrap_or("<unnamed>")
    );
    info!("[{}] Image size: {} bytes", request_id, image_data.len());

    let engine = engine.into_inner();
    let result = web::block(move || -> Result<_, PredictError> {
        let image = decode_image(&image_data)?;
        info!(
            "[{}] Image dimensions: {}x{}",
            request_id,
            image.width(),
            image.height()
        );
        Ok(engine.predict(&preprocess(&image))?)
    })
    .await
    .map_err(|e| {
        error!("[{}] Inference worker failed: {}", request_id, e);
        InferenceError::Worker(e.to_string())
    })??;

    info!(
        "[{}] Prediction: {} (confidence: {:.4})",
        request_id, result.label, result.confidence
    );
    Ok(HttpResponse::Ok().json(result))
}

/// Collects the `file` field, draining and ignoring any other field.
async fn read_upload(
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<(Option<String>, Vec<u8>), DecodeError> {
    let mut upload = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| DecodeError::Multipart(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) || upload.is_some() {
            drain(&mut field).await?;
            continue;
        }
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let data = read_field(&mut field, max_bytes).await?;
        upload = Some((file_name, data));
    }

    match upload {
        Some((_, data)) if data.is_empty() => Err(DecodeError::EmptyPayload),
        Some(upload) => Ok(upload),
        None => Err(DecodeError::MissingFile),
    }
}

async fn read_field(field: &mut Field, max_bytes: usize) -> Result<Vec<u8>, DecodeError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| DecodeError::Multipart(e.to_string()))?;
        if data.len() + chunk.len() > max_bytes {
            return Err(DecodeError::TooLarge { limit: max_bytes });
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn drain(field: &mut Field) -> Result<(), DecodeError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|e| DecodeError::Multipart(e.to_string()))?;
    }
    Ok(())
}
