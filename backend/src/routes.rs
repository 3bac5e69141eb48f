use actix_multipart::{Field, Multipart};
use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::http::header::{self, ContentDisposition};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use chrono::Utc;
use futures::TryStreamExt;
use log::info;
use shared::{FeedbackRequest, FeedbackResponse, HealthResponse, PredictResponse};

use crate::context::AppContext;
use crate::error::AppError;
use crate::inference::fusion::round_confidence;
use crate::records::feedback::parse_label;

const MAX_TEXT_FIELD_BYTES: usize = 256;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(web::resource("/api/predict").route(web::post().to(handle_predict)))
        .service(web::resource("/api/feedback").route(web::post().to(handle_feedback)))
        .service(web::resource("/api/health").route(web::get().to(health)));
}

struct UploadedFile {
    name: String,
    data: Vec<u8>,
}

#[derive(Default)]
struct PredictForm {
    file: Option<UploadedFile>,
    user_id: Option<String>,
}

async fn handle_predict(
    ctx: web::Data<AppContext>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let form = read_predict_form(payload, ctx.max_upload_bytes).await?;
    let file = form
        .file
        .filter(|file| !file.data.is_empty())
        .ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;
    info!("Received {} ({} bytes)", file.name, file.data.len());

    let pipeline = ctx.pipeline.clone();
    let data = file.data;
    let (outcome, data) = web::block(move || {
        let outcome = pipeline.run(&data);
        (outcome, data)
    })
    .await?;
    let fused = outcome?;

    let prediction_id = ctx
        .predictions
        .save_and_record(form.user_id, &data, &file.name, fused.label, fused.confidence)
        .await?;

    Ok(HttpResponse::Ok().json(PredictResponse {
        label: fused.label,
        confidence: round_confidence(fused.confidence),
        message: "Prediction successful!".to_string(),
        prediction_id,
    }))
}

async fn handle_feedback(
    ctx: web::Data<AppContext>,
    body: web::Json<FeedbackRequest>,
) -> HttpResponse {
    let request = body.into_inner();
    let outcome = match parse_label(&request.actual_label) {
        Ok(label) => ctx.feedback.correct(request.prediction_id, label).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(_) => HttpResponse::Ok().json(FeedbackResponse::recorded(
            "Feedback recorded for model improvement",
        )),
        Err(e) => {
            let error = AppError::from(e);
            error.log();
            HttpResponse::build(error.status_code()).json(FeedbackResponse::failed(error.client_message()))
        }
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        message: "Blood group service is running".to_string(),
    })
}

/// Malformed feedback bodies get the same `{success, error}` shape as other feedback failures.
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let body = FeedbackResponse::failed(format!("Invalid request body: {}", err));
    InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
}

async fn read_predict_form(
    mut payload: Multipart,
    max_upload_bytes: usize,
) -> Result<PredictForm, AppError> {
    let mut form = PredictForm::default();

    while let Some(mut field) = payload.try_next().await? {
        let disposition = field
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| ContentDisposition::from_raw(value).ok());
        let field_name = disposition
            .as_ref()
            .and_then(|cd| cd.get_name())
            .unwrap_or_default()
            .to_string();

        match field_name.as_str() {
            "file" => {
                let name = disposition
                    .as_ref()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or("upload")
                    .to_string();
                let data = read_field(&mut field, max_upload_bytes).await.map_err(|e| match e {
                    FieldError::TooLarge => AppError::PayloadTooLarge(format!(
                        "File exceeds the {} byte upload limit",
                        max_upload_bytes
                    )),
                    FieldError::Multipart(e) => e.into(),
                })?;
                form.file = Some(UploadedFile { name, data });
            }
            "user_id" => {
                let data = read_field(&mut field, MAX_TEXT_FIELD_BYTES).await.map_err(|e| match e {
                    FieldError::TooLarge => AppError::Validation("user_id is too long".to_string()),
                    FieldError::Multipart(e) => e.into(),
                })?;
                let value = String::from_utf8_lossy(&data).trim().to_string();
                form.user_id = (!value.is_empty()).then_some(value);
            }
            _ => {
                // Drain unknown fields so the stream can advance.
                while field.try_next().await?.is_some() {}
            }
        }
    }

    Ok(form)
}

enum FieldError {
    TooLarge,
    Multipart(actix_multipart::MultipartError),
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, FieldError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(FieldError::Multipart)? {
        if data.len() + chunk.len() > limit {
            return Err(FieldError::TooLarge);
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}
