use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};

use super::{db_error, error_response};
use crate::middleware::require_user;
use crate::models::UpsertVoiceSignatureRequest;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/user").service(
            web::resource("/voice-signature")
                .route(web::get().to(get_signature))
                .route(web::put().to(put_signature))
                .route(web::delete().to(delete_signature)),
        ),
    );
}

async fn get_signature(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match state.db.get_voice_signature(&user.id) {
        Ok(Some(signature)) => HttpResponse::Ok().json(signature),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Voice signature not found"),
        Err(e) => db_error("Failed to load voice signature", e),
    }
}

async fn put_signature(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<UpsertVoiceSignatureRequest>,
) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(msg) = body.validate() {
        return error_response(StatusCode::BAD_REQUEST, &msg);
    }

    match state
        .db
        .upsert_voice_signature(&user.id, &body.embedding, body.sample_count)
    {
        Ok(signature) => {
            log::info!(
                "[VOICE] Stored {}-value signature for {} ({} samples)",
                signature.embedding.len(),
                user.id,
                signature.sample_count
            );
            HttpResponse::Ok().json(signature)
        }
        Err(e) => db_error("Failed to store voice signature", e),
    }
}

async fn delete_signature(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let user = match require_user(&state.db, &req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match state.db.delete_voice_signature(&user.id) {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Voice signature not found"),
        Err(e) => db_error("Failed to delete voice signature", e),
    }
}
