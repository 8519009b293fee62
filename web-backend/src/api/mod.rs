use actix_web::{web, Scope};

use crate::error::ApiError;

pub mod health;
pub mod review;

pub fn create_api_router() -> Scope {
    web::scope("/api")
        .app_data(json_config())
        .service(review_routes())
}

fn review_routes() -> Scope {
    web::scope("/reviews")
        .configure(review::configure_review_routes)
}

/// 请求体解析失败统一返回 400 + {"error": ..}
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest(format!("Invalid request body: {}", err)).into()
    })
}
