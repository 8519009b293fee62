use actix_web::http::header;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use secure_review_core::report::build_report;
use secure_review_core::{render_pdf, CreateReviewInput};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
}

impl ListQuery {
    /// 无法解析的值按 0 处理，再由服务层归一化
    fn paging(&self) -> (i64, i64) {
        let parse = |value: &Option<String>, default: i64| match value {
            Some(raw) => raw.trim().parse().unwrap_or(0),
            None => default,
        };
        (parse(&self.page, 1), parse(&self.page_size, 20))
    }
}

pub fn configure_review_routes(cfg: &mut web::ServiceConfig) {
    cfg
        .route("", web::post().to(create_review))                  // POST /api/reviews
        .route("", web::get().to(list_reviews))                    // GET /api/reviews
        .route("/{id}", web::get().to(get_review))                 // GET /api/reviews/{id}
        .route("/{id}", web::delete().to(delete_review))           // DELETE /api/reviews/{id}
        .route("/{id}/pdf", web::get().to(get_review_pdf))         // GET /api/reviews/{id}/pdf
        .route("/{id}/reanalyze", web::post().to(reanalyze_review)); // POST /api/reviews/{id}/reanalyze
}

fn parse_review_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid review ID".into()))
}

async fn create_review(
    state: web::Data<AppState>,
    user: AuthUser,
    req: web::Json<CreateReviewInput>,
) -> Result<HttpResponse, ApiError> {
    let review = state.reviews.create_review(user.user_id, &req).await?;
    Ok(HttpResponse::Created().json(review))
}

async fn list_reviews(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let (page, page_size) = query.paging();
    let reviews = state
        .reviews
        .get_user_reviews(user.user_id, page, page_size)
        .await?;
    Ok(HttpResponse::Ok().json(reviews))
}

async fn get_review(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let review_id = parse_review_id(&path)?;
    let review = state.reviews.get_by_id(user.user_id, review_id).await?;
    Ok(HttpResponse::Ok().json(review))
}

async fn get_review_pdf(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let review_id = parse_review_id(&path)?;
    let (review, issues) = state
        .reviews
        .get_with_issues(user.user_id, review_id)
        .await?;

    let report = build_report(&review, &issues, Utc::now());
    let pdf = web::block(move || render_pdf(&report))
        .await
        .map_err(|e| ApiError::Internal(format!("PDF task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let id = review_id.to_string();
    let filename = format!("review-{}.pdf", &id[..8]);

    Ok(HttpResponse::Ok()
        .content_type(mime::APPLICATION_PDF)
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", filename),
        ))
        .body(pdf))
}

async fn delete_review(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let review_id = parse_review_id(&path)?;
    state.reviews.delete(user.user_id, review_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Review deleted successfully"
    })))
}

async fn reanalyze_review(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let review_id = parse_review_id(&path)?;
    let review = state.reviews.reanalyze(user.user_id, review_id).await?;
    Ok(HttpResponse::Ok().json(review))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_api_router;
    use crate::auth::{sign_token, TokenVerifier};
    use actix_web::{test, App};
    use secure_review_core::{ManualScheduler, ReviewStore, SqliteReviewStore};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    const SECRET: &str = "test-secret";

    struct Fixture {
        state: AppState,
        store: Arc<SqliteReviewStore>,
        scheduler: Arc<ManualScheduler>,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("api.db").display());
        let store = Arc::new(SqliteReviewStore::connect(&url).await.unwrap());
        let scheduler = Arc::new(ManualScheduler::new());
        let state = AppState::from_parts(store.clone(), scheduler.clone());
        Fixture {
            state,
            store,
            scheduler,
            _dir: dir,
        }
    }

    macro_rules! test_app {
        ($fixture:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($fixture.state.clone()))
                    .app_data(web::Data::new(TokenVerifier::new(SECRET)))
                    .service(create_api_router()),
            )
            .await
        };
    }

    fn bearer(user: Uuid) -> (header::HeaderName, String) {
        (
            header::AUTHORIZATION,
            format!("Bearer {}", sign_token(SECRET, user)),
        )
    }

    fn inline_body() -> Value {
        json!({ "title": "login", "code": "a=1", "language": "python" })
    }

    #[actix_web::test]
    async fn requests_without_token_are_rejected() {
        let fx = fixture().await;
        let app = test_app!(fx);

        let req = test::TestRequest::post()
            .uri("/api/reviews")
            .set_json(inline_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 401);

        let req = test::TestRequest::get()
            .uri("/api/reviews")
            .insert_header((header::AUTHORIZATION, "Bearer garbage"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 401);
    }

    #[actix_web::test]
    async fn create_returns_pending_review_and_schedules_job() {
        let fx = fixture().await;
        let app = test_app!(fx);
        let user = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/api/reviews")
            .insert_header(bearer(user))
            .set_json(inline_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 201);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "pending");
        assert_eq!(body["user_id"], json!(user.to_string()));
        assert_eq!(body["code"], "a=1");
        assert_eq!(body["overall_score"], 0);
        assert!(body.get("security_issues").is_none());
        assert!(body.get("completed_at").is_none());

        let jobs = fx.scheduler.pending();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].review_id.to_string(), body["id"].as_str().unwrap());
    }

    #[actix_web::test]
    async fn inline_code_without_language_is_accepted() {
        let fx = fixture().await;
        let app = test_app!(fx);

        let req = test::TestRequest::post()
            .uri("/api/reviews")
            .insert_header(bearer(Uuid::new_v4()))
            .set_json(json!({ "title": "snippet", "code": "eval(input())" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 201);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["language"], "unknown");
        assert_eq!(fx.scheduler.pending().len(), 1);
    }

    #[actix_web::test]
    async fn invalid_payloads_are_bad_requests() {
        let fx = fixture().await;
        let app = test_app!(fx);
        let user = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/api/reviews")
            .insert_header(bearer(user))
            .set_json(json!({
                "title": "both",
                "code": "x",
                "language": "go",
                "repo_owner": "a",
                "repo_name": "b",
                "repo_branch": "main"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);

        let req = test::TestRequest::post()
            .uri("/api/reviews")
            .insert_header(bearer(user))
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request body"));

        assert!(fx.scheduler.pending().is_empty());
    }

    #[actix_web::test]
    async fn get_checks_id_and_ownership() {
        let fx = fixture().await;
        let app = test_app!(fx);
        let owner = Uuid::new_v4();
        let created = fx
            .state
            .reviews
            .create_review(owner, &serde_json::from_value(inline_body()).unwrap())
            .await
            .unwrap();

        let req = test::TestRequest::get()
            .uri("/api/reviews/not-a-uuid")
            .insert_header(bearer(owner))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid review ID");

        let req = test::TestRequest::get()
            .uri(&format!("/api/reviews/{}", created.id))
            .insert_header(bearer(Uuid::new_v4()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 403);

        let req = test::TestRequest::get()
            .uri(&format!("/api/reviews/{}", Uuid::new_v4()))
            .insert_header(bearer(owner))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 404);

        let req = test::TestRequest::get()
            .uri(&format!("/api/reviews/{}", created.id))
            .insert_header(bearer(owner))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["title"], "login");
    }

    #[actix_web::test]
    async fn list_coerces_paging() {
        let fx = fixture().await;
        let app = test_app!(fx);
        let user = Uuid::new_v4();
        for _ in 0..2 {
            fx.state
                .reviews
                .create_review(user, &serde_json::from_value(inline_body()).unwrap())
                .await
                .unwrap();
        }

        let req = test::TestRequest::get()
            .uri("/api/reviews?page=0&page_size=500")
            .insert_header(bearer(user))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["page"], 1);
        assert_eq!(body["page_size"], 20);
        assert_eq!(body["total"], 2);
        assert_eq!(body["total_pages"], 1);
        assert_eq!(body["reviews"].as_array().unwrap().len(), 2);

        let req = test::TestRequest::get()
            .uri("/api/reviews?page=abc")
            .insert_header(bearer(user))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["page"], 1);
    }

    #[actix_web::test]
    async fn delete_removes_review() {
        let fx = fixture().await;
        let app = test_app!(fx);
        let owner = Uuid::new_v4();
        let created = fx
            .state
            .reviews
            .create_review(owner, &serde_json::from_value(inline_body()).unwrap())
            .await
            .unwrap();

        let req = test::TestRequest::delete()
            .uri(&format!("/api/reviews/{}", created.id))
            .insert_header(bearer(Uuid::new_v4()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 403);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/reviews/{}", created.id))
            .insert_header(bearer(owner))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["message"], "Review deleted successfully");

        assert!(fx.store.get_by_id(created.id).await.is_err());
    }

    #[actix_web::test]
    async fn reanalyze_requires_terminal_status() {
        let fx = fixture().await;
        let app = test_app!(fx);
        let owner = Uuid::new_v4();
        let created = fx
            .state
            .reviews
            .create_review(owner, &serde_json::from_value(inline_body()).unwrap())
            .await
            .unwrap();
        fx.scheduler.take();

        let uri = format!("/api/reviews/{}/reanalyze", created.id);
        let req = test::TestRequest::post()
            .uri(&uri)
            .insert_header(bearer(owner))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 409);

        let mut review = fx.store.get_by_id(created.id).await.unwrap();
        review.start_processing().unwrap();
        review.fail("model unavailable").unwrap();
        fx.store.update(&review, 0).await.unwrap();

        let req = test::TestRequest::post()
            .uri(&uri)
            .insert_header(bearer(owner))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "pending");
        assert!(body.get("result").is_none());

        let jobs = fx.scheduler.pending();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].generation, 1);
    }

    #[actix_web::test]
    async fn pdf_export_is_an_attachment() {
        let fx = fixture().await;
        let app = test_app!(fx);
        let owner = Uuid::new_v4();
        let created = fx
            .state
            .reviews
            .create_review(owner, &serde_json::from_value(inline_body()).unwrap())
            .await
            .unwrap();

        let req = test::TestRequest::get()
            .uri(&format!("/api/reviews/{}/pdf", created.id))
            .insert_header(bearer(owner))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/pdf"
        );
        let disposition = resp
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(
            disposition,
            format!("attachment; filename=review-{}.pdf", &created.id.to_string()[..8])
        );

        let bytes = test::read_body(resp).await;
        assert!(bytes.starts_with(b"%PDF"));
    }
}
