use axum::Router;
use axum::http::HeaderValue;
use kiln::Kiln;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod extract;
pub mod routes;
pub mod ws;

pub use config::{ApiConfig, CorsConfig};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub kiln: Kiln,
}

impl AppState {
    pub fn new(kiln: Kiln) -> Self {
        Self { kiln }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::v1::inference::watch_inference,
        crate::routes::v1::inference::get_inference,
        crate::routes::v1::evaluate::watch_evaluate,
        crate::routes::v1::evaluate::get_evaluate,
        crate::routes::v1::training::create_training,
        crate::routes::v1::training::list_trainings,
        crate::routes::v1::training::get_training,
        crate::routes::v1::training::delete_training,
        crate::routes::v1::training::recreate_training,
        crate::routes::v1::training::terminate_training,
        crate::routes::v1::training::training_log,
        crate::routes::v1::training::watch_training,
        crate::routes::v1::finetune::create_finetune,
        crate::routes::v1::finetune::list_finetunes,
        crate::routes::v1::finetune::get_finetune,
        crate::routes::v1::finetune::delete_finetune,
        crate::routes::v1::finetune::terminate_finetune,
        crate::routes::v1::finetune::finetune_log,
        crate::routes::v1::finetune::watch_finetune,
        crate::routes::internal::update_detail,
    ),
    components(
        schemas(
            crate::routes::health::HealthResponse,
            crate::routes::v1::InstanceDto,
            crate::routes::v1::jobs::CreateJobRequest,
            crate::routes::v1::jobs::JobSummaryDto,
            crate::routes::v1::jobs::JobDetailDto,
            crate::routes::v1::jobs::ListJobsResponse,
            crate::routes::v1::jobs::UrlResponse,
            crate::routes::internal::IndexDto,
            crate::routes::internal::DetailDto,
            crate::routes::internal::UpdateDetailRequest,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "inference", description = "Inference instances"),
        (name = "evaluate", description = "Evaluation boards"),
        (name = "training", description = "Training jobs"),
        (name = "finetune", description = "Fine-tuning jobs"),
        (name = "internal", description = "Callbacks from the execution platform")
    )
)]
pub struct ApiDoc;

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    if config.allow_any_origin {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

/// Build the public API application
pub fn build_app(state: AppState, config: &ApiConfig) -> Router {
    let mut app = Router::new().merge(routes::routes());
    if config.enable_swagger {
        app = app.merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
        );
    }

    app.layer(cors_layer(&config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the internal application, for trusted platform components only
pub fn build_internal_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::routes())
        .nest("/internal/v1", routes::internal::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
