use std::sync::Arc;

use poem::{Endpoint, EndpointExt, Route, middleware::Tracing};
use poem_openapi::{OpenApiService, Tags};

use crate::{
    application::{
        handlers::scheduler::DispatchScheduler,
        usecases::{
            list_sent_messages::ListSentMessagesUseCase, send_message::SendMessageUseCase,
        },
    },
    presentation::http::endpoints::{
        health::HealthEndpoints, messages::MessagesEndpoints, scheduler::SchedulerEndpoints,
    },
};

#[derive(Clone)]
pub struct ApiState {
    pub send_message_usecase: Arc<SendMessageUseCase>,
    pub list_sent_messages_usecase: Arc<ListSentMessagesUseCase>,
    pub scheduler: Arc<DispatchScheduler>,
}

/// Enum of API sections (tags)
#[derive(Tags)]
pub enum EndpointsTags {
    Health,
    Messages,
    Scheduler,
}

/// Routes: the API under `/api`, its YAML document at `/openapi.yaml` and
/// Swagger UI at `/`.
pub fn build_app(state: Arc<ApiState>, server_url: String) -> impl Endpoint {
    let api_service = OpenApiService::new(
        (
            HealthEndpoints,
            MessagesEndpoints::new(state.clone()),
            SchedulerEndpoints::new(state),
        ),
        "Message Dispatch API",
        env!("CARGO_PKG_VERSION"),
    )
    .server(format!("{server_url}/api"));
    let ui = api_service.swagger_ui();
    let spec = api_service.spec_endpoint_yaml();

    Route::new()
        .nest("/api", api_service)
        .at("/openapi.yaml", spec)
        .nest("/", ui)
        .with(Tracing)
}
