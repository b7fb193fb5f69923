use std::sync::Arc;

use poem_openapi::{OpenApi, payload::Json};
use tracing::info;

use crate::presentation::{
    http::{
        endpoints::root::{ApiState, EndpointsTags},
        responses::SchedulerStatusDto,
    },
    models::SchedulerStateDto,
};

#[derive(Clone)]
pub struct SchedulerEndpoints {
    state: Arc<ApiState>,
}

impl SchedulerEndpoints {
    pub fn new(state: Arc<ApiState>) -> Self {
        Self { state }
    }
}

#[OpenApi]
impl SchedulerEndpoints {
    /// Starts the dispatch loop. Calling it while running changes nothing.
    #[oai(path = "/start", method = "post", tag = EndpointsTags::Scheduler)]
    pub async fn start(&self) -> Json<SchedulerStatusDto> {
        if self.state.scheduler.start().await {
            info!("scheduler started via api");
        }
        Json(SchedulerStatusDto {
            status: SchedulerStateDto::Started,
        })
    }

    /// Stops the dispatch loop once its current cycle is done.
    #[oai(path = "/stop", method = "post", tag = EndpointsTags::Scheduler)]
    pub async fn stop(&self) -> Json<SchedulerStatusDto> {
        if self.state.scheduler.stop().await {
            info!("scheduler stopped via api");
        }
        Json(SchedulerStatusDto {
            status: SchedulerStateDto::Stopped,
        })
    }
}
