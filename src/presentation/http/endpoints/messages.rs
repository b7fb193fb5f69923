use std::sync::Arc;

use poem_openapi::{OpenApi, param::Query, payload::Json};
use tracing::error;

use crate::{
    application::usecases::send_message::SendMessageRequest,
    domain::errors::DomainError,
    presentation::http::{
        endpoints::root::{ApiState, EndpointsTags},
        mappers::map_message,
        requests::SendMessageRequestDto,
        responses::{
            ErrorDto, ListSentMessagesApiResponse, SendMessageApiResponse, SendMessageResponseDto,
        },
    },
};

#[derive(Clone)]
pub struct MessagesEndpoints {
    state: Arc<ApiState>,
}

impl MessagesEndpoints {
    pub fn new(state: Arc<ApiState>) -> Self {
        Self { state }
    }
}

#[OpenApi]
impl MessagesEndpoints {
    /// Sends a message right away instead of queueing it for the scheduler.
    #[oai(
        path = "/sent-messages",
        method = "post",
        tag = EndpointsTags::Messages,
    )]
    pub async fn send_message(
        &self,
        request: Json<SendMessageRequestDto>,
    ) -> SendMessageApiResponse {
        let Json(request) = request;
        let payload = SendMessageRequest {
            recipient: request.to,
            content: request.content,
        };

        match self.state.send_message_usecase.execute(payload).await {
            Ok(response) => SendMessageApiResponse::Accepted(Json(SendMessageResponseDto {
                message: "Accepted".to_string(),
                message_id: response.remote_id,
            })),
            Err(DomainError::Validation(reason)) => {
                SendMessageApiResponse::BadRequest(ErrorDto::new(reason))
            }
            Err(DomainError::Storage(err)) => {
                error!(error = %err, "failed to store message");
                SendMessageApiResponse::InternalServerError(ErrorDto::new(err.to_string()))
            }
            Err(DomainError::Delivery(err)) => SendMessageApiResponse::BadGateway(Json(ErrorDto {
                error: err.to_string(),
                upstream_status: err.status(),
            })),
        }
    }

    /// Lists sent messages, most recently sent first.
    #[oai(
        path = "/sent-messages",
        method = "get",
        tag = EndpointsTags::Messages,
    )]
    pub async fn list_sent_messages(&self, limit: Query<Option<u32>>) -> ListSentMessagesApiResponse {
        match self.state.list_sent_messages_usecase.execute(limit.0).await {
            Ok(messages) => {
                ListSentMessagesApiResponse::Ok(Json(messages.iter().map(map_message).collect()))
            }
            Err(err) => {
                error!(error = %err, "failed to list sent messages");
                ListSentMessagesApiResponse::InternalServerError(ErrorDto::new(err.to_string()))
            }
        }
    }
}
