use poem_openapi::{ApiResponse, Object, payload::Json};

use crate::presentation::models::{MessageStatusDto, SchedulerStateDto};

#[derive(Object, Debug)]
#[oai(rename_all = "camelCase")]
pub struct SendMessageResponseDto {
    pub message: String,
    pub message_id: String,
}

#[derive(Object, Debug)]
#[oai(rename_all = "camelCase")]
pub struct ErrorDto {
    pub error: String,
    /// Status the webhook answered with, when the failure came from it.
    #[oai(skip_serializing_if_is_none)]
    pub upstream_status: Option<u16>,
}

impl ErrorDto {
    pub fn new(error: impl Into<String>) -> Json<Self> {
        Json(Self {
            error: error.into(),
            upstream_status: None,
        })
    }
}

#[derive(Object, Debug)]
#[oai(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: i64,
    pub to: String,
    pub content: String,
    pub status: MessageStatusDto,
    pub created_at: String,
    pub updated_at: String,
    pub sent_at: Option<String>,
    pub remote_message_id: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Object, Debug)]
pub struct SchedulerStatusDto {
    pub status: SchedulerStateDto,
}

#[derive(ApiResponse)]
#[oai(bad_request_handler = "send_message_bad_request")]
pub enum SendMessageApiResponse {
    #[oai(status = 202)]
    Accepted(Json<SendMessageResponseDto>),
    #[oai(status = 400)]
    BadRequest(Json<ErrorDto>),
    #[oai(status = 500)]
    InternalServerError(Json<ErrorDto>),
    /// The webhook refused or never confirmed the message.
    #[oai(status = 502)]
    BadGateway(Json<ErrorDto>),
}

fn send_message_bad_request(_: poem::Error) -> SendMessageApiResponse {
    SendMessageApiResponse::BadRequest(ErrorDto::new("invalid JSON"))
}

#[derive(ApiResponse)]
pub enum ListSentMessagesApiResponse {
    #[oai(status = 200)]
    Ok(Json<Vec<MessageDto>>),
    #[oai(status = 500)]
    InternalServerError(Json<ErrorDto>),
}
