use poem_openapi::Object;

/// Length and emptiness are checked by the use case so the error body
/// matches the other validation failures.
#[derive(Object, Debug)]
pub struct SendMessageRequestDto {
    pub to: String,
    pub content: String,
}
