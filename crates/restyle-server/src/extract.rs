use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::Json;
use restyle_contracts::requests::{ImagePayload, RedesignRequest};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug)]
pub struct RedesignForm(pub RedesignRequest);

#[derive(Debug, Default, Deserialize)]
struct RedesignBody {
    image: Option<String>,
    prompt: Option<String>,
    style: Option<String>,
    #[serde(rename = "roomType", alias = "room_type")]
    room_type: Option<String>,
}

impl<S> FromRequest<S> for RedesignForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state).await.map_err(|rejection| {
                body_error(rejection.status(), "Malformed multipart body", rejection.body_text())
            })?;
            return read_multipart(multipart).await.map(Self);
        }

        let Json(body) = Json::<RedesignBody>::from_request(req, state)
            .await
            .map_err(|rejection| {
                body_error(rejection.status(), "Malformed JSON body", rejection.body_text())
            })?;
        let image = match non_blank(body.image) {
            Some(raw) => Some(decode_image(&raw)?),
            None => None,
        };
        Ok(Self(RedesignRequest {
            image,
            prompt: non_blank(body.prompt),
            style: non_blank(body.style),
            room_type: non_blank(body.room_type),
        }))
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<RedesignRequest, ApiError> {
    let mut request = RedesignRequest::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| body_error(err.status(), "Malformed multipart body", err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let is_file = field.file_name().is_some()
            || field
                .content_type()
                .is_some_and(|mime| mime.to_ascii_lowercase().starts_with("image/"));
        let declared_mime = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| body_error(err.status(), "Malformed multipart body", err.body_text()))?;

        match name.as_str() {
            "image" if is_file => {
                if !bytes.is_empty() {
                    let payload = ImagePayload::from_bytes(bytes.to_vec(), declared_mime.as_deref())
                        .map_err(|err| {
                            ApiError::bad_request("Invalid image payload")
                                .with_details(format!("{err:#}"))
                        })?;
                    request.image = Some(payload);
                }
            }
            "image" => {
                if let Some(raw) = non_blank(Some(text_field(&bytes)?)) {
                    request.image = Some(decode_image(&raw)?);
                }
            }
            "prompt" => request.prompt = non_blank(Some(text_field(&bytes)?)),
            "style" => request.style = non_blank(Some(text_field(&bytes)?)),
            "roomType" | "room_type" => request.room_type = non_blank(Some(text_field(&bytes)?)),
            _ => {}
        }
    }
    Ok(request)
}

fn body_error(status: StatusCode, message: &str, details: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(status, "Request body too large").with_details(details);
    }
    ApiError::bad_request(message).with_details(details)
}

fn text_field(bytes: &[u8]) -> Result<String, ApiError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ApiError::bad_request("Form fields must be UTF-8 text"))
}

fn decode_image(raw: &str) -> Result<ImagePayload, ApiError> {
    ImagePayload::from_data_url(raw).map_err(|err| {
        ApiError::bad_request("Invalid image payload").with_details(format!("{err:#}"))
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
