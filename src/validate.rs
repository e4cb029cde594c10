use reqwest::StatusCode;

/// Content types accepted from the upstream server, compared verbatim.
pub const ALLOWED_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "image/jpg"];

/// Why an upstream answer cannot be decoded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    /// The upstream did not answer 200; its status is passed on.
    #[error("upstream responded with {0}")]
    Status(StatusCode),
    /// The upstream answered 200 with something other than a JPEG.
    #[error("{}", bad_content_type_message(.0.as_deref()))]
    ContentType(Option<String>),
}

/// Decides whether an upstream answer may be decoded.
pub fn validate(status: StatusCode, content_type: Option<&str>) -> Result<(), Rejection> {
    if status != StatusCode::OK {
        return Err(Rejection::Status(status));
    }

    match content_type {
        Some(ct) if ALLOWED_CONTENT_TYPES.contains(&ct) => Ok(()),
        other => Err(Rejection::ContentType(other.map(str::to_string))),
    }
}

pub fn bad_content_type_message(content_type: Option<&str>) -> String {
    format!(
        "Bad content type on your URL: {}. Expecting {}",
        content_type.unwrap_or("None"),
        allowed_list()
    )
}

/// Renders the allow-list as `['image/jpeg', 'image/jpg']`.
pub fn allowed_list() -> String {
    let quoted: Vec<String> = ALLOWED_CONTENT_TYPES
        .iter()
        .map(|ct| format!("'{ct}'"))
        .collect();
    format!("[{}]", quoted.join(", "))
}
