use thiserror::Error;

/// Failure of one call to the face service.
#[derive(Error, Debug)]
pub enum FaceServiceError {
    /// No usable response: connection, TLS or I/O failure.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The service answered with a status the operation does not accept.
    #[error("service error (HTTP {status}): {diagnostic}")]
    Service {
        status: u16,
        diagnostic: serde_json::Value,
    },
    #[error("failed to decode service response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    /// The worker running the call went away before delivering a result.
    #[error("face service worker disconnected")]
    Disconnected,
}

impl FaceServiceError {
    /// `error.code` from a service diagnostic, e.g. `PersonGroupNotFound`.
    pub fn service_code(&self) -> Option<&str> {
        match self {
            FaceServiceError::Service { diagnostic, .. } => {
                diagnostic.pointer("/error/code").and_then(|v| v.as_str())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_code_from_diagnostic() {
        let err = FaceServiceError::Service {
            status: 404,
            diagnostic: serde_json::json!({
                "error": {"code": "PersonGroupNotFound", "message": "Person group is not found."}
            }),
        };
        assert_eq!(err.service_code(), Some("PersonGroupNotFound"));
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[test]
    fn test_service_code_absent_for_other_errors() {
        assert_eq!(FaceServiceError::Disconnected.service_code(), None);
        let err = FaceServiceError::Service {
            status: 500,
            diagnostic: serde_json::Value::Null,
        };
        assert_eq!(err.service_code(), None);
    }
}
