use serde::ser::Serializer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation already in flight: {0}")]
    Busy(String),
    #[error("{operation} rejected by control endpoint: {status} {reason}")]
    ControlRejected {
        operation: &'static str,
        status: u16,
        reason: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("json decode error: {0}")]
    SimdJson(#[from] simd_json::Error),
    #[error("float parse error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_display_string() {
        let error = AppError::ControlRejected {
            operation: "set-crypto",
            status: 503,
            reason: "Service Unavailable".to_string(),
        };

        let encoded = simd_json::to_string(&error).expect("error should serialize");
        assert_eq!(
            encoded,
            "\"set-crypto rejected by control endpoint: 503 Service Unavailable\""
        );
    }

    #[test]
    fn busy_names_the_blocked_call() {
        let error = AppError::Busy("delta control call".to_string());
        assert_eq!(error.to_string(), "operation already in flight: delta control call");
    }
}
