use std::fmt;

#[derive(Debug)]
pub enum DashboardError {
    Network(reqwest::Error),
    Http { status: u16, url: String },
    Json(serde_json::Error),
    MalformedResponse(String),
    Validation(String),
    Auth(String),
    Config(String),
    Io(std::io::Error),
}

impl DashboardError {
    /// True for failures caused by the transport or the server, as opposed to
    /// anything the client could have caught before sending.
    pub fn is_network_or_server(&self) -> bool {
        matches!(self, DashboardError::Network(_) | DashboardError::Http { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DashboardError::Http { status, .. } => Some(*status),
            DashboardError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl fmt::Display for DashboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashboardError::Network(e) => write!(f, "Network error: {}", e),
            DashboardError::Http { status, url } => {
                write!(f, "Server returned {} for {}", status, url)
            }
            DashboardError::Json(e) => write!(f, "JSON parsing error: {}", e),
            DashboardError::MalformedResponse(e) => write!(f, "Malformed response: {}", e),
            DashboardError::Validation(e) => write!(f, "Validation error: {}", e),
            DashboardError::Auth(e) => write!(f, "Authentication error: {}", e),
            DashboardError::Config(e) => write!(f, "Configuration error: {}", e),
            DashboardError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for DashboardError {}

impl From<reqwest::Error> for DashboardError {
    fn from(err: reqwest::Error) -> Self {
        DashboardError::Network(err)
    }
}

impl From<serde_json::Error> for DashboardError {
    fn from(err: serde_json::Error) -> Self {
        DashboardError::Json(err)
    }
}

impl From<std::io::Error> for DashboardError {
    fn from(err: std::io::Error) -> Self {
        DashboardError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_is_network_or_server() {
        let err = DashboardError::Http {
            status: 500,
            url: "http://localhost/api/workflow/".to_string(),
        };
        assert!(err.is_network_or_server());
        assert_eq!(err.status(), Some(500));
        assert_eq!(
            err.to_string(),
            "Server returned 500 for http://localhost/api/workflow/"
        );
    }

    #[test]
    fn test_validation_error_is_client_side() {
        let err = DashboardError::Validation("Please enter a folder name.".to_string());
        assert!(!err.is_network_or_server());
        assert_eq!(err.status(), None);
    }
}
