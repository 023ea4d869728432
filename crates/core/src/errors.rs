use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid match signal: {0}")]
    InvalidSignal(String),
    #[error("`{field}` differential {value} is outside {min}..={max}")]
    DiffOutOfRange { field: String, value: i32, min: i32, max: i32 },
    #[error("invalid feature vector: {0}")]
    InvalidFeatureVector(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("username and password must not be empty")]
    EmptyCredentials,
    #[error("username `{0}` is already registered")]
    DuplicateUsername(String),
    #[error("invalid username or password")]
    InvalidCredential,
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("classification failure: {0}")]
    Classification(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "Invalid username or password.",
            Self::Conflict { .. } => "That username is already taken.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::EmptyCredentials => Self::BadRequest {
                message: ApplicationError::EmptyCredentials.to_string(),
                correlation_id: unassigned(),
            },
            ApplicationError::InvalidCredential => Self::Unauthorized {
                message: ApplicationError::InvalidCredential.to_string(),
                correlation_id: unassigned(),
            },
            ApplicationError::DuplicateUsername(username) => Self::Conflict {
                message: format!("username `{username}` is already registered"),
                correlation_id: unassigned(),
            },
            ApplicationError::Persistence(message) | ApplicationError::Classification(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::DiffOutOfRange {
            field: "tower".to_owned(),
            value: 11,
            min: -10,
            max: 10,
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ref message,
            } if correlation_id == "req-1" && message.contains("tower")
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn duplicate_username_maps_to_conflict() {
        let interface =
            ApplicationError::DuplicateUsername("alice".to_owned()).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn invalid_credential_maps_to_unauthorized() {
        let interface = ApplicationError::InvalidCredential.into_interface("req-3");
        assert!(matches!(interface, InterfaceError::Unauthorized { .. }));
        assert_eq!(interface.user_message(), "Invalid username or password.");
    }

    #[test]
    fn classification_and_persistence_map_to_service_unavailable() {
        for error in [
            ApplicationError::Classification("scorer timed out".to_owned()),
            ApplicationError::Persistence("database lock timeout".to_owned()),
        ] {
            let interface = error.into_interface("req-4");
            assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
            assert_eq!(
                interface.user_message(),
                "The service is temporarily unavailable. Please retry shortly."
            );
        }
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("artifact missing".to_owned()).into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
