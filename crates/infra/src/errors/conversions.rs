//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use serde_json::Error as JsonError;
use sim_domain::SimError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub SimError);

impl From<InfraError> for SimError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SimError> for InfraError {
    fn from(value: SimError) -> Self {
        Self(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoSimError {
    fn into_sim(self) -> SimError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → SimError */
/* -------------------------------------------------------------------------- */

impl IntoSimError for HttpError {
    fn into_sim(self) -> SimError {
        if self.is_builder() {
            return SimError::InvalidInput(format!("invalid HTTP request: {self}"));
        }

        if self.is_timeout() {
            return SimError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return SimError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => SimError::Auth(message),
                400..=499 => SimError::InvalidInput(message),
                _ => SimError::Network(message),
            };
        }

        if self.is_decode() {
            return SimError::Serialization(format!("failed to decode HTTP response: {self}"));
        }

        SimError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_sim())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → SimError */
/* -------------------------------------------------------------------------- */

impl IntoSimError for JsonError {
    fn into_sim(self) -> SimError {
        SimError::Serialization(format!(
            "invalid JSON at line {} column {}: {self}",
            self.line(),
            self.column()
        ))
    }
}

impl From<JsonError> for InfraError {
    fn from(value: JsonError) -> Self {
        Self(value.into_sim())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use reqwest::{Client, StatusCode};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn http_status_401_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::UNAUTHORIZED))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        let mapped: SimError = InfraError::from(error).into();
        match mapped {
            SimError::Auth(msg) => assert!(msg.contains("401")),
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_maps_to_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(format!("http://{addr}")).send().await.unwrap_err();

        let mapped: SimError = InfraError::from(error).into();
        assert!(matches!(mapped, SimError::Network(_)), "got {mapped:?}");
    }

    #[test]
    fn invalid_url_maps_to_invalid_input() {
        let error = Client::new().get("not a url").build().unwrap_err();

        let mapped: SimError = InfraError::from(error).into();
        assert_eq!(mapped.label(), "invalid_input");
    }

    #[test]
    fn json_error_maps_to_serialization() {
        let error = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();

        let mapped: SimError = InfraError::from(error).into();
        match mapped {
            SimError::Serialization(msg) => assert!(msg.contains("line 1")),
            other => panic!("expected serialization error, got {other:?}"),
        }
    }
}
