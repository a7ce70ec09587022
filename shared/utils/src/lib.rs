pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod templating;
pub mod validation;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use templating::*;
pub use validation::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_loading_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn error_handling_classification() {
        let error = BeaconError::validation("test_field", "test message");
        assert_eq!(error.error_code(), "VALIDATION_ERROR");
        assert_eq!(error.http_status_code(), 400);
    }
}
