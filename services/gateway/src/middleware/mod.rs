mod error_handling;
mod request_id;

pub use error_handling::error_handling_middleware;
pub use request_id::request_id_middleware;
