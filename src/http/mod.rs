//! HTTP surface: the check endpoint server and the embeddable middleware.

mod middleware;
mod server;

pub use middleware::admission_middleware;
pub use server::HttpServer;
