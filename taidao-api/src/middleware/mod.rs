/// Middleware modules for the API server
///
/// - Rate limiting for the one-time code endpoints

pub mod rate_limit;
