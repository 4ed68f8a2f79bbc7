pub mod api;
pub mod central_http;
