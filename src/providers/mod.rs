pub mod http_api;
pub mod util;

pub use http_api::HttpAccountApi;
