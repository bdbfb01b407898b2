pub mod openai;
pub mod service;

pub use openai::OpenAiClient;
pub use service::ServiceClient;
