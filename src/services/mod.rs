pub mod gemini;
pub mod media;
pub mod pipeline;
pub mod quiz_service;
pub mod user_service;
