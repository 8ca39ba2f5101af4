//! Language model providers for Parley.
//!
//! All providers implement the `parley_core::LanguageModel` trait.
//! `build_from_config` picks the configured provider from `AppConfig`.

pub mod gemini;
pub mod openai_compat;
pub mod router;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
