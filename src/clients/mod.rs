//! Typed clients for the external collaborators this core consumes
//! (spec §6 "Outbound contracts"). Each is a trait so tests can inject a
//! fake, mirroring the teacher's `BaseLLM` trait object pattern
//! (`llms/base_llm.rs`) used to swap model providers behind a uniform
//! interface.

pub mod embedder;
pub mod image_hash;
pub mod llm;
pub mod screenshot;
pub mod search;
pub mod url_scan;
pub mod voting;

pub use embedder::Embedder;
pub use image_hash::ImageHashClient;
pub use llm::LlmClient;
pub use screenshot::ScreenshotClient;
pub use search::SearchClient;
pub use url_scan::UrlScanClient;
pub use voting::VotingClient;
