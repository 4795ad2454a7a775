pub mod caption;
pub mod config;
pub mod error;
pub mod image_input;
pub mod logging;
pub mod speech;
pub mod web;
pub mod workflow;

pub use caption::{Caption, CaptionResult, CaptionService, OpenRouterCaptionClient};
pub use config::{AppConfig, ServiceCredential};
pub use error::{Failure, FailureKind};
pub use image_input::{DisplayImage, ImageAsset, ImageFormat, ImageValidator};
pub use speech::{AudioAsset, GoogleTranslateSpeech, SpeechSynthesizer};
pub use web::{create_router, AppState};
pub use workflow::{CaptionWorkflow, Upload, WorkflowOptions, WorkflowOutcome};
