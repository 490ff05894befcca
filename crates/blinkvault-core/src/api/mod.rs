//! REST API access for the BlinkVault service.
//!
//! - `Transport`: executes one HTTP exchange (`HttpTransport` over reqwest)
//! - `RequestPipeline`: bearer decoration and refresh-on-401
//! - `BlinkVaultClient`: typed endpoints built on the pipeline

pub mod client;
pub mod error;
pub mod pipeline;
pub mod transport;

pub use client::{BlinkVaultClient, OtpPurpose, ProfilePage, ProfileUpdate, SignupVerification};
pub use error::ApiError;
pub use pipeline::{Attempt, RequestPipeline, REFRESH_PATH};
pub use transport::{ApiRequest, ApiResponse, FileUpload, HttpTransport, Transport};
