//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`EmberError`] covers all failure modes including:
//! - GPU device and resource-creation failures
//! - Shader compilation errors
//! - Asset loading and decoding errors
//! - Render-graph invariant violations
//!
//! # Propagation policy
//!
//! Errors never unwind across the render loop. RHI factories return
//! `Result`; callers log the failure and degrade (a pass without its
//! pipeline is marked not ready and contributes nothing to the frame).

use thiserror::Error;

/// The main error type for the Ember engine.
#[derive(Error, Debug)]
pub enum EmberError {
    // ========================================================================
    // GPU & Rendering Errors
    // ========================================================================
    /// The GPU device was lost. Unrecoverable; callers log and terminate.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request GPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create GPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// An RHI factory rejected a descriptor.
    #[error("Resource creation failed ({what}): {detail}")]
    ResourceCreationFailed {
        /// The kind of resource being created
        what: &'static str,
        /// Why the descriptor was rejected
        detail: String,
    },

    /// Shader compilation or validation failed at pass init.
    ///
    /// Fatal for the affected pass only.
    #[error("Shader compile failed ({path}): {detail}")]
    ShaderCompileFailed {
        /// Shader path or label
        path: String,
        /// Compiler diagnostics
        detail: String,
    },

    /// A render-graph or command-recording invariant was violated
    /// (illegal barrier, pass cycle, missing attachment).
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // ========================================================================
    // Asset Errors
    // ========================================================================
    /// The requested asset was not found.
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// Asset deserialization failed.
    #[error("Deserialization error ({path}): {detail}")]
    DeserializationError {
        /// The asset path being read
        path: String,
        /// What went wrong
        detail: String,
    },

    /// Image decoding error.
    #[error("Image decode error: {0}")]
    ImageDecodeError(String),

    /// Model import error (OBJ / MTL).
    #[error("Model import error ({path}): {detail}")]
    ModelImportError {
        /// The model file being imported
        path: String,
        /// Importer diagnostics
        detail: String,
    },

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<image::ImageError> for EmberError {
    fn from(err: image::ImageError) -> Self {
        EmberError::ImageDecodeError(err.to_string())
    }
}

impl From<tobj::LoadError> for EmberError {
    fn from(err: tobj::LoadError) -> Self {
        EmberError::ModelImportError {
            path: String::new(),
            detail: err.to_string(),
        }
    }
}

/// Alias for `Result<T, EmberError>`.
pub type Result<T> = std::result::Result<T, EmberError>;
