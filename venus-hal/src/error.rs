use thiserror::Error;

/// Failure reported by a [`crate::GpuBackend`] call.
///
/// Every variant maps onto `venus_core::error::CoreError::BackendFailure`
/// at the handler layer; the backend itself never returns the core's
/// error type, keeping the crate boundary one-directional.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend initialization failed: {0}")]
    InitializationFailed(String),

    #[error("backend is out of device memory")]
    OutOfDeviceMemory,

    #[error("backend is out of host memory")]
    OutOfHostMemory,

    #[error("device lost")]
    DeviceLost,

    #[error("requested feature is not supported by this backend")]
    FeatureNotSupported,

    #[error("backend call failed: {0}")]
    Other(String),
}
