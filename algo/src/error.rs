use std::fmt;

use parfold_device::DeviceError;

/// Errors from the algorithm layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlgoError {
    /// Transform input and output differ in length.
    LengthMismatch { input: usize, output: usize },

    /// Reduce input or output has no elements.
    EmptyBuffer,

    /// Reduce output must hold exactly one element.
    OutputNotScalar { len: usize },

    /// The device cannot form work-groups of at least two items.
    DegenerateWorkGroup { max_work_group_size: usize },

    Device(DeviceError),
}

impl fmt::Display for AlgoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgoError::LengthMismatch { input, output } => write!(
                f,
                "input has {} elements but output has {}",
                input, output
            ),
            AlgoError::EmptyBuffer => write!(f, "cannot reduce an empty buffer"),
            AlgoError::OutputNotScalar { len } => write!(
                f,
                "reduction output must hold one element, found {}",
                len
            ),
            AlgoError::DegenerateWorkGroup {
                max_work_group_size,
            } => write!(
                f,
                "device work-group size {} is too small to reduce (need at least 2)",
                max_work_group_size
            ),
            AlgoError::Device(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AlgoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AlgoError::Device(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DeviceError> for AlgoError {
    fn from(err: DeviceError) -> Self {
        AlgoError::Device(err)
    }
}

pub type Result<T> = std::result::Result<T, AlgoError>;
