use ash::vk;
use gpu_allocator::AllocationError;

/// Failure while creating or operating on a GPU resource.
#[derive(Debug)]
pub enum RhiError {
    Vulkan(vk::Result),
    Allocation(AllocationError),
    Loading(ash::LoadingError),
}

impl From<vk::Result> for RhiError {
    fn from(e: vk::Result) -> Self {
        RhiError::Vulkan(e)
    }
}

impl From<AllocationError> for RhiError {
    fn from(e: AllocationError) -> Self {
        RhiError::Allocation(e)
    }
}

impl From<ash::LoadingError> for RhiError {
    fn from(e: ash::LoadingError) -> Self {
        RhiError::Loading(e)
    }
}

impl std::fmt::Display for RhiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RhiError::Vulkan(e) => write!(f, "Vulkan error: {:?}", e),
            RhiError::Allocation(e) => write!(f, "GPU memory allocation failed: {}", e),
            RhiError::Loading(e) => write!(f, "Failed to load the Vulkan library: {}", e),
        }
    }
}

impl std::error::Error for RhiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RhiError::Vulkan(e) => Some(e),
            RhiError::Allocation(e) => Some(e),
            RhiError::Loading(e) => Some(e),
        }
    }
}
