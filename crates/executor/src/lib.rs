pub mod builtin;
pub mod config;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod registry;
pub mod retry;
pub mod retrying;

pub use builtin::{
    BucketEncryptionExecutor, DetachAdminPolicyExecutor, PublicAccessBlockExecutor,
    register_builtin,
};
pub use config::ExecutorConfig;
pub use error::ExecutorError;
pub use executor::{DynFixExecutor, FixExecutor, ensure_descriptor_kind};
pub use inventory::{MemoryInventory, ResourceInventory, ResourceRef, ResourceSnapshot};
pub use registry::ExecutorRegistry;
pub use retry::RetryStrategy;
pub use retrying::RetryingExecutor;
