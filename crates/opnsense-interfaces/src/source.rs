//! Metadata sources for the resolver.

use crate::models::{InterfaceDescriptor, InterfaceGroup};
use crate::Result;
use async_trait::async_trait;

/// Supplier of interface and group metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InterfaceSource: Send + Sync {
    /// Fetch every configured interface.
    async fn interfaces(&self) -> Result<Vec<InterfaceDescriptor>>;

    /// Fetch every interface group.
    async fn groups(&self) -> Result<Vec<InterfaceGroup>>;
}
