use async_trait::async_trait;

use crate::error::AcquireError;

use super::device::{DeviceDescriptor, StreamConstraints};
use super::stream::MediaStream;

/// Media source provider.
///
/// Owns device enumeration and permission acquisition. Both calls may suspend
/// (a permission prompt, a slow device open).
#[async_trait]
pub trait MediaSourceProvider: Send + Sync {
    /// Provider identifier.
    fn name(&self) -> &'static str;

    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, AcquireError>;

    async fn acquire_stream(
        &self,
        constraints: StreamConstraints,
    ) -> Result<MediaStream, AcquireError>;
}
