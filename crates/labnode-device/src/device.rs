use std::any::Any;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use labnode_frame::Value;
use labnode_session::{ApiVersion, Session, Version};

use crate::error::Result;
use crate::function::{FunctionId, Reply};

/// Operations every Labnode driver provides.
///
/// Object safe, so drivers can be picked at runtime from the reported
/// device type. Use [`Device::as_any`] to reach driver specific methods.
pub trait Device: Send + Sync + 'static {
    /// Numeric device type this driver handles.
    fn device_type(&self) -> u32;

    /// Human readable driver name.
    fn name(&self) -> &'static str;

    /// API version the device reported at connect time.
    fn api_version(&self) -> ApiVersion;

    fn session(&self) -> &Arc<Session>;

    fn software_version(&self) -> BoxFuture<'_, Result<Version>>;

    fn hardware_version(&self) -> BoxFuture<'_, Result<Version>>;

    fn serial_number(&self) -> BoxFuture<'_, Result<u32>>;

    /// Query a getter, with the raw value converted to its unit.
    fn get_by_function_id(&self, function: FunctionId) -> BoxFuture<'_, Result<Value>>;

    /// Call a setter or action with an already encoded argument.
    fn set_by_function_id(
        &self,
        function: FunctionId,
        value: Value,
    ) -> BoxFuture<'_, Result<Reply>>;

    fn as_any(&self) -> &dyn Any;
}
