//! Convenient imports for common functionality.

pub use crate::backend::{ConnectionPool, DbTransaction, PoolStatement};
pub use crate::error::{SqlHandleError, SqlHandleResult};
pub use crate::handle::{Handle, HandleState};
pub use crate::logger::{Logger, NopLogger, TracingLogger};
pub use crate::manager::{Manager, ManagerOptions};
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::row::{FromRow, Row};
pub use crate::types::RowValues;
