pub mod aliases;
pub mod mapper;
pub mod record;

pub use aliases::{Field, ALIASES};
pub use mapper::{coerce_number, map_table, resolve_columns, MappedBatch};
pub use record::{CanonicalRecord, Metric};
