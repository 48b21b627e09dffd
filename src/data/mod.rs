pub mod hashmap_aggregate_store;
pub mod traits;
pub mod types;

pub use hashmap_aggregate_store::HashMapAggregateStore;
pub use traits::AggregateStore;
pub use types::{
    AggregateRow, AggregateValue, DayIndex, EventVector, ReportKey,
};
