pub mod comparator;
pub mod report;
pub mod types;

pub use comparator::Comparator;
pub use types::{CmpConfig, ComparatorEntry, FieldGetter};
