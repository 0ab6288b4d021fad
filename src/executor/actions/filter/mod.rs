mod action;
mod models;

pub use action::DataFilterAction;
pub use models::{ComparisonOperator, Condition};
