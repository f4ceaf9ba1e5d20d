// Risk management module
pub mod brackets;
pub mod sizing;

pub use brackets::{compute_brackets, round_to_step, Brackets};
pub use sizing::{calculate_order_quantity, SizingError, SizingParams, SizingPolicy};
