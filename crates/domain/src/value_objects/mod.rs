pub mod address;
pub mod amount;
pub mod tx;
