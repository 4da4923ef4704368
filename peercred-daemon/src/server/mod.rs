pub mod api;
pub mod error;
pub mod router;
pub mod startup;
