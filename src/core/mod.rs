pub mod crew;
pub mod document;
pub mod sow;
pub mod template;

pub use crate::domain::ports::{LlmProvider, Storage, Tool};
pub use crate::utils::error::Result;
