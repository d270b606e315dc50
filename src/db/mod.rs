mod error;
pub mod memory;
pub mod repos;

pub use error::{DbError, DbResult};
pub use memory::MemoryResourceRepo;
pub use repos::*;
