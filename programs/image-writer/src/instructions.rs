pub mod finalize;
pub mod initialize;
pub mod write_chunk;

pub use finalize::*;
pub use initialize::*;
pub use write_chunk::*;
