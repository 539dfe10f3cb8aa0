pub mod codec;
pub mod memory;
pub mod paths;
