pub mod asm;
pub mod dap;
pub mod error;
pub mod link;
pub mod log;
pub mod lsp;

pub use error::Error;
