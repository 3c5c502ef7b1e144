pub mod args;
pub mod breakpoint;
pub mod cursor;
pub mod handles;
pub mod protocol;
pub mod session;
pub mod source;
pub mod tracer;
pub mod transport;
