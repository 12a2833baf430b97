//! Services running on top of the stack.

pub mod echo;
pub mod http;
