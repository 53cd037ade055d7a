//! Query compilation: select maps, filter predicates and the command
//! envelopes they are sent in.

mod expr;
pub use expr::*;

mod select;
pub use select::*;

mod filter;
pub use filter::*;

mod command;
pub use command::*;
