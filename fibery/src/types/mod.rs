//! Types will provide the definition of the workspace schema model and
//! functions to parse it from the backend's wire format.

mod in_memory;
pub use in_memory::*;

mod on_disk;
pub use on_disk::*;

mod naming;
pub use naming::*;
