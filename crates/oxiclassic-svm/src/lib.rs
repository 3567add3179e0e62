pub mod kernel;
mod smo;
pub mod svc;
pub mod svr;

pub use kernel::Kernel;
pub use svc::{BinaryMachine, Svc, SvcParams};
pub use svr::{Svr, SvrParams};
