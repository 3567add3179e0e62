pub mod classification;
pub mod clustering;
pub mod regression;

pub use classification::*;
pub use clustering::*;
pub use regression::*;
