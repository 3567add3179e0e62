pub mod dbscan;
pub mod kmeans;
pub mod minibatch;

pub use dbscan::{Dbscan, DbscanParams};
pub use kmeans::{KMeans, KMeansInit, KMeansParams};
pub use minibatch::{MiniBatchKMeans, MiniBatchParams};
