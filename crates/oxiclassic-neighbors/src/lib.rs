pub mod kd_tree;
pub mod knn;

pub use kd_tree::{brute_force_kneighbors, KdTree, Neighbor};
pub use knn::{Algorithm, KNeighborsClassifier, KNeighborsRegressor, KnnParams, Weights};
