pub mod distance;
pub mod dtype;
pub mod error;
pub mod labels;
pub mod rng;
pub mod scoring;
pub mod shape;
pub mod tensor;
pub mod traits;
pub mod validate;

pub use distance::Metric;
pub use dtype::Float;
pub use error::{MlError, MlResult};
pub use labels::ClassLabels;
pub use shape::Shape;
pub use tensor::Tensor;
pub use traits::{Classifier, Predict, Regressor};
