//! Linear models: least squares with optional L1/L2 penalties, and
//! binary/multinomial logistic regression.

pub mod logistic;
pub mod regression;

pub use logistic::{LogisticRegression, LogisticRegressionParams};
pub use regression::{GradientDescent, LinearRegression, LinearRegressionParams, Penalty, Solver};
