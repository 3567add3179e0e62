mod builder;
pub mod criterion;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod params;
pub mod random_forest;

pub use criterion::Criterion;
pub use decision_tree::{DecisionTreeClassifier, DecisionTreeRegressor};
pub use gradient_boosting::{BoostingParams, GradientBoostingClassifier, GradientBoostingRegressor};
pub use params::{MaxFeatures, TreeParams};
pub use random_forest::{ForestParams, RandomForestClassifier, RandomForestRegressor};
