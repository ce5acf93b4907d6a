pub mod alignment;
pub mod baseline;
pub mod differential;
pub mod features;
pub mod linalg;
pub mod matching;
pub mod normalize;
pub mod processing;
pub mod smoothing;
