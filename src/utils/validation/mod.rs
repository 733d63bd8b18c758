//! Validation helpers shared by the pipeline stages

mod numeric;
mod tensor;

pub use numeric::NumericValidator;
pub use tensor::{TensorValidator, MAX_IMAGE_DIMENSION};
