//! Point transforms evaluated on tensors.

pub mod affine;
pub mod trait_;

pub use affine::AffineTransform;
pub use trait_::Transform;
