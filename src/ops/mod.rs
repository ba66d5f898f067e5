pub mod clip;
pub mod geometry;
pub mod hull;
pub mod mask;
pub mod perspective;
