pub mod derive;
pub mod models;
pub mod normalize;
