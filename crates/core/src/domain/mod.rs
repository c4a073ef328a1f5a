pub mod geo;
pub mod offer;
pub mod product;
pub mod user;
