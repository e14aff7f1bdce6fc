pub mod feature;
pub mod token;
