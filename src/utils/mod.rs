pub mod hash;
pub mod id;
pub mod validation;
