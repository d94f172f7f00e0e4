mod protected;
pub mod response;

pub use protected::{method_not_allowed, not_found, preflight, protected};
