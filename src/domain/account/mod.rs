// ============================================================================
// Account Domain - users, role profiles and their validation rules
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod registration;

pub use value_objects::*;
pub use errors::*;
pub use registration::*;
