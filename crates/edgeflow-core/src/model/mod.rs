//! Data model for templates and evaluated resources.

mod lifecycle;
mod parameter;
mod resource;
mod template;
mod value;

// Re-exports
pub use lifecycle::*;
pub use parameter::*;
pub use resource::*;
pub use template::*;
pub use value::*;
