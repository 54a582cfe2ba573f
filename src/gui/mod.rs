//! Terminal front end: the device picker and the live scope.

mod device_selector;
mod error;
mod scope;

pub use device_selector::device_selector;
pub use error::ScopeGuiError;
pub use scope::{run_scope, ScopeView};
