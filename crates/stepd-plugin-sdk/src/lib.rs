pub use stepd_plugin_api::*;

mod error;
mod export;
pub mod ffi_guard;
mod spank;

pub use error::*;
pub use export::*;
pub use spank::*;
