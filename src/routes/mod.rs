mod api;
mod submissions;

pub use api::*;
pub use submissions::*;
