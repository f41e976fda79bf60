pub mod api_responses;
pub mod forecast;
pub mod measurement;
pub mod push;

pub use forecast::*;
pub use measurement::*;
pub use push::*;
