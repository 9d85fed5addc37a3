// HTTP routes
pub mod health;
pub mod jobs;
pub mod quota;

pub use health::*;
pub use jobs::*;
pub use quota::*;
