mod alert;
mod expense;
mod occurrence;
mod reference;
mod scenario;
mod spend;

pub use alert::*;
pub use expense::*;
pub use occurrence::*;
pub use reference::*;
pub use scenario::*;
pub use spend::*;
