pub mod change_set;
pub mod conveyancer;
pub mod owner;
pub mod price_history;
pub mod request;
pub mod restriction;
pub mod timestamp;
pub mod title;
pub mod x500;

pub use change_set::*;
pub use conveyancer::*;
pub use owner::*;
pub use price_history::*;
pub use request::*;
pub use restriction::*;
pub use title::*;
pub use x500::*;
