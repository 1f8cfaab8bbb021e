pub mod page;
pub mod photo;

pub use page::*;
pub use photo::*;
