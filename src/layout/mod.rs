pub mod staggered;

pub use staggered::StaggeredLayout;
