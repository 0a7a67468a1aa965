pub mod r#loop;

pub use r#loop::*;
