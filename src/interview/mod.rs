pub mod code;
pub mod engine;
pub mod evaluation;
pub mod timer;

pub use code::*;
pub use engine::*;
pub use evaluation::*;
pub use timer::*;
