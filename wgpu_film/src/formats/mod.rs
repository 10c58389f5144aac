mod cube;

pub use cube::{parse as cube, LutGrid, ParseError};
