pub mod minify;
pub mod reduce;
mod rules;

pub use minify::Minifier;
pub use reduce::{Reducer, reduce};
pub use rules::{CssRule, Declaration, Stylesheet};
