pub mod sample;
pub mod value;

pub use sample::Sample;
pub use value::Value;
