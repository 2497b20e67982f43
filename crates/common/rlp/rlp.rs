pub mod constants;
pub mod decode;
pub mod encode;
pub mod error;
pub mod item;
pub mod structs;
