//! Block transforms bundled with senc.

mod hc;
mod lz4;

pub use lz4::Lz4Transform;
