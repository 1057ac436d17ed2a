pub mod countdown;
pub(crate) mod glyphs;
pub mod letterbox;
