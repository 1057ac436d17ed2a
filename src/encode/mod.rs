pub mod ffmpeg;
pub mod pipe;
pub mod sink;
