use std::path::PathBuf;

pub type LoopcastResult<T> = Result<T, LoopcastError>;

#[derive(thiserror::Error, Debug)]
pub enum LoopcastError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("missing asset(s): {}", display_paths(.0))]
    MissingAssets(Vec<PathBuf>),

    #[error("media error: {0}")]
    Media(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("source '{}' produced no frames", .0.display())]
    EmptySource(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoopcastError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("'{}'", p.display()))
        .collect::<Vec<_>>()
        .join(", ")
}
