use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML syntax error at byte {position}: {source}")]
    Syntax {
        position: u64,
        #[source]
        source:   quick_xml::Error,
    },

    #[error("document has no root element")]
    Empty,

    #[error("unbalanced end tag </{0}>")]
    UnbalancedEnd(String),

    #[error("unclosed element <{0}>")]
    Unclosed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
