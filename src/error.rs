use ::std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LmError {
    #[error("Model file read error")]
    Io(#[from] io::Error),
    #[error("Line {line}: {message}")]
    Format { line: usize, message: String },
    #[error("Line {line}: expected \\{expected}-grams: section, found \\{found}-grams:")]
    SectionOrder {
        expected: usize,
        found: usize,
        line: usize,
    },
    #[error("Level {level}: header declares {declared} m-grams, section has {actual}")]
    CountMismatch {
        level: usize,
        declared: usize,
        actual: usize,
    },
    #[error("Model order {declared} exceeds the configured max order {configured}")]
    OrderMismatch { declared: usize, configured: usize },
    #[error("Line {line}: context of a level {level} m-gram is not in the model")]
    MissingContext { level: usize, line: usize },
    #[error("Memory limit {limit} bytes exceeded: {used} used, {requested} requested")]
    Capacity {
        requested: usize,
        used: usize,
        limit: usize,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl LmError {
    #[inline]
    pub(crate) fn format(line: usize, message: impl Into<String>) -> Self {
        Self::Format {
            line,
            message: message.into(),
        }
    }

    /// Fills in the line number of errors raised below the parser.
    pub(crate) fn at_line(self, line: usize) -> Self {
        match self {
            Self::MissingContext { level, .. } => Self::MissingContext { level, line },
            Self::Format { message, .. } => Self::Format { line, message },
            e => e,
        }
    }
}
