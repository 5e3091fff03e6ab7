use thiserror::Error;

pub type TreeResult<T> = Result<T, TreeError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path too long: {0} bytes (max 4096)")]
    PathTooLong(usize),

    #[error("Filename too long: {0} bytes (max 255)")]
    FilenameTooLong(usize),

    #[error("Path escapes root: {0}")]
    EscapesRoot(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_path_error() {
        let err = TreeError::InvalidPath("empty".to_string());
        assert_eq!(err.to_string(), "Invalid path: empty");
    }

    #[test]
    fn test_path_too_long_error() {
        let err = TreeError::PathTooLong(5000);
        assert_eq!(err.to_string(), "Path too long: 5000 bytes (max 4096)");
    }

    #[test]
    fn test_filename_too_long_error() {
        let err = TreeError::FilenameTooLong(300);
        assert_eq!(err.to_string(), "Filename too long: 300 bytes (max 255)");
    }

    #[test]
    fn test_escapes_root_error() {
        let err = TreeError::EscapesRoot("../etc".to_string());
        assert_eq!(err.to_string(), "Path escapes root: ../etc");
    }
}
