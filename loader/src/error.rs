use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid glTF format: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("invalid XML in model format: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("malformed {format} format: {message}")]
    Malformed {
        format: &'static str,
        message: String,
    },

    #[error("unsupported {format} format variant: {message}")]
    Unsupported {
        format: &'static str,
        message: String,
    },

    #[error("model contains no triangle geometry")]
    Empty,
}

impl DecodeError {
    pub fn malformed(format: &'static str, message: impl Into<String>) -> Self {
        DecodeError::Malformed {
            format,
            message: message.into(),
        }
    }

    pub fn unsupported(format: &'static str, message: impl Into<String>) -> Self {
        DecodeError::Unsupported {
            format,
            message: message.into(),
        }
    }
}
