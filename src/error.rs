pub type CueframeResult<T> = Result<T, CueframeError>;

#[derive(thiserror::Error, Debug)]
pub enum CueframeError {
    #[error("validation error: {0}")]
    Validation(String),

    /// An asset failed to load; the owning renderer is permanently not-ready.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("gpu error: {0}")]
    Gpu(String),

    /// Fatal for the renderer instance that raised it at `prepare()`.
    #[error("shader compile failure: {0}")]
    ShaderCompile(String),

    /// Fatal for the renderer instance that raised it at `prepare()`.
    #[error("program link failure: {0}")]
    ProgramLink(String),

    /// The offscreen target cannot be drawn into this frame.
    #[error("framebuffer incomplete: {0}")]
    FramebufferIncomplete(String),

    /// Collector-side validation failure; the cycle stays Collecting.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CueframeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn resource_unavailable(msg: impl Into<String>) -> Self {
        Self::ResourceUnavailable(msg.into())
    }

    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }

    pub fn framebuffer_incomplete(msg: impl Into<String>) -> Self {
        Self::FramebufferIncomplete(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            CueframeError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            CueframeError::resource_unavailable("x")
                .to_string()
                .contains("resource unavailable:")
        );
        assert!(
            CueframeError::gpu("x").to_string().contains("gpu error:")
        );
        assert!(
            CueframeError::framebuffer_incomplete("x")
                .to_string()
                .contains("framebuffer incomplete:")
        );
        assert!(
            CueframeError::invalid_input("x")
                .to_string()
                .contains("invalid input:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = CueframeError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
