use std::error::Error;
use std::fmt::{Display, Formatter};

pub type LasifResult<T> = Result<T, LasifError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LasifErrorCategory {
    Configuration,
    NotFound,
    Computation,
    NotImplemented,
    IoSystem,
    Internal,
}

impl LasifErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Configuration => 2,
            Self::NotFound => 3,
            Self::Computation => 4,
            Self::NotImplemented => 5,
            Self::IoSystem => 6,
            Self::Internal => 7,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "ConfigurationError",
            Self::NotFound => "NotFoundError",
            Self::Computation => "ComputationError",
            Self::NotImplemented => "NotImplementedError",
            Self::IoSystem => "IoSystemError",
            Self::Internal => "InternalError",
        }
    }

    /// Errors of these categories are skipped at item granularity by the
    /// workflow drivers instead of aborting the whole step.
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::NotFound | Self::Computation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LasifError {
    category: LasifErrorCategory,
    code: &'static str,
    message: String,
}

impl LasifError {
    pub fn new(category: LasifErrorCategory, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            category,
            code,
            message: message.into(),
        }
    }

    pub fn configuration(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LasifErrorCategory::Configuration, code, message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LasifErrorCategory::NotFound, code, message)
    }

    pub fn computation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LasifErrorCategory::Computation, code, message)
    }

    pub fn not_implemented(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LasifErrorCategory::NotImplemented, code, message)
    }

    pub fn io_system(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LasifErrorCategory::IoSystem, code, message)
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(LasifErrorCategory::Internal, code, message)
    }

    pub const fn category(&self) -> LasifErrorCategory {
        self.category
    }

    pub const fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.code, self.message)
    }
}

impl Display for LasifError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] {}", self.category.as_str(), self.code, self.message)
    }
}

impl Error for LasifError {}
