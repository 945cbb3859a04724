use actix_web::http::StatusCode;
use std::fmt;

#[derive(Debug, Clone)]
pub enum EngineError {
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    FileOperation(String),
    Validation(String),
    NotFound(String),
    Serialization(String),
    Unauthorized(String),
    Forbidden(String),
    Crypto(String),
    Template(String),
    Execution(String),
    Integration(String),
    Conflict(String),
}

impl EngineError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::DatabaseConfig(_) => "E001",
            EngineError::DatabaseConnection(_) => "E002",
            EngineError::DatabaseOperation(_) => "E003",
            EngineError::FileOperation(_) => "E004",
            EngineError::Validation(_) => "E005",
            EngineError::NotFound(_) => "E006",
            EngineError::Serialization(_) => "E007",
            EngineError::Unauthorized(_) => "E008",
            EngineError::Forbidden(_) => "E009",
            EngineError::Crypto(_) => "E010",
            EngineError::Template(_) => "E011",
            EngineError::Execution(_) => "E012",
            EngineError::Integration(_) => "E013",
            EngineError::Conflict(_) => "E014",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            EngineError::DatabaseConfig(_) => "Database Configuration Error",
            EngineError::DatabaseConnection(_) => "Database Connection Error",
            EngineError::DatabaseOperation(_) => "Database Operation Error",
            EngineError::FileOperation(_) => "File Operation Error",
            EngineError::Validation(_) => "Validation Error",
            EngineError::NotFound(_) => "Resource Not Found",
            EngineError::Serialization(_) => "Serialization Error",
            EngineError::Unauthorized(_) => "Unauthorized",
            EngineError::Forbidden(_) => "Forbidden",
            EngineError::Crypto(_) => "Crypto Error",
            EngineError::Template(_) => "Template Error",
            EngineError::Execution(_) => "Execution Error",
            EngineError::Integration(_) => "Integration Error",
            EngineError::Conflict(_) => "Conflict",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            EngineError::DatabaseConfig(msg)
            | EngineError::DatabaseConnection(msg)
            | EngineError::DatabaseOperation(msg)
            | EngineError::FileOperation(msg)
            | EngineError::Validation(msg)
            | EngineError::NotFound(msg)
            | EngineError::Serialization(msg)
            | EngineError::Unauthorized(msg)
            | EngineError::Forbidden(msg)
            | EngineError::Crypto(msg)
            | EngineError::Template(msg)
            | EngineError::Execution(msg)
            | EngineError::Integration(msg)
            | EngineError::Conflict(msg) => msg,
        }
    }

    /// 映射到 HTTP 状态码
    pub fn http_status(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) | EngineError::Serialization(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::Integration(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 格式化为彩色输出（用于 Server 模式）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出（用于 CLI 模式）
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 默认使用简洁格式
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for EngineError {}

// 便捷的构造函数
impl EngineError {
    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        EngineError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        EngineError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        EngineError::DatabaseOperation(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        EngineError::FileOperation(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        EngineError::NotFound(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        EngineError::Serialization(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        EngineError::Unauthorized(msg.into())
    }

    pub fn forbidden<T: Into<String>>(msg: T) -> Self {
        EngineError::Forbidden(msg.into())
    }

    pub fn crypto<T: Into<String>>(msg: T) -> Self {
        EngineError::Crypto(msg.into())
    }

    pub fn template<T: Into<String>>(msg: T) -> Self {
        EngineError::Template(msg.into())
    }

    pub fn execution<T: Into<String>>(msg: T) -> Self {
        EngineError::Execution(msg.into())
    }

    pub fn integration<T: Into<String>>(msg: T) -> Self {
        EngineError::Integration(msg.into())
    }

    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        EngineError::Conflict(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for EngineError {
    fn from(err: sea_orm::DbErr) -> Self {
        EngineError::DatabaseOperation(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Execution(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for EngineError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        EngineError::Crypto(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
