use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use std::io;
use std::path::PathBuf;

/// Failures that stop an invocation from producing an `{output, error}` result.
///
/// Compile errors and timeouts are not listed here: those are ordinary results.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported language `{0}`")]
    UnsupportedLanguage(String),

    #[error("failed to create workspace under {}: {source}", .root.display())]
    Workspace {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    WriteSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("i/o error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to load test cases from {}: {reason}", .path.display())]
    TestCases { path: PathBuf, reason: String },

    #[error("no test cases for question `{0}`")]
    UnknownQuestion(String),
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::UnsupportedLanguage(_) => Status::BadRequest,
            Error::UnknownQuestion(_) => Status::NotFound,
            _ => Status::InternalServerError,
        }
    }
}

/// Errors still reach the client as an `{output, error}` pair.
impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status == Status::InternalServerError {
            log::warn!("{}", self);
        }
        let body = Json(serde_json::json!({
            "output": "",
            "error": self.to_string(),
        }));
        (status, body).respond_to(req)
    }
}
